//! Strategy genome: the bounded parameter vector that fully determines one
//! strategy, and the genetic operators that produce new genomes.
//!
//! A [`Genome`] is an immutable value. New genomes come from [`Genome::random`],
//! the presets, [`Genome::mutate`], [`Genome::crossover`] or a
//! [`GenomeBuilder`]; every path clamps parameters into their bounds.

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};
use std::fmt;

use super::market::{Session, Volatility};

/// Inclusive numeric range for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBound {
    pub min: f64,
    pub max: f64,
}

impl ParamBound {
    pub const fn new(min: f64, max: f64) -> Self {
        ParamBound { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const MIN_SPREAD_BOUND: ParamBound = ParamBound::new(0.02, 0.20);
pub const STABILITY_TICKS_BOUND: ParamBound = ParamBound::new(1.0, 10.0);
pub const LATENCY_BUFFER_BOUND: ParamBound = ParamBound::new(0.01, 0.08);
pub const POSITION_SIZE_BOUND: ParamBound = ParamBound::new(2.0, 8.0);
pub const MAX_HOLD_BOUND: ParamBound = ParamBound::new(15.0, 180.0);
pub const TAKE_PROFIT_BOUND: ParamBound = ParamBound::new(0.05, 0.30);
pub const STOP_LOSS_BOUND: ParamBound = ParamBound::new(0.10, 0.40);

/// Hold durations drawn by [`Genome::random`].
pub const HOLD_CHOICES_SECS: [u32; 7] = [15, 30, 45, 60, 90, 120, 180];

const RANDOM_STABILITY_MAX: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionPreference {
    All,
    Opening,
    Mid,
    Closing,
}

impl SessionPreference {
    pub const ALL: [SessionPreference; 4] = [
        SessionPreference::All,
        SessionPreference::Opening,
        SessionPreference::Mid,
        SessionPreference::Closing,
    ];

    pub fn matches(self, session: Session) -> bool {
        match self {
            SessionPreference::All => true,
            SessionPreference::Opening => session == Session::Opening,
            SessionPreference::Mid => session == Session::Mid,
            SessionPreference::Closing => session == Session::Closing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPreference::All => "all",
            SessionPreference::Opening => "opening",
            SessionPreference::Mid => "mid",
            SessionPreference::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VolatilityPreference {
    All,
    Low,
    Medium,
    High,
}

impl VolatilityPreference {
    pub const ALL: [VolatilityPreference; 4] = [
        VolatilityPreference::All,
        VolatilityPreference::Low,
        VolatilityPreference::Medium,
        VolatilityPreference::High,
    ];

    pub fn matches(self, volatility: Volatility) -> bool {
        match self {
            VolatilityPreference::All => true,
            VolatilityPreference::Low => volatility == Volatility::Low,
            VolatilityPreference::Medium => volatility == Volatility::Medium,
            VolatilityPreference::High => volatility == Volatility::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VolatilityPreference::All => "all",
            VolatilityPreference::Low => "low",
            VolatilityPreference::Medium => "medium",
            VolatilityPreference::High => "high",
        }
    }
}

/// The genes. Percentages are in percent units (0.05 means 0.05 %).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenomeParams {
    pub min_spread_threshold: f64,
    pub stability_ticks: u32,
    pub latency_buffer_pct: f64,
    pub position_size_pct: f64,
    pub max_hold_secs: u32,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub preferred_session: SessionPreference,
    pub volatility_preference: VolatilityPreference,
}

impl Default for GenomeParams {
    fn default() -> Self {
        GenomeParams {
            min_spread_threshold: 0.05,
            stability_ticks: 3,
            latency_buffer_pct: 0.02,
            position_size_pct: 5.0,
            max_hold_secs: 60,
            take_profit_pct: 0.1,
            stop_loss_pct: 0.2,
            preferred_session: SessionPreference::All,
            volatility_preference: VolatilityPreference::All,
        }
    }
}

impl GenomeParams {
    /// Copy of `self` with every numeric gene forced into its bound.
    pub fn clamped(self) -> Self {
        GenomeParams {
            min_spread_threshold: MIN_SPREAD_BOUND.clamp(self.min_spread_threshold),
            stability_ticks: clamp_int(self.stability_ticks as f64, STABILITY_TICKS_BOUND),
            latency_buffer_pct: LATENCY_BUFFER_BOUND.clamp(self.latency_buffer_pct),
            position_size_pct: POSITION_SIZE_BOUND.clamp(self.position_size_pct),
            max_hold_secs: clamp_int(self.max_hold_secs as f64, MAX_HOLD_BOUND),
            take_profit_pct: TAKE_PROFIT_BOUND.clamp(self.take_profit_pct),
            stop_loss_pct: STOP_LOSS_BOUND.clamp(self.stop_loss_pct),
            ..self
        }
    }

    pub fn within_bounds(&self) -> bool {
        MIN_SPREAD_BOUND.contains(self.min_spread_threshold)
            && STABILITY_TICKS_BOUND.contains(self.stability_ticks as f64)
            && LATENCY_BUFFER_BOUND.contains(self.latency_buffer_pct)
            && POSITION_SIZE_BOUND.contains(self.position_size_pct)
            && MAX_HOLD_BOUND.contains(self.max_hold_secs as f64)
            && TAKE_PROFIT_BOUND.contains(self.take_profit_pct)
            && STOP_LOSS_BOUND.contains(self.stop_loss_pct)
    }

    /// Numeric genes scaled to [0, 1] by their bounds.
    fn normalized(&self) -> [f64; 7] {
        let n = |v: f64, b: ParamBound| (v - b.min) / b.width();
        [
            n(self.min_spread_threshold, MIN_SPREAD_BOUND),
            n(self.stability_ticks as f64, STABILITY_TICKS_BOUND),
            n(self.latency_buffer_pct, LATENCY_BUFFER_BOUND),
            n(self.position_size_pct, POSITION_SIZE_BOUND),
            n(self.max_hold_secs as f64, MAX_HOLD_BOUND),
            n(self.take_profit_pct, TAKE_PROFIT_BOUND),
            n(self.stop_loss_pct, STOP_LOSS_BOUND),
        ]
    }
}

fn clamp_int(value: f64, bound: ParamBound) -> u32 {
    bound.clamp(value.round()) as u32
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Zero-mean Gaussian noise; a non-finite or negative `std` yields no noise.
fn gaussian_noise<R: Rng + ?Sized>(rng: &mut R, std: f64) -> f64 {
    match Normal::new(0.0, std) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

/// Eight hex characters from a v4 uuid drawn from `rng`.
pub fn fresh_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    uuid.simple().to_string()[..8].to_string()
}

/// Where a genome came from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parentage {
    Founder,
    Mutant { parent: String },
    Crossover { first: String, second: String },
}

/// One strategy's complete parameter set plus identity and lineage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Genome {
    id: String,
    name: String,
    generation: u32,
    parentage: Parentage,
    params: GenomeParams,
}

impl Genome {
    pub fn builder() -> GenomeBuilder {
        GenomeBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn parentage(&self) -> &Parentage {
        &self.parentage
    }

    pub fn params(&self) -> &GenomeParams {
        &self.params
    }

    /// Single parent id, for mutants only.
    pub fn parent_id(&self) -> Option<&str> {
        match &self.parentage {
            Parentage::Mutant { parent } => Some(parent),
            _ => None,
        }
    }

    pub fn parent_ids(&self) -> Vec<&str> {
        match &self.parentage {
            Parentage::Founder => Vec::new(),
            Parentage::Mutant { parent } => vec![parent.as_str()],
            Parentage::Crossover { first, second } => vec![first.as_str(), second.as_str()],
        }
    }

    /// A genome with every gene sampled uniformly within its range.
    pub fn random<R: Rng + ?Sized>(generation: u32, parent: Option<&str>, rng: &mut R) -> Genome {
        let params = GenomeParams {
            min_spread_threshold: round_to(
                rng.gen_range(MIN_SPREAD_BOUND.min..=MIN_SPREAD_BOUND.max),
                3,
            ),
            stability_ticks: rng.gen_range(1..=RANDOM_STABILITY_MAX),
            latency_buffer_pct: round_to(
                rng.gen_range(LATENCY_BUFFER_BOUND.min..=LATENCY_BUFFER_BOUND.max),
                3,
            ),
            position_size_pct: round_to(
                rng.gen_range(POSITION_SIZE_BOUND.min..=POSITION_SIZE_BOUND.max),
                1,
            ),
            max_hold_secs: HOLD_CHOICES_SECS.choose(rng).copied().unwrap_or(60),
            take_profit_pct: round_to(
                rng.gen_range(TAKE_PROFIT_BOUND.min..=TAKE_PROFIT_BOUND.max),
                3,
            ),
            stop_loss_pct: round_to(
                rng.gen_range(STOP_LOSS_BOUND.min..=STOP_LOSS_BOUND.max),
                3,
            ),
            preferred_session: *SessionPreference::ALL
                .choose(rng)
                .unwrap_or(&SessionPreference::All),
            volatility_preference: *VolatilityPreference::ALL
                .choose(rng)
                .unwrap_or(&VolatilityPreference::All),
        };
        let parentage = match parent {
            Some(p) => Parentage::Mutant {
                parent: p.to_string(),
            },
            None => Parentage::Founder,
        };
        Genome::builder()
            .generation(generation)
            .parentage(parentage)
            .params(params)
            .build(rng)
    }

    /// Low risk, more confirmation, fewer trades.
    pub fn conservative<R: Rng + ?Sized>(rng: &mut R) -> Genome {
        Genome::builder()
            .name("Conservative")
            .params(GenomeParams {
                min_spread_threshold: 0.15,
                stability_ticks: 6,
                latency_buffer_pct: 0.05,
                position_size_pct: 3.0,
                max_hold_secs: 90,
                take_profit_pct: 0.15,
                stop_loss_pct: 0.20,
                preferred_session: SessionPreference::Mid,
                volatility_preference: VolatilityPreference::Low,
            })
            .build(rng)
    }

    /// Quick entries and larger size.
    pub fn aggressive<R: Rng + ?Sized>(rng: &mut R) -> Genome {
        Genome::builder()
            .name("Aggressive")
            .params(GenomeParams {
                min_spread_threshold: 0.03,
                stability_ticks: 2,
                latency_buffer_pct: 0.01,
                position_size_pct: 7.0,
                max_hold_secs: 30,
                take_profit_pct: 0.08,
                stop_loss_pct: 0.25,
                preferred_session: SessionPreference::All,
                volatility_preference: VolatilityPreference::High,
            })
            .build(rng)
    }

    pub fn balanced<R: Rng + ?Sized>(rng: &mut R) -> Genome {
        Genome::builder()
            .name("Balanced")
            .params(GenomeParams {
                min_spread_threshold: 0.08,
                stability_ticks: 4,
                latency_buffer_pct: 0.03,
                position_size_pct: 5.0,
                max_hold_secs: 60,
                take_profit_pct: 0.12,
                stop_loss_pct: 0.18,
                preferred_session: SessionPreference::Mid,
                volatility_preference: VolatilityPreference::Medium,
            })
            .build(rng)
    }

    /// A perturbed child of `self`.
    ///
    /// Each numeric gene moves with its own probability by Gaussian noise
    /// with standard deviation `0.3 * strength * (max - min)`, then is
    /// clamped. Categorical genes are resampled with probability 0.2.
    pub fn mutate<R: Rng + ?Sized>(&self, strength: f64, rng: &mut R) -> Genome {
        let strength = if strength.is_nan() {
            0.0
        } else {
            strength.clamp(0.0, 1.0)
        };
        let p = &self.params;

        let mut jitter = |value: f64, bound: ParamBound, prob: f64| -> f64 {
            if rng.gen_bool(prob) {
                bound.clamp(value + gaussian_noise(rng, strength * bound.width() * 0.3))
            } else {
                value
            }
        };

        let min_spread_threshold = round_to(jitter(p.min_spread_threshold, MIN_SPREAD_BOUND, 0.5), 3);
        let stability_ticks = jitter(p.stability_ticks as f64, STABILITY_TICKS_BOUND, 0.5);
        let latency_buffer_pct = round_to(jitter(p.latency_buffer_pct, LATENCY_BUFFER_BOUND, 0.4), 3);
        let position_size_pct = round_to(jitter(p.position_size_pct, POSITION_SIZE_BOUND, 0.4), 1);
        let max_hold_secs = jitter(p.max_hold_secs as f64, MAX_HOLD_BOUND, 0.4);
        let take_profit_pct = round_to(jitter(p.take_profit_pct, TAKE_PROFIT_BOUND, 0.3), 3);
        let stop_loss_pct = round_to(jitter(p.stop_loss_pct, STOP_LOSS_BOUND, 0.3), 3);

        let preferred_session = if rng.gen_bool(0.2) {
            *SessionPreference::ALL.choose(rng).unwrap_or(&p.preferred_session)
        } else {
            p.preferred_session
        };
        let volatility_preference = if rng.gen_bool(0.2) {
            *VolatilityPreference::ALL
                .choose(rng)
                .unwrap_or(&p.volatility_preference)
        } else {
            p.volatility_preference
        };

        let id = fresh_id(rng);
        Genome::builder()
            .name(format!("Mutant-{}", id[..4].to_uppercase()))
            .id(id)
            .generation(self.generation + 1)
            .parentage(Parentage::Mutant {
                parent: self.id.clone(),
            })
            .params(GenomeParams {
                min_spread_threshold,
                stability_ticks: clamp_int(stability_ticks, STABILITY_TICKS_BOUND),
                latency_buffer_pct,
                position_size_pct,
                max_hold_secs: clamp_int(max_hold_secs, MAX_HOLD_BOUND),
                take_profit_pct,
                stop_loss_pct,
                preferred_session,
                volatility_preference,
            })
            .build(rng)
    }

    /// Uniform crossover: each gene comes whole from one parent or the other.
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Genome, rng: &mut R) -> Genome {
        let (a, b) = (&self.params, &other.params);
        let mut pick = || rng.gen_bool(0.5);
        let params = GenomeParams {
            min_spread_threshold: if pick() { a.min_spread_threshold } else { b.min_spread_threshold },
            stability_ticks: if pick() { a.stability_ticks } else { b.stability_ticks },
            latency_buffer_pct: if pick() { a.latency_buffer_pct } else { b.latency_buffer_pct },
            position_size_pct: if pick() { a.position_size_pct } else { b.position_size_pct },
            max_hold_secs: if pick() { a.max_hold_secs } else { b.max_hold_secs },
            take_profit_pct: if pick() { a.take_profit_pct } else { b.take_profit_pct },
            stop_loss_pct: if pick() { a.stop_loss_pct } else { b.stop_loss_pct },
            preferred_session: if pick() { a.preferred_session } else { b.preferred_session },
            volatility_preference: if pick() {
                a.volatility_preference
            } else {
                b.volatility_preference
            },
        };

        let id = fresh_id(rng);
        Genome::builder()
            .name(format!("Child-{}", id[..4].to_uppercase()))
            .id(id)
            .generation(self.generation.max(other.generation) + 1)
            .parentage(Parentage::Crossover {
                first: self.id.clone(),
                second: other.id.clone(),
            })
            .params(params)
            .build(rng)
    }

    pub fn is_compatible_with_regime(&self, session: Session, volatility: Volatility) -> bool {
        self.params.preferred_session.matches(session)
            && self.params.volatility_preference.matches(volatility)
    }

    /// Euclidean distance over bound-normalised numeric genes, with each
    /// categorical mismatch counting as 1.
    pub fn distance(&self, other: &Genome) -> f64 {
        let a = self.params.normalized();
        let b = other.params.normalized();
        let mut sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        if self.params.preferred_session != other.params.preferred_session {
            sum += 1.0;
        }
        if self.params.volatility_preference != other.params.volatility_preference {
            sum += 1.0;
        }
        sum.sqrt()
    }

    pub fn summary(&self) -> String {
        let p = &self.params;
        format!(
            "Strategy: {} (Gen {})\n\
             Entry: min spread {:.3}%, stability {} ticks, latency buffer {:.3}%\n\
             Position: size {:.1}% of capital, max hold {}s\n\
             Exit: take profit {:.3}%, stop loss {:.3}%\n\
             Preferences: session {}, volatility {}",
            self.name,
            self.generation,
            p.min_spread_threshold,
            p.stability_ticks,
            p.latency_buffer_pct,
            p.position_size_pct,
            p.max_hold_secs,
            p.take_profit_pct,
            p.stop_loss_pct,
            p.preferred_session.as_str(),
            p.volatility_preference.as_str(),
        )
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] gen {}", self.name, self.id, self.generation)
    }
}

/// Builds a [`Genome`], clamping its parameters on `build`.
#[derive(Debug, Clone)]
pub struct GenomeBuilder {
    id: Option<String>,
    name: Option<String>,
    generation: u32,
    parentage: Parentage,
    params: GenomeParams,
}

impl Default for GenomeBuilder {
    fn default() -> Self {
        GenomeBuilder {
            id: None,
            name: None,
            generation: 1,
            parentage: Parentage::Founder,
            params: GenomeParams::default(),
        }
    }
}

impl GenomeBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn generation(mut self, generation: u32) -> Self {
        self.generation = generation.max(1);
        self
    }

    pub fn parentage(mut self, parentage: Parentage) -> Self {
        self.parentage = parentage;
        self
    }

    pub fn params(mut self, params: GenomeParams) -> Self {
        self.params = params;
        self
    }

    pub fn min_spread_threshold(mut self, value: f64) -> Self {
        self.params.min_spread_threshold = value;
        self
    }

    pub fn stability_ticks(mut self, value: u32) -> Self {
        self.params.stability_ticks = value;
        self
    }

    pub fn latency_buffer_pct(mut self, value: f64) -> Self {
        self.params.latency_buffer_pct = value;
        self
    }

    pub fn position_size_pct(mut self, value: f64) -> Self {
        self.params.position_size_pct = value;
        self
    }

    pub fn max_hold_secs(mut self, value: u32) -> Self {
        self.params.max_hold_secs = value;
        self
    }

    pub fn take_profit_pct(mut self, value: f64) -> Self {
        self.params.take_profit_pct = value;
        self
    }

    pub fn stop_loss_pct(mut self, value: f64) -> Self {
        self.params.stop_loss_pct = value;
        self
    }

    pub fn preferred_session(mut self, value: SessionPreference) -> Self {
        self.params.preferred_session = value;
        self
    }

    pub fn volatility_preference(mut self, value: VolatilityPreference) -> Self {
        self.params.volatility_preference = value;
        self
    }

    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> Genome {
        let id = self.id.unwrap_or_else(|| fresh_id(rng));
        let name = self
            .name
            .unwrap_or_else(|| format!("Strategy-{}", id.chars().take(4).collect::<String>().to_uppercase()));
        Genome {
            id,
            name,
            generation: self.generation,
            parentage: self.parentage,
            params: self.params.clamped(),
        }
    }
}
