//! Market inputs consumed by the engine: paired-venue price events, spread
//! signals and regime snapshots.

use chrono::{NaiveDateTime, NaiveTime};
use std::fmt;

/// One of the two venues quoting the same instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Leg {
    Primary,
    Secondary,
}

impl Leg {
    pub fn other(self) -> Leg {
        match self {
            Leg::Primary => Leg::Secondary,
            Leg::Secondary => Leg::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Leg::Primary => "primary",
            Leg::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which leg is quoting lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    PrimaryCheaper,
    SecondaryCheaper,
    Equal,
}

impl Direction {
    /// The leg to buy on, if the legs differ.
    pub fn cheaper_leg(self) -> Option<Leg> {
        match self {
            Direction::PrimaryCheaper => Some(Leg::Primary),
            Direction::SecondaryCheaper => Some(Leg::Secondary),
            Direction::Equal => None,
        }
    }
}

/// A paired last-price update for one symbol.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriceEvent {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub primary_price: f64,
    pub secondary_price: f64,
    pub volume: Option<u64>,
}

/// Why an inbound event was discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventRejection {
    #[error("empty symbol")]
    EmptySymbol,

    #[error("{symbol}: {leg} price {price} is not positive")]
    NonPositivePrice { symbol: String, leg: Leg, price: f64 },

    #[error("{symbol}: {leg} price is not finite")]
    NonFinitePrice { symbol: String, leg: Leg },
}

impl PriceEvent {
    pub fn price(&self, leg: Leg) -> f64 {
        match leg {
            Leg::Primary => self.primary_price,
            Leg::Secondary => self.secondary_price,
        }
    }

    /// Absolute price difference between the legs.
    pub fn spread(&self) -> f64 {
        (self.primary_price - self.secondary_price).abs()
    }

    /// Spread as a percentage of the mid price.
    pub fn spread_pct(&self) -> f64 {
        let mid = (self.primary_price + self.secondary_price) / 2.0;
        if mid > 0.0 {
            self.spread() / mid * 100.0
        } else {
            0.0
        }
    }

    pub fn direction(&self) -> Direction {
        if self.primary_price < self.secondary_price {
            Direction::PrimaryCheaper
        } else if self.secondary_price < self.primary_price {
            Direction::SecondaryCheaper
        } else {
            Direction::Equal
        }
    }

    pub fn validate(&self) -> Result<(), EventRejection> {
        if self.symbol.trim().is_empty() {
            return Err(EventRejection::EmptySymbol);
        }
        for leg in [Leg::Primary, Leg::Secondary] {
            let price = self.price(leg);
            if !price.is_finite() {
                return Err(EventRejection::NonFinitePrice {
                    symbol: self.symbol.clone(),
                    leg,
                });
            }
            if price <= 0.0 {
                return Err(EventRejection::NonPositivePrice {
                    symbol: self.symbol.clone(),
                    leg,
                    price,
                });
            }
        }
        Ok(())
    }
}

/// Spread-opportunity signal for one symbol.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpreadSignal {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub current_spread_pct: f64,
    pub avg_spread_pct: f64,
    pub z_score: f64,
    pub signal_strength: f64,
    pub direction: Direction,
    pub ticks_stable: u32,
    pub is_actionable: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Volatility {
    Low,
    Medium,
    High,
}

impl Volatility {
    pub fn as_str(self) -> &'static str {
        match self {
            Volatility::Low => "low",
            Volatility::Medium => "medium",
            Volatility::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Liquidity {
    Thin,
    Normal,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpreadBehavior {
    Stable,
    Noisy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Session {
    PreOpen,
    Opening,
    Mid,
    Closing,
    Closed,
}

impl Session {
    /// Exchange session for a local time of day.
    ///
    /// Pre-open 09:00-09:15, opening 09:15-10:00, mid 10:00-14:30,
    /// closing 14:30-15:30, closed otherwise.
    pub fn from_time(time: NaiveTime) -> Session {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        if time >= hm(9, 0) && time < hm(9, 15) {
            Session::PreOpen
        } else if time >= hm(9, 15) && time < hm(10, 0) {
            Session::Opening
        } else if time >= hm(10, 0) && time < hm(14, 30) {
            Session::Mid
        } else if time >= hm(14, 30) && time < hm(15, 30) {
            Session::Closing
        } else {
            Session::Closed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Session::PreOpen => "pre_open",
            Session::Opening => "opening",
            Session::Mid => "mid",
            Session::Closing => "closing",
            Session::Closed => "closed",
        }
    }
}

/// Categorical market state plus the readings behind it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketRegime {
    pub volatility: Volatility,
    pub liquidity: Liquidity,
    pub spread_behavior: SpreadBehavior,
    pub session: Session,
    pub volatility_value: f64,
    pub avg_spread: f64,
    pub spread_std: f64,
    pub volume_ratio: f64,
}

impl MarketRegime {
    /// A regime with neutral readings in the given session.
    pub fn neutral(session: Session) -> Self {
        MarketRegime {
            volatility: Volatility::Medium,
            liquidity: Liquidity::Normal,
            spread_behavior: SpreadBehavior::Stable,
            session,
            volatility_value: 0.0,
            avg_spread: 0.0,
            spread_std: 0.0,
            volume_ratio: 1.0,
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Regime(vol={}, liq={:?}, spread={:?}, session={})",
            self.volatility.as_str(),
            self.liquidity,
            self.spread_behavior,
            self.session.as_str()
        )
    }
}
