//! Population management: the initial population, evolution cycles, and an
//! archive of every genome ever created for lineage queries.

use rand::Rng;
use rand::seq::index::sample;
use std::collections::HashMap;

use super::genome::Genome;
use super::metrics::RankedStrategy;

#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub retire_fraction: f64,
    pub mutation_probability: f64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            population_size: 8,
            retire_fraction: 0.25,
            mutation_probability: 0.7,
        }
    }
}

/// Summary of one evolution cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvolutionRecord {
    pub generation: u32,
    pub strategies_before: usize,
    pub strategies_after: usize,
    pub retired_count: usize,
    pub created_count: usize,
    pub mutated_count: usize,
    pub crossover_count: usize,
    pub best_id: String,
    pub worst_id: String,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedGenome {
    pub genome: Genome,
    pub active: bool,
}

#[derive(Debug)]
pub struct Generator {
    config: EvolutionConfig,
    generation: u32,
    history: Vec<EvolutionRecord>,
    archive: Vec<ArchivedGenome>,
    index: HashMap<String, usize>,
}

impl Generator {
    pub fn new(config: EvolutionConfig) -> Self {
        Generator {
            config,
            generation: 1,
            history: Vec::new(),
            archive: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn history(&self) -> &[EvolutionRecord] {
        &self.history
    }

    pub fn archive(&self) -> &[ArchivedGenome] {
        &self.archive
    }

    pub fn archived(&self, id: &str) -> Option<&ArchivedGenome> {
        self.index.get(id).map(|&i| &self.archive[i])
    }

    fn register(&mut self, genome: &Genome) {
        match self.index.get(genome.id()) {
            Some(&i) => self.archive[i].active = true,
            None => {
                self.index.insert(genome.id().to_string(), self.archive.len());
                self.archive.push(ArchivedGenome {
                    genome: genome.clone(),
                    active: true,
                });
            }
        }
    }

    fn retire(&mut self, id: &str) {
        if let Some(&i) = self.index.get(id) {
            self.archive[i].active = false;
        }
    }

    /// The three presets followed by random genomes, all generation 1.
    pub fn create_initial_population<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Genome> {
        let size = self.config.population_size;
        let mut population = vec![
            Genome::conservative(rng),
            Genome::aggressive(rng),
            Genome::balanced(rng),
        ];
        population.truncate(size);
        while population.len() < size {
            population.push(Genome::random(1, None, rng));
        }
        for genome in &population {
            self.register(genome);
            tracing::debug!(id = genome.id(), name = genome.name(), "created");
        }
        tracing::info!(strategies = population.len(), "created initial population");
        population
    }

    /// Runs one cycle over strategies ranked best first.
    ///
    /// The top `max(2, floor(n * (1 - retire_fraction)))` survive; the rest
    /// are retired. Offspring fill the population back up: mostly mutants,
    /// with weaker survivors mutated harder, otherwise crossovers of two
    /// distinct survivors. An empty ranking yields a fresh initial
    /// population.
    pub fn evolve<R: Rng + ?Sized>(&mut self, ranked: &[RankedStrategy], rng: &mut R) -> Vec<Genome> {
        if ranked.is_empty() {
            tracing::warn!("no strategies to evolve, creating new population");
            return self.create_initial_population(rng);
        }

        self.generation += 1;
        let n = ranked.len();
        let keep = ((n as f64 * (1.0 - self.config.retire_fraction)).floor() as usize)
            .max(2)
            .min(n);
        let (survivors, retired) = ranked.split_at(keep);

        for r in retired {
            self.retire(r.genome.id());
            tracing::debug!(
                id = r.genome.id(),
                score = r.metrics.composite_score,
                "retired"
            );
        }

        let mut population: Vec<Genome> = survivors.iter().map(|r| r.genome.clone()).collect();
        population.truncate(self.config.population_size);

        let mut mutated = 0;
        let mut crossed = 0;
        while population.len() < self.config.population_size {
            let child = if survivors.len() < 2 || rng.gen_bool(self.config.mutation_probability) {
                let rank = rng.gen_range(0..survivors.len());
                let strength = 0.1 + 0.3 * (rank as f64 / survivors.len() as f64);
                let parent = &survivors[rank].genome;
                let child = parent.mutate(strength, rng);
                tracing::debug!(id = child.id(), parent = parent.id(), strength, "mutated");
                mutated += 1;
                child
            } else {
                let pair = sample(rng, survivors.len(), 2);
                let (a, b) = (&survivors[pair.index(0)].genome, &survivors[pair.index(1)].genome);
                let child = a.crossover(b, rng);
                tracing::debug!(id = child.id(), first = a.id(), second = b.id(), "crossed");
                crossed += 1;
                child
            };
            self.register(&child);
            population.push(child);
        }

        let avg_score = ranked.iter().map(|r| r.metrics.composite_score).sum::<f64>() / n as f64;
        let record = EvolutionRecord {
            generation: self.generation,
            strategies_before: n,
            strategies_after: population.len(),
            retired_count: retired.len(),
            created_count: mutated + crossed,
            mutated_count: mutated,
            crossover_count: crossed,
            best_id: ranked[0].genome.id().to_string(),
            worst_id: ranked[n - 1].genome.id().to_string(),
            avg_score,
        };
        tracing::info!(
            generation = record.generation,
            retired = record.retired_count,
            created = record.created_count,
            population = record.strategies_after,
            "evolution complete"
        );
        self.history.push(record);
        population
    }

    /// Replaces the last `count` genomes with random ones at the current
    /// generation, keeping the population size.
    pub fn introduce_diversity<R: Rng + ?Sized>(
        &mut self,
        mut population: Vec<Genome>,
        count: usize,
        rng: &mut R,
    ) -> Vec<Genome> {
        let size = self.config.population_size;
        let count = count.min(size);
        let keep = population.len().min(size - count);
        for dropped in population.drain(keep..) {
            self.retire(dropped.id());
        }
        for _ in 0..count {
            let genome = Genome::random(self.generation, None, rng);
            self.register(&genome);
            population.push(genome);
        }
        tracing::info!(injected = count, "injected random strategies for diversity");
        population
    }

    /// Single-parent ancestry of `id`, oldest first, through the archive.
    /// Stops at a founder or a crossover child.
    pub fn lineage(&self, id: &str) -> Vec<String> {
        let mut lineage = Vec::new();
        let mut current = self.archived(id);
        while let Some(entry) = current {
            lineage.push(entry.genome.id().to_string());
            current = entry.genome.parent_id().and_then(|p| self.archived(p));
        }
        lineage.reverse();
        lineage
    }

    pub fn evolution_summary(&self) -> String {
        if self.history.is_empty() {
            return "No evolution cycles completed yet.".to_string();
        }
        let mut lines = vec![
            "Evolution History".to_string(),
            "=".repeat(50),
            format!("Total generations: {}", self.generation),
            String::new(),
            "Recent cycles:".to_string(),
        ];
        let start = self.history.len().saturating_sub(5);
        for r in &self.history[start..] {
            lines.push(format!(
                "  Gen {}: retired {}, created {} ({} mutated, {} crossed), avg score {:.2}",
                r.generation,
                r.retired_count,
                r.created_count,
                r.mutated_count,
                r.crossover_count,
                r.avg_score
            ));
        }
        lines.join("\n")
    }
}

/// Mean pairwise [`Genome::distance`] across a population.
pub fn population_diversity(population: &[Genome]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in population.iter().enumerate() {
        for b in &population[i + 1..] {
            total += a.distance(b);
            pairs += 1;
        }
    }
    if pairs == 0 { 0.0 } else { total / pairs as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{Evaluator, PerformanceMetrics};
    use crate::domain::strategy_state::StrategyState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ranked(population: &[Genome]) -> Vec<RankedStrategy> {
        let evaluator = Evaluator::default();
        population
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let state = StrategyState::new(g.clone(), 10_000.0);
                let metrics = PerformanceMetrics {
                    composite_score: 100.0 - i as f64,
                    ..evaluator.calculate(&state, 1)
                };
                RankedStrategy {
                    genome: g.clone(),
                    metrics,
                }
            })
            .collect()
    }

    #[test]
    fn initial_population_has_presets_then_randoms() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut generator = Generator::new(EvolutionConfig::default());
        let pop = generator.create_initial_population(&mut rng);
        assert_eq!(pop.len(), 8);
        assert_eq!(pop[0].name(), "Conservative");
        assert_eq!(pop[1].name(), "Aggressive");
        assert_eq!(pop[2].name(), "Balanced");
        assert!(pop.iter().all(|g| g.generation() == 1));
        assert_eq!(generator.archive().len(), 8);
    }

    #[test]
    fn evolve_keeps_size_and_survivors() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut generator = Generator::new(EvolutionConfig::default());
        let pop = generator.create_initial_population(&mut rng);
        let next = generator.evolve(&ranked(&pop), &mut rng);
        assert_eq!(next.len(), 8);
        // floor(8 * 0.75) = 6
        for (a, b) in pop.iter().take(6).zip(next.iter()) {
            assert_eq!(a.id(), b.id());
        }
        let record = &generator.history()[0];
        assert_eq!(record.generation, 2);
        assert_eq!(record.retired_count, 2);
        assert_eq!(record.created_count, 2);
        assert_eq!(record.mutated_count + record.crossover_count, 2);
        assert_eq!(record.best_id, pop[0].id());
        assert_eq!(record.worst_id, pop[7].id());
        assert!(!generator.archived(pop[7].id()).unwrap().active);
        assert!(generator.archived(pop[0].id()).unwrap().active);
    }

    #[test]
    fn evolve_keeps_at_least_two() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut generator = Generator::new(EvolutionConfig {
            population_size: 3,
            retire_fraction: 0.5,
            mutation_probability: 0.0,
        });
        let pop = generator.create_initial_population(&mut rng);
        let next = generator.evolve(&ranked(&pop), &mut rng);
        assert_eq!(next.len(), 3);
        assert_eq!(generator.history()[0].retired_count, 1);
        assert_eq!(generator.history()[0].crossover_count, 1);
        let child = &next[2];
        let parents = child.parent_ids();
        assert_eq!(parents.len(), 2);
        assert_ne!(parents[0], parents[1]);
    }

    #[test]
    fn offspring_generations_follow_parents() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut generator = Generator::new(EvolutionConfig::default());
        let mut pop = generator.create_initial_population(&mut rng);
        for _ in 0..5 {
            pop = generator.evolve(&ranked(&pop), &mut rng);
            for g in &pop {
                match g.parent_ids().as_slice() {
                    [] => assert_eq!(g.generation(), 1),
                    [p] => {
                        let parent = &generator.archived(p).unwrap().genome;
                        assert_eq!(g.generation(), parent.generation() + 1);
                    }
                    [a, b] => {
                        let ga = generator.archived(a).unwrap().genome.generation();
                        let gb = generator.archived(b).unwrap().genome.generation();
                        assert_eq!(g.generation(), ga.max(gb) + 1);
                    }
                    _ => unreachable!(),
                }
            }
        }
        assert_eq!(generator.generation(), 6);
    }

    #[test]
    fn empty_ranking_recovers_with_fresh_population() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut generator = Generator::new(EvolutionConfig::default());
        let pop = generator.evolve(&[], &mut rng);
        assert_eq!(pop.len(), 8);
        assert!(generator.history().is_empty());
    }

    #[test]
    fn introduce_diversity_keeps_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut generator = Generator::new(EvolutionConfig::default());
        let pop = generator.create_initial_population(&mut rng);
        let last = pop[7].id().to_string();
        let pop = generator.introduce_diversity(pop, 2, &mut rng);
        assert_eq!(pop.len(), 8);
        assert!(pop.iter().all(|g| g.id() != last));
        assert!(!generator.archived(&last).unwrap().active);
    }

    #[test]
    fn lineage_walks_mutation_chain() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut generator = Generator::new(EvolutionConfig::default());
        let root = Genome::balanced(&mut rng);
        let child = root.mutate(0.2, &mut rng);
        let grandchild = child.mutate(0.2, &mut rng);
        for g in [&root, &child, &grandchild] {
            generator.register(g);
        }
        assert_eq!(
            generator.lineage(grandchild.id()),
            vec![root.id().to_string(), child.id().to_string(), grandchild.id().to_string()]
        );
        assert!(generator.lineage("missing").is_empty());
    }

    #[test]
    fn diversity_is_zero_for_clones() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let g = Genome::balanced(&mut rng);
        assert_eq!(population_diversity(&[g.clone(), g]), 0.0);
        let mixed = vec![Genome::conservative(&mut rng), Genome::aggressive(&mut rng)];
        assert!(population_diversity(&mixed) > 0.0);
    }

    #[test]
    fn summary_reports_cycles() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut generator = Generator::new(EvolutionConfig::default());
        assert!(generator.evolution_summary().contains("No evolution"));
        let pop = generator.create_initial_population(&mut rng);
        generator.evolve(&ranked(&pop), &mut rng);
        assert!(generator.evolution_summary().contains("Gen 2"));
    }
}
