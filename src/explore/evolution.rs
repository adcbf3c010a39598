//! Evolutionary search over mapping genotypes.
//!
//! The loop is a conventional multi-objective GA: tournament parent
//! selection, uniform crossover, per-gene reset mutation, constraint
//! repair at birth, and survivor selection by Pareto front then
//! crowding distance. All objectives are minimized. The operators are
//! deliberately replaceable; the exploration contract only requires
//! that emitted solutions are feasible, budgets are honored, and no
//! (model, objectives) pair repeats.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::analysis::{
    job_execution_weights, job_transfer_weights, inverse_throughputs, maximum_cycle_vector,
    scheduling_edges,
};
use crate::types::ExplorationView;

use super::codec::{Genotype, GenotypeShape};
use super::constraints::{GenotypeConstraint, MultiConstraint};

/// Tunables of the evolutionary loop.
#[derive(Debug, Clone)]
pub struct EvolutionSettings {
    /// Individuals kept between generations.
    pub population_size: usize,
    /// Probability that a selected pair recombines at all.
    pub crossover_probability: f64,
    /// Per-gene swap probability within a recombining pair.
    pub gene_swap_probability: f64,
    /// Per-gene reset probability.
    pub mutation_probability: f64,
    /// Tournament size for parent selection.
    pub tournament_size: usize,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            population_size: 32,
            crossover_probability: 0.2,
            gene_swap_probability: 0.25,
            mutation_probability: 0.2,
            tournament_size: 5,
        }
    }
}

/// The minimized objective vector layout for a view.
///
/// The first slot is the number of used processing elements, followed
/// by one inverse-throughput slot per process, filtered down to an
/// explicit target subset when one is configured.
#[derive(Debug, Clone)]
pub struct ObjectiveSpace {
    /// Objective names, in vector order.
    pub names: Vec<String>,
    include_n_used_pes: bool,
    process_indices: Vec<usize>,
}

impl ObjectiveSpace {
    /// Objective name for the used-processing-elements count.
    pub const N_USED_PES: &'static str = "nUsedPEs";

    /// Objective name for a process's inverse throughput.
    pub fn inv_throughput_name(process: &str) -> String {
        format!("invThroughput({})", process)
    }

    /// The objective layout for a view, restricted to a target subset.
    ///
    /// An empty target set selects every objective.
    pub fn new(view: &ExplorationView, target_objectives: &BTreeSet<String>) -> Self {
        let mut names = Vec::new();
        let include_n_used_pes =
            target_objectives.is_empty() || target_objectives.contains(Self::N_USED_PES);
        if include_n_used_pes {
            names.push(Self::N_USED_PES.to_string());
        }
        let mut process_indices = Vec::new();
        for (p, process) in view.processes.iter().enumerate() {
            let name = Self::inv_throughput_name(process);
            if target_objectives.is_empty() || target_objectives.contains(&name) {
                process_indices.push(p);
                names.push(name);
            }
        }
        Self {
            names,
            include_n_used_pes,
            process_indices,
        }
    }

    /// Evaluate a genotype into its objective vector.
    ///
    /// The throughput objectives run the cycle analysis under the
    /// genotype's mapping, ordering, and reservations.
    pub fn evaluate(&self, view: &ExplorationView, genotype: &Genotype) -> Vec<f64> {
        let mut objectives = Vec::with_capacity(self.names.len());
        if self.include_n_used_pes {
            let used: BTreeSet<usize> = genotype.process_scheduling.iter().copied().collect();
            objectives.push(used.len() as f64);
        }
        if !self.process_indices.is_empty() {
            let job_mapping: Vec<usize> = view
                .job_process
                .iter()
                .map(|&p| genotype.process_scheduling[p])
                .collect();
            let execution = job_execution_weights(view, &genotype.process_scheduling);
            let transfers =
                job_transfer_weights(view, &genotype.process_scheduling, &genotype.reservations);
            let (precede_edges, cycle_edges) =
                scheduling_edges(&job_mapping, &genotype.job_ordering);
            let mut must_precede = view.job_direct_successors.clone();
            for (i, j) in precede_edges {
                must_precede[i].insert(j);
            }
            let mut must_cycle = vec![BTreeSet::new(); view.jobs.len()];
            for (i, j) in cycle_edges {
                must_cycle[i].insert(j);
            }
            let cycle_values =
                maximum_cycle_vector(&execution, &transfers, &must_precede, &must_cycle);
            let inverse = inverse_throughputs(view, &cycle_values);
            for &p in &self.process_indices {
                objectives.push(inverse[p]);
            }
        }
        objectives
    }
}

/// One evaluated member of the population.
#[derive(Debug, Clone)]
pub struct Individual {
    /// The chromosome.
    pub genotype: Genotype,
    /// Its minimized objective vector.
    pub objectives: Vec<f64>,
}

/// Componentwise Pareto dominance between objective vectors.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| x <= y)
        && a.iter().zip(b).any(|(x, y)| x < y)
}

/// Indices of the non-dominated members of a set of objective vectors.
pub fn non_dominated(points: &[Vec<f64>]) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| {
            !points
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && dominates(other, &points[i]))
        })
        .collect()
}

/// Pareto front index per point; front 0 is non-dominated.
fn pareto_ranks(points: &[Vec<f64>]) -> Vec<usize> {
    let n = points.len();
    let mut rank = vec![usize::MAX; n];
    let mut assigned = 0;
    let mut front = 0;
    while assigned < n {
        let members: Vec<usize> = (0..n)
            .filter(|&i| rank[i] == usize::MAX)
            .filter(|&i| {
                !(0..n).any(|j| {
                    j != i && rank[j] == usize::MAX && dominates(&points[j], &points[i])
                })
            })
            .collect();
        if members.is_empty() {
            // Numerically identical leftovers; close them out.
            let leftovers: Vec<usize> = (0..n).filter(|&i| rank[i] == usize::MAX).collect();
            for i in leftovers {
                rank[i] = front;
                assigned += 1;
            }
            break;
        }
        for &i in &members {
            rank[i] = front;
            assigned += 1;
        }
        front += 1;
    }
    rank
}

/// Crowding distance per point within its front.
fn crowding_distances(points: &[Vec<f64>], ranks: &[usize]) -> Vec<f64> {
    let n = points.len();
    let mut distance = vec![0.0; n];
    if n == 0 {
        return distance;
    }
    let objectives = points[0].len();
    let fronts: BTreeSet<usize> = ranks.iter().copied().collect();
    for front in fronts {
        let members: Vec<usize> = (0..n).filter(|&i| ranks[i] == front).collect();
        for m in 0..objectives {
            let mut sorted = members.clone();
            sorted.sort_by(|&a, &b| {
                points[a][m]
                    .partial_cmp(&points[b][m])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            if let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) {
                distance[first] = f64::INFINITY;
                distance[last] = f64::INFINITY;
                let span = points[last][m] - points[first][m];
                if span > 0.0 {
                    for w in sorted.windows(3) {
                        distance[w[1]] += (points[w[2]][m] - points[w[0]][m]) / span;
                    }
                }
            }
        }
    }
    distance
}

/// The evolving population and its operators.
pub struct Evolution {
    view: Arc<ExplorationView>,
    shape: GenotypeShape,
    objective_space: ObjectiveSpace,
    constraints: MultiConstraint,
    settings: EvolutionSettings,
    rng: SmallRng,
    population: Vec<Individual>,
    generation: u64,
}

impl Evolution {
    /// Start an evolution from seed genotypes plus random fill.
    ///
    /// Seeds (typically previous solutions) are repaired and kept in
    /// the initial population.
    pub fn new(
        view: Arc<ExplorationView>,
        objective_space: ObjectiveSpace,
        settings: EvolutionSettings,
        seed: u64,
        seeds: Vec<Genotype>,
    ) -> Self {
        let shape = GenotypeShape::of(&view);
        let constraints = MultiConstraint::standard(view.clone());
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut population = Vec::with_capacity(settings.population_size);
        for genotype in seeds.into_iter().take(settings.population_size) {
            let repaired = constraints.repair_to_feasibility(&genotype, 0);
            let objectives = objective_space.evaluate(&view, &repaired);
            population.push(Individual {
                genotype: repaired,
                objectives,
            });
        }
        while population.len() < settings.population_size {
            let random = random_genotype(&shape, &mut rng);
            let repaired = constraints.repair_to_feasibility(&random, 0);
            let objectives = objective_space.evaluate(&view, &repaired);
            population.push(Individual {
                genotype: repaired,
                objectives,
            });
        }
        Self {
            view,
            shape,
            objective_space,
            constraints,
            settings,
            rng,
            population,
            generation: 0,
        }
    }

    /// Generations advanced so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current population.
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Members of the current population that satisfy every constraint.
    pub fn feasible_front(&self) -> Vec<&Individual> {
        let feasible: Vec<&Individual> = self
            .population
            .iter()
            .filter(|ind| self.constraints.test(&ind.genotype))
            .collect();
        let points: Vec<Vec<f64>> = feasible.iter().map(|i| i.objectives.clone()).collect();
        non_dominated(&points)
            .into_iter()
            .map(|i| feasible[i])
            .collect()
    }

    /// Advance one generation: breed, repair, evaluate, select.
    pub fn step(&mut self) {
        self.generation += 1;
        let mut offspring = Vec::with_capacity(self.settings.population_size);
        while offspring.len() < self.settings.population_size {
            let a = self.select_parent();
            let b = self.select_parent();
            let (mut child_a, mut child_b) = if self.rng.random_bool(self.settings.crossover_probability) {
                self.crossover(&a, &b)
            } else {
                (a, b)
            };
            self.mutate(&mut child_a);
            self.mutate(&mut child_b);
            for child in [child_a, child_b] {
                let repaired = self.constraints.repair_to_feasibility(&child, self.generation);
                let objectives = self.objective_space.evaluate(&self.view, &repaired);
                offspring.push(Individual {
                    genotype: repaired,
                    objectives,
                });
            }
        }
        self.population.append(&mut offspring);
        self.truncate_to_survivors();
    }

    fn select_parent(&mut self) -> Genotype {
        let points: Vec<Vec<f64>> = self.population.iter().map(|i| i.objectives.clone()).collect();
        let ranks = pareto_ranks(&points);
        let crowding = crowding_distances(&points, &ranks);
        let mut best = self.rng.random_range(0..self.population.len());
        for _ in 1..self.settings.tournament_size {
            let challenger = self.rng.random_range(0..self.population.len());
            let better = ranks[challenger] < ranks[best]
                || (ranks[challenger] == ranks[best] && crowding[challenger] > crowding[best]);
            if better {
                best = challenger;
            }
        }
        self.population[best].genotype.clone()
    }

    fn crossover(&mut self, a: &Genotype, b: &Genotype) -> (Genotype, Genotype) {
        let mut flat_a = a.as_vec();
        let mut flat_b = b.as_vec();
        for i in 0..flat_a.len() {
            if self.rng.random_bool(self.settings.gene_swap_probability) {
                std::mem::swap(&mut flat_a[i], &mut flat_b[i]);
            }
        }
        // The flat vectors keep the shape, so rebuilding cannot fail.
        let child_a = self.shape.from_vec(&flat_a).unwrap_or_else(|_| a.clone());
        let child_b = self.shape.from_vec(&flat_b).unwrap_or_else(|_| b.clone());
        (child_a, child_b)
    }

    fn mutate(&mut self, genotype: &mut Genotype) {
        let p = self.settings.mutation_probability;
        let shape = self.shape;
        for gene in genotype.process_memory_mapping.iter_mut() {
            if shape.memories > 0 && self.rng.random_bool(p) {
                *gene = self.rng.random_range(0..shape.memories);
            }
        }
        for gene in genotype.process_scheduling.iter_mut() {
            if shape.runtimes > 0 && self.rng.random_bool(p) {
                *gene = self.rng.random_range(0..shape.runtimes);
            }
        }
        for gene in genotype.buffer_memory_mapping.iter_mut() {
            if shape.memories > 0 && self.rng.random_bool(p) {
                *gene = self.rng.random_range(0..shape.memories);
            }
        }
        for gene in genotype.reservations.iter_mut() {
            if self.rng.random_bool(p) {
                *gene = self.rng.random_range(0..=shape.max_reservations);
            }
        }
        for gene in genotype.job_ordering.iter_mut() {
            if shape.jobs > 0 && self.rng.random_bool(p) {
                *gene = self.rng.random_range(0..shape.jobs);
            }
        }
    }

    fn truncate_to_survivors(&mut self) {
        let points: Vec<Vec<f64>> = self.population.iter().map(|i| i.objectives.clone()).collect();
        let ranks = pareto_ranks(&points);
        let crowding = crowding_distances(&points, &ranks);
        let mut order: Vec<usize> = (0..self.population.len()).collect();
        order.sort_by(|&a, &b| {
            ranks[a].cmp(&ranks[b]).then_with(|| {
                crowding[b]
                    .partial_cmp(&crowding[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        order.truncate(self.settings.population_size);
        order.sort_unstable();
        let mut keep = order.into_iter();
        let mut next = keep.next();
        let mut index = 0;
        self.population.retain(|_| {
            let kept = next == Some(index);
            if kept {
                next = keep.next();
            }
            index += 1;
            kept
        });
    }
}

/// A uniformly random genotype within a shape's allele ranges.
///
/// The ordering segment starts as a random permutation so every
/// scheduler sees distinct ranks before any repair.
pub fn random_genotype(shape: &GenotypeShape, rng: &mut SmallRng) -> Genotype {
    let mut ordering: Vec<usize> = (0..shape.jobs).collect();
    // Fisher-Yates.
    for i in (1..ordering.len()).rev() {
        let j = rng.random_range(0..=i);
        ordering.swap(i, j);
    }
    Genotype {
        process_memory_mapping: (0..shape.processes)
            .map(|_| rng.random_range(0..shape.memories.max(1)))
            .collect(),
        process_scheduling: (0..shape.processes)
            .map(|_| rng.random_range(0..shape.runtimes.max(1)))
            .collect(),
        buffer_memory_mapping: (0..shape.buffers)
            .map(|_| rng.random_range(0..shape.memories.max(1)))
            .collect(),
        reservations: (0..shape.processing_elements * shape.communication_elements)
            .map(|_| rng.random_range(0..=shape.max_reservations))
            .collect(),
        job_ordering: ordering,
    }
}
