//! The exploration engine: explorer contract, bidding, and the
//! built-in evolutionary explorer.
//!
//! An exploration request moves through the phases Idle → Bidding →
//! Searching → Streaming → Done/Cancelled. `bid` declares, without
//! side effects, whether an explorer can search a decision model and
//! which objectives it targets; the caller picks the explorer whose
//! bidding dominates. `explore` produces a lazy, finite-or-infinite,
//! non-restartable stream of solutions ordered by search progress.
//! Solutions always satisfy every feasibility constraint, budgets are
//! honored at generation boundaries, and the same (model, objectives)
//! pair is never emitted twice within one call.

pub mod codec;
pub mod constraints;
pub mod evolution;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    downcast_decision, AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
    AperiodicAsynchronousDataflowToPartitionedTiledMulticore, DecisionModel, ExplorationBidding,
    ExplorationSolution, ExplorationView, MappingVariables,
};

use codec::MulticoreDataflowCodec;
use evolution::{Evolution, EvolutionSettings, ObjectiveSpace};

/// Flat configuration record of one exploration request.
///
/// Budgets at or below zero mean unbounded; an empty target set means
/// every objective the explorer supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationConfiguration {
    /// Wall-clock budget for the whole exploration, in seconds.
    pub total_timeout: i64,
    /// Wall-clock budget since the last improvement, in seconds.
    pub improvement_timeout: i64,
    /// Cap on emitted solutions.
    pub max_sols: i64,
    /// Cap on search iterations (generations).
    pub improvement_iterations: i64,
    /// Granularity hint for discretizing time, solver-specific.
    pub time_resolution: i64,
    /// Granularity hint for discretizing memory, solver-specific.
    pub memory_resolution: i64,
    /// Suppress solutions dominated by any previous solution.
    pub strict: bool,
    /// Explicit target-objective subset.
    pub target_objectives: BTreeSet<String>,
}

impl Default for ExplorationConfiguration {
    fn default() -> Self {
        Self {
            total_timeout: 0,
            improvement_timeout: 0,
            max_sols: 0,
            improvement_iterations: 0,
            time_resolution: 0,
            memory_resolution: 0,
            strict: false,
            target_objectives: BTreeSet::new(),
        }
    }
}

/// Lifecycle of one exploration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationPhase {
    /// No request in flight.
    Idle,
    /// Collecting biddings.
    Bidding,
    /// Search running, nothing emitted yet.
    Searching,
    /// Solutions flowing to the consumer.
    Streaming,
    /// Search finished within its budgets.
    Done,
    /// Consumer cancelled the request.
    Cancelled,
}

/// Cooperative cancellation signal for a running search.
///
/// The search checks the token at each generation boundary, never
/// preemptively, and stops scheduling further fitness evaluations once
/// it is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A search backend for decision models.
pub trait Explorer: Send + Sync {
    /// Stable identifier of this explorer.
    fn unique_identifier(&self) -> String;

    /// Declare capability for a decision model, without side effects.
    fn bid(&self, model: &Arc<dyn DecisionModel>) -> ExplorationBidding;

    /// Search a decision model, seeded with previously found
    /// solutions.
    ///
    /// The returned iterator is lazy and non-restartable; it stops at
    /// the configured budgets, and stops promptly after the
    /// cancellation token fires.
    fn explore(
        &self,
        model: Arc<dyn DecisionModel>,
        previous_solutions: &[ExplorationSolution],
        configuration: ExplorationConfiguration,
        cancellation: CancellationToken,
    ) -> Box<dyn Iterator<Item = ExplorationSolution> + Send>;
}

/// Index of the bidding that should win an exploration request.
///
/// Prefers a bidding dominating every other capable bidding; falls
/// back to the most competitive capable one.
pub fn pick_best_bidding(biddings: &[ExplorationBidding]) -> Option<usize> {
    let capable: Vec<usize> = (0..biddings.len())
        .filter(|&i| biddings[i].can_explore)
        .collect();
    if capable.is_empty() {
        return None;
    }
    capable
        .iter()
        .copied()
        .find(|&i| {
            capable
                .iter()
                .all(|&j| j == i || biddings[i].dominates(&biddings[j]))
        })
        .or_else(|| {
            capable.into_iter().max_by(|&a, &b| {
                biddings[a]
                    .competitiveness
                    .partial_cmp(&biddings[b].competitiveness)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        })
}

/// The concrete composites the built-in explorer understands.
enum MappingComposite {
    MemMappable(AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore),
    Tiled(AperiodicAsynchronousDataflowToPartitionedTiledMulticore),
}

impl MappingComposite {
    fn try_from_model(model: &Arc<dyn DecisionModel>) -> Option<Self> {
        if let Some(m) = downcast_decision::<
            AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
        >(model)
        {
            return Some(Self::MemMappable(m.clone()));
        }
        if let Some(m) =
            downcast_decision::<AperiodicAsynchronousDataflowToPartitionedTiledMulticore>(model)
        {
            return Some(Self::Tiled(m.clone()));
        }
        None
    }

    fn view(&self) -> ExplorationView {
        match self {
            Self::MemMappable(m) => m.view(),
            Self::Tiled(m) => m.view(),
        }
    }

    fn variables(&self) -> &MappingVariables {
        match self {
            Self::MemMappable(m) => &m.variables,
            Self::Tiled(m) => &m.variables,
        }
    }

    /// Rebuild the composite with solved variables, folding the
    /// achieved throughputs back into the applications.
    fn rebuild(
        &self,
        variables: MappingVariables,
        objectives: &BTreeMap<String, f64>,
    ) -> Arc<dyn DecisionModel> {
        match self {
            Self::MemMappable(m) => {
                let mut solved = m.with_variables(variables);
                annotate_throughputs(
                    &mut solved.aperiodic_asynchronous_dataflows,
                    objectives,
                );
                Arc::new(solved)
            }
            Self::Tiled(m) => {
                let mut solved = m.with_variables(variables);
                annotate_throughputs(
                    &mut solved.aperiodic_asynchronous_dataflows,
                    objectives,
                );
                Arc::new(solved)
            }
        }
    }
}

/// Record each process's achieved throughput as its new minimum.
fn annotate_throughputs(
    apps: &mut [crate::types::AperiodicAsynchronousDataflow],
    objectives: &BTreeMap<String, f64>,
) {
    for app in apps {
        let processes: Vec<String> = app.processes.iter().cloned().collect();
        for process in processes {
            let name = ObjectiveSpace::inv_throughput_name(&process);
            if let Some(&inverse) = objectives.get(&name) {
                if inverse > 0.0 {
                    app.process_minimum_throughput.insert(process, 1.0 / inverse);
                }
            }
        }
    }
}

/// The built-in constrained multi-objective evolutionary explorer.
///
/// Heuristic, never exact; bids on both mapping composite shapes.
pub struct EvolutionaryExplorer {
    settings: EvolutionSettings,
    seed: u64,
}

impl EvolutionaryExplorer {
    /// An explorer with default settings and a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            settings: EvolutionSettings::default(),
            seed,
        }
    }

    /// Override the evolutionary settings.
    pub fn with_settings(mut self, settings: EvolutionSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for EvolutionaryExplorer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Explorer for EvolutionaryExplorer {
    fn unique_identifier(&self) -> String {
        "EvolutionaryExplorer".to_string()
    }

    fn bid(&self, model: &Arc<dyn DecisionModel>) -> ExplorationBidding {
        let Some(composite) = MappingComposite::try_from_model(model) else {
            return ExplorationBidding::declined(self.unique_identifier());
        };
        let view = composite.view();
        let objectives = ObjectiveSpace::new(&view, &BTreeSet::new());
        debug!(
            model = %model.category(),
            objectives = objectives.names.len(),
            "bidding on decision model"
        );
        ExplorationBidding {
            explorer_unique_identifier: self.unique_identifier(),
            can_explore: true,
            is_exact: false,
            competitiveness: 1.0,
            target_objectives: objectives.names.into_iter().collect(),
            additional_numeric_properties: Default::default(),
        }
    }

    fn explore(
        &self,
        model: Arc<dyn DecisionModel>,
        previous_solutions: &[ExplorationSolution],
        configuration: ExplorationConfiguration,
        cancellation: CancellationToken,
    ) -> Box<dyn Iterator<Item = ExplorationSolution> + Send> {
        let Some(composite) = MappingComposite::try_from_model(&model) else {
            return Box::new(std::iter::empty());
        };
        let view = Arc::new(composite.view());
        let codec = MulticoreDataflowCodec::new(view.clone());
        let objective_space = ObjectiveSpace::new(&view, &configuration.target_objectives);

        // Previous solutions of the same shape seed the population.
        let mut seeds = Vec::new();
        for previous in previous_solutions {
            if let Some(prior) = MappingComposite::try_from_model(&previous.solved) {
                if let Ok(genotype) = codec.encode(prior.variables()) {
                    seeds.push(genotype);
                }
            }
        }
        if !composite.variables().is_empty() {
            if let Ok(genotype) = codec.encode(composite.variables()) {
                seeds.push(genotype);
            }
        }

        let evolution = Evolution::new(
            view,
            objective_space.clone(),
            self.settings.clone(),
            self.seed,
            seeds,
        );
        Box::new(EvolutionStream {
            evolution,
            codec,
            composite,
            objective_names: objective_space.names,
            configuration,
            cancellation,
            previous: previous_solutions.to_vec(),
            started: Instant::now(),
            last_improvement: Instant::now(),
            emitted_fingerprints: HashSet::new(),
            emitted_count: 0,
            pending: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Lazy solution stream driving the evolution one generation at a
/// time.
struct EvolutionStream {
    evolution: Evolution,
    codec: MulticoreDataflowCodec,
    composite: MappingComposite,
    objective_names: Vec<String>,
    configuration: ExplorationConfiguration,
    cancellation: CancellationToken,
    previous: Vec<ExplorationSolution>,
    started: Instant,
    last_improvement: Instant,
    emitted_fingerprints: HashSet<u64>,
    emitted_count: i64,
    pending: VecDeque<ExplorationSolution>,
    exhausted: bool,
}

impl EvolutionStream {
    fn budgets_exhausted(&self) -> bool {
        let c = &self.configuration;
        if self.cancellation.is_cancelled() {
            return true;
        }
        if c.max_sols > 0 && self.emitted_count >= c.max_sols {
            return true;
        }
        if c.total_timeout > 0
            && self.started.elapsed() >= Duration::from_secs(c.total_timeout as u64)
        {
            return true;
        }
        if c.improvement_timeout > 0
            && self.last_improvement.elapsed()
                >= Duration::from_secs(c.improvement_timeout as u64)
        {
            return true;
        }
        if c.improvement_iterations > 0
            && self.evolution.generation() >= c.improvement_iterations as u64
        {
            return true;
        }
        false
    }

    /// Queue every feasible non-dominated individual not yet emitted.
    fn harvest(&mut self) {
        let mut fresh = Vec::new();
        for individual in self.evolution.feasible_front() {
            let variables = self.codec.decode(&individual.genotype);
            let objectives: BTreeMap<String, f64> = self
                .objective_names
                .iter()
                .cloned()
                .zip(individual.objectives.iter().copied())
                .collect();
            let solved = self.composite.rebuild(variables, &objectives);
            let solution = ExplorationSolution::new(objectives, solved);
            if self.emitted_fingerprints.contains(&solution.fingerprint()) {
                continue;
            }
            if self.configuration.strict
                && self.previous.iter().any(|prior| prior.dominates(&solution))
            {
                continue;
            }
            fresh.push(solution);
        }
        if !fresh.is_empty() {
            self.last_improvement = Instant::now();
        }
        for solution in fresh {
            self.emitted_fingerprints.insert(solution.fingerprint());
            self.pending.push_back(solution);
        }
    }
}

impl Iterator for EvolutionStream {
    type Item = ExplorationSolution;

    fn next(&mut self) -> Option<ExplorationSolution> {
        loop {
            if self.configuration.max_sols > 0
                && self.emitted_count >= self.configuration.max_sols
            {
                return None;
            }
            if let Some(solution) = self.pending.pop_front() {
                self.emitted_count += 1;
                return Some(solution);
            }
            if self.exhausted {
                return None;
            }
            if self.budgets_exhausted() {
                debug!(
                    generations = self.evolution.generation(),
                    emitted = self.emitted_count,
                    "exploration budgets exhausted"
                );
                self.exhausted = true;
                return None;
            }
            self.harvest();
            if self.pending.is_empty() {
                self.evolution.step();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;
    use std::collections::BTreeMap;

    fn model() -> Arc<dyn DecisionModel> {
        Arc::new(fixtures::two_process_composite())
    }

    #[test]
    fn test_bid_on_known_composite() {
        let explorer = EvolutionaryExplorer::new(1);
        let bidding = explorer.bid(&model());
        assert!(bidding.can_explore);
        assert!(!bidding.is_exact);
        assert!(bidding.target_objectives.contains("nUsedPEs"));
        assert!(bidding.target_objectives.contains("invThroughput(A)"));
    }

    #[test]
    fn test_bid_declines_unknown_model() {
        use crate::types::OpaqueDecisionModel;
        let explorer = EvolutionaryExplorer::new(1);
        let opaque: Arc<dyn DecisionModel> = Arc::new(OpaqueDecisionModel {
            category: "Mystery".to_string(),
            part: BTreeSet::new(),
            body_json: None,
            body_cbor: None,
        });
        assert!(!explorer.bid(&opaque).can_explore);
    }

    #[test]
    fn test_explore_respects_max_sols() {
        let explorer = EvolutionaryExplorer::new(42);
        let configuration = ExplorationConfiguration {
            max_sols: 1,
            improvement_iterations: 50,
            ..ExplorationConfiguration::default()
        };
        let solutions: Vec<_> = explorer.explore(model(), &[], configuration, CancellationToken::new()).collect();
        assert_eq!(solutions.len(), 1);
        assert!(solutions[0].objectives["nUsedPEs"] <= 2.0);
    }

    #[test]
    fn test_explore_never_repeats_a_solution() {
        let explorer = EvolutionaryExplorer::new(7);
        let configuration = ExplorationConfiguration {
            improvement_iterations: 30,
            ..ExplorationConfiguration::default()
        };
        let solutions: Vec<_> = explorer.explore(model(), &[], configuration, CancellationToken::new()).collect();
        assert!(!solutions.is_empty());
        let fingerprints: HashSet<u64> = solutions.iter().map(|s| s.fingerprint()).collect();
        assert_eq!(fingerprints.len(), solutions.len());
    }

    #[test]
    fn test_explore_solutions_are_feasible() {
        use crate::explore::constraints::{GenotypeConstraint, MultiConstraint};

        let explorer = EvolutionaryExplorer::new(3);
        let configuration = ExplorationConfiguration {
            improvement_iterations: 10,
            ..ExplorationConfiguration::default()
        };
        let base = fixtures::two_process_composite();
        let view = Arc::new(base.view());
        let codec = MulticoreDataflowCodec::new(view.clone());
        let constraints = MultiConstraint::standard(view);

        for solution in explorer.explore(model(), &[], configuration, CancellationToken::new()) {
            let solved = downcast_decision::<
                AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
            >(&solution.solved)
            .expect("solved model keeps its shape");
            let genotype = codec.encode(&solved.variables).expect("solved is encodable");
            assert!(constraints.test(&genotype));
        }
    }

    #[test]
    fn test_strict_mode_suppresses_dominated() {
        let explorer = EvolutionaryExplorer::new(11);
        // A previous solution that dominates everything: zero on every
        // objective.
        let view = fixtures::two_process_composite().view();
        let names = ObjectiveSpace::new(&view, &BTreeSet::new()).names;
        let perfect = ExplorationSolution::new(
            names.into_iter().map(|n| (n, 0.0)).collect::<BTreeMap<_, _>>(),
            model(),
        );
        let configuration = ExplorationConfiguration {
            strict: true,
            improvement_iterations: 10,
            ..ExplorationConfiguration::default()
        };
        let solutions: Vec<_> = explorer
            .explore(model(), &[perfect], configuration, CancellationToken::new())
            .collect();
        assert!(solutions.is_empty());
    }

    #[test]
    fn test_pick_best_bidding_prefers_dominant() {
        let weak = ExplorationBidding {
            explorer_unique_identifier: "weak".to_string(),
            can_explore: true,
            is_exact: false,
            competitiveness: 0.5,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        };
        let strong = ExplorationBidding {
            explorer_unique_identifier: "strong".to_string(),
            can_explore: true,
            is_exact: false,
            competitiveness: 2.0,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        };
        let declined = ExplorationBidding::declined("absent");

        assert_eq!(
            pick_best_bidding(&[weak.clone(), strong.clone(), declined.clone()]),
            Some(1)
        );
        assert_eq!(pick_best_bidding(&[declined]), None);
        assert_eq!(pick_best_bidding(&[]), None);
    }

    #[test]
    fn test_configuration_serde_round_trip() {
        let configuration = ExplorationConfiguration {
            total_timeout: 30,
            strict: true,
            target_objectives: ["nUsedPEs".to_string()].into_iter().collect(),
            ..ExplorationConfiguration::default()
        };
        let json = serde_json::to_string(&configuration).unwrap();
        let back: ExplorationConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, configuration);
    }
}
