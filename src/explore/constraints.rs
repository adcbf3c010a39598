//! Feasibility constraints over genotypes, with repair.
//!
//! Three independent constraints validate a chromosome against the
//! mapping, communication-reservation, and job-ordering rules. Each
//! exposes `test` and a deterministic `repair` keyed by the generation
//! counter, so repeated repairs of the same individual in the same
//! generation are reproducible. Repair is not required to fix every
//! violation at once; the search loop reapplies until `test` passes.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::types::ExplorationView;

use super::codec::Genotype;

/// A feasibility rule over genotypes.
pub trait GenotypeConstraint: Send + Sync {
    /// Whether the genotype satisfies this rule.
    fn test(&self, genotype: &Genotype) -> bool;

    /// A repaired copy of the genotype.
    ///
    /// `generation` seeds any choice the repair has to make, keeping
    /// repair reproducible across runs.
    fn repair(&self, genotype: &Genotype, generation: u64) -> Genotype;
}

/// Every process must be scheduled on a runtime whose host processor
/// has a known worst-case execution time for it.
pub struct MappingFeasibility {
    /// Allowed runtime indices per process.
    allowed: Vec<Vec<usize>>,
}

impl MappingFeasibility {
    /// Derive the allowed runtime sets from the instrumented execution
    /// times in the view.
    pub fn new(view: &ExplorationView) -> Self {
        let allowed = (0..view.processes.len())
            .map(|p| {
                (0..view.runtimes.len())
                    .filter(|&r| view.wcet_secs[p][view.runtime_host_pe[r]].is_some())
                    .collect()
            })
            .collect();
        Self { allowed }
    }
}

impl GenotypeConstraint for MappingFeasibility {
    fn test(&self, genotype: &Genotype) -> bool {
        genotype
            .process_scheduling
            .iter()
            .enumerate()
            .all(|(p, r)| self.allowed[p].contains(r))
    }

    fn repair(&self, genotype: &Genotype, generation: u64) -> Genotype {
        let mut repaired = genotype.clone();
        for (p, gene) in repaired.process_scheduling.iter_mut().enumerate() {
            let allowed = &self.allowed[p];
            if allowed.is_empty() || allowed.contains(gene) {
                continue;
            }
            *gene = allowed[(generation as usize + p) % allowed.len()];
        }
        repaired
    }
}

/// Every communication element on the path between a process's host
/// processor and the memories it touches must hold a strictly positive
/// reservation.
///
/// A process touches its own mapped memory and, indirectly, the memory
/// of every buffer it reads or writes.
pub struct CommunicationReservationFeasibility {
    view: Arc<ExplorationView>,
}

impl CommunicationReservationFeasibility {
    /// Build the constraint over a view.
    pub fn new(view: Arc<ExplorationView>) -> Self {
        Self { view }
    }

    /// Flattened (pe, ce) reservation slots the genotype must keep
    /// strictly positive.
    fn required_slots(&self, genotype: &Genotype) -> BTreeSet<usize> {
        let view = self.view.as_ref();
        let n_ce = view.communication_elements.len();
        let mut required = BTreeSet::new();
        for p in 0..view.processes.len() {
            let pe = view.runtime_host_pe[genotype.process_scheduling[p]];
            let mut memories = vec![genotype.process_memory_mapping[p]];
            for b in 0..view.buffers.len() {
                if view.process_reads_buffer[p][b] || view.process_writes_buffer[p][b] {
                    memories.push(genotype.buffer_memory_mapping[b]);
                }
            }
            for me in memories {
                for &ce in &view.pe_me_paths[pe][me] {
                    required.insert(pe * n_ce + ce);
                }
            }
        }
        required
    }
}

impl GenotypeConstraint for CommunicationReservationFeasibility {
    fn test(&self, genotype: &Genotype) -> bool {
        self.required_slots(genotype)
            .iter()
            .all(|&slot| genotype.reservations[slot] > 0)
    }

    fn repair(&self, genotype: &Genotype, _generation: u64) -> Genotype {
        let mut repaired = genotype.clone();
        for slot in self.required_slots(genotype) {
            repaired.reservations[slot] = repaired.reservations[slot].max(1);
        }
        repaired
    }
}

/// Within each scheduler no two jobs may share an ordering rank, and
/// precedence-related jobs must be ranked in precedence order.
pub struct JobOrderingFeasibility {
    view: Arc<ExplorationView>,
}

impl JobOrderingFeasibility {
    /// Build the constraint over a view.
    pub fn new(view: Arc<ExplorationView>) -> Self {
        Self { view }
    }
}

impl GenotypeConstraint for JobOrderingFeasibility {
    fn test(&self, genotype: &Genotype) -> bool {
        let view = self.view.as_ref();
        let n = view.jobs.len();
        for i in 0..n {
            let sched_i = genotype.process_scheduling[view.job_process[i]];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let sched_j = genotype.process_scheduling[view.job_process[j]];
                if sched_i != sched_j {
                    continue;
                }
                if genotype.job_ordering[i] == genotype.job_ordering[j] {
                    return false;
                }
                if view.job_precedence_closure[i].contains(&j)
                    && genotype.job_ordering[i] >= genotype.job_ordering[j]
                {
                    return false;
                }
            }
        }
        true
    }

    fn repair(&self, genotype: &Genotype, _generation: u64) -> Genotype {
        let view = self.view.as_ref();
        let mut repaired = genotype.clone();
        for r in 0..view.runtimes.len() {
            // Precedence-respecting order, ties by original job index.
            // Picking the smallest ready job each round keeps the sort
            // stable; a cyclic precedence inside the set is broken at
            // the smallest remaining index.
            let mut remaining: BTreeSet<usize> = (0..view.jobs.len())
                .filter(|&j| genotype.process_scheduling[view.job_process[j]] == r)
                .collect();
            let mut rank = 0;
            while !remaining.is_empty() {
                let ready = remaining
                    .iter()
                    .copied()
                    .find(|&j| {
                        !remaining.iter().any(|&other| {
                            other != j && view.job_precedence_closure[other].contains(&j)
                                && !view.job_precedence_closure[j].contains(&other)
                        })
                    })
                    .or_else(|| remaining.iter().copied().next());
                let Some(job) = ready else { break };
                remaining.remove(&job);
                repaired.job_ordering[job] = rank;
                rank += 1;
            }
        }
        repaired
    }
}

/// Whether the mapped processes and buffers fit their memories.
///
/// Sums the footprint of everything mapped to each memory element and
/// compares against its capacity. Advisory: callers wanting capacity
/// pressure in the search can filter or penalize with it, the core
/// constraint stack does not repair it.
pub fn memory_usage_fits(view: &ExplorationView, genotype: &Genotype) -> bool {
    let mut usage = vec![0u64; view.memories.len()];
    for (p, &me) in genotype.process_memory_mapping.iter().enumerate() {
        usage[me] += view.process_memory_bits[p][me].unwrap_or(0);
    }
    for (b, &me) in genotype.buffer_memory_mapping.iter().enumerate() {
        usage[me] += view.buffer_memory_bits[b][me].unwrap_or(0);
    }
    usage
        .iter()
        .zip(&view.memory_capacity_bits)
        .all(|(used, capacity)| used <= capacity)
}

/// Conjunction of several constraints.
///
/// `test` requires every constraint to pass; `repair` applies only the
/// first failing constraint's repair per call, leaving convergence to
/// iterative reapplication by the search loop.
pub struct MultiConstraint {
    constraints: Vec<Box<dyn GenotypeConstraint>>,
}

impl MultiConstraint {
    /// Compose constraints in evaluation order.
    pub fn new(constraints: Vec<Box<dyn GenotypeConstraint>>) -> Self {
        Self { constraints }
    }

    /// The standard constraint stack for a view: mapping, then
    /// communication reservations, then job ordering.
    pub fn standard(view: Arc<ExplorationView>) -> Self {
        Self::new(vec![
            Box::new(MappingFeasibility::new(&view)),
            Box::new(CommunicationReservationFeasibility::new(view.clone())),
            Box::new(JobOrderingFeasibility::new(view)),
        ])
    }

    /// Repair until every constraint passes, bounded by a small number
    /// of rounds.
    pub fn repair_to_feasibility(&self, genotype: &Genotype, generation: u64) -> Genotype {
        let mut candidate = genotype.clone();
        let rounds = self.constraints.len() * 2 + 1;
        for _ in 0..rounds {
            if self.test(&candidate) {
                break;
            }
            candidate = self.repair(&candidate, generation);
        }
        candidate
    }
}

impl GenotypeConstraint for MultiConstraint {
    fn test(&self, genotype: &Genotype) -> bool {
        self.constraints.iter().all(|c| c.test(genotype))
    }

    fn repair(&self, genotype: &Genotype, generation: u64) -> Genotype {
        for constraint in &self.constraints {
            if !constraint.test(genotype) {
                return constraint.repair(genotype, generation);
            }
        }
        genotype.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn feasible_genotype() -> Genotype {
        Genotype {
            process_memory_mapping: vec![0, 0],
            process_scheduling: vec![0, 1],
            buffer_memory_mapping: vec![0],
            reservations: vec![1, 1],
            job_ordering: vec![0, 0],
        }
    }

    #[test]
    fn test_mapping_feasibility_accepts_instrumented() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let constraint = MappingFeasibility::new(&view);
        assert!(constraint.test(&feasible_genotype()));
    }

    #[test]
    fn test_mapping_repair_is_deterministic() {
        let mut view = fixtures::two_process_composite().view();
        // Process A can only run on pe0 (runtime 0).
        view.wcet_secs[0][1] = None;
        let view = Arc::new(view);
        let constraint = MappingFeasibility::new(&view);

        let mut bad = feasible_genotype();
        bad.process_scheduling = vec![1, 1];
        assert!(!constraint.test(&bad));

        let fixed_a = constraint.repair(&bad, 3);
        let fixed_b = constraint.repair(&bad, 3);
        assert_eq!(fixed_a, fixed_b);
        assert!(constraint.test(&fixed_a));
        assert_eq!(fixed_a.process_scheduling[0], 0);
    }

    #[test]
    fn test_communication_requires_positive_reservations() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let constraint = CommunicationReservationFeasibility::new(view);

        let mut bad = feasible_genotype();
        bad.reservations = vec![0, 0];
        assert!(!constraint.test(&bad));

        let fixed = constraint.repair(&bad, 0);
        assert!(constraint.test(&fixed));
        // Both hosts use the bus to reach mem0.
        assert_eq!(fixed.reservations, vec![1, 1]);
    }

    #[test]
    fn test_communication_repair_leaves_unused_slots() {
        let mut view = fixtures::two_process_composite().view();
        // Disconnect pe1 from the memory path table entirely.
        view.pe_me_paths[1][0].clear();
        let view = Arc::new(view);
        let constraint = CommunicationReservationFeasibility::new(view);

        let mut bad = feasible_genotype();
        bad.reservations = vec![0, 0];
        let fixed = constraint.repair(&bad, 0);
        assert_eq!(fixed.reservations[0], 1);
        assert_eq!(fixed.reservations[1], 0);
    }

    #[test]
    fn test_ordering_rejects_shared_rank() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let constraint = JobOrderingFeasibility::new(view);

        let mut bad = feasible_genotype();
        // Both jobs on the same scheduler with the same rank.
        bad.process_scheduling = vec![0, 0];
        bad.job_ordering = vec![0, 0];
        assert!(!constraint.test(&bad));

        let fixed = constraint.repair(&bad, 0);
        assert!(constraint.test(&fixed));
        // A precedes B, so A must come first.
        assert!(fixed.job_ordering[0] < fixed.job_ordering[1]);
    }

    #[test]
    fn test_ordering_rejects_inverted_precedence() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let constraint = JobOrderingFeasibility::new(view);

        let mut bad = feasible_genotype();
        bad.process_scheduling = vec![0, 0];
        bad.job_ordering = vec![1, 0];
        assert!(!constraint.test(&bad));

        let fixed = constraint.repair(&bad, 0);
        assert!(constraint.test(&fixed));
    }

    #[test]
    fn test_ordering_accepts_separate_schedulers() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let constraint = JobOrderingFeasibility::new(view);
        // Equal ranks are fine on different schedulers.
        assert!(constraint.test(&feasible_genotype()));
    }

    #[test]
    fn test_multi_constraint_first_failing_only() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let multi = MultiConstraint::standard(view);

        let mut bad = feasible_genotype();
        bad.reservations = vec![0, 0];
        bad.process_scheduling = vec![0, 0];
        bad.job_ordering = vec![1, 0];

        // One repair pass fixes at most the first failing rule.
        let once = multi.repair(&bad, 0);
        assert!(!multi.test(&once));

        // Iterative reapplication converges.
        let converged = multi.repair_to_feasibility(&bad, 0);
        assert!(multi.test(&converged));
    }

    #[test]
    fn test_memory_usage_fits_respects_capacity() {
        let mut view = fixtures::two_process_composite().view();
        assert!(memory_usage_fits(&view, &feasible_genotype()));

        // Shrink the memory below the combined footprint.
        view.memory_capacity_bits[0] = 1024;
        assert!(!memory_usage_fits(&view, &feasible_genotype()));
    }

    #[test]
    fn test_multi_constraint_noop_on_feasible() {
        let view = Arc::new(fixtures::two_process_composite().view());
        let multi = MultiConstraint::standard(view);
        let good = feasible_genotype();
        assert!(multi.test(&good));
        assert_eq!(multi.repair(&good, 7), good);
    }
}
