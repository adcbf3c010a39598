//! Genotype encoding between mapping composites and integer
//! chromosomes.
//!
//! The chromosome is a fixed-shape integer vector laid out as five
//! segments, in order:
//!
//! 1. process → memory mapping index
//! 2. process → runtime (scheduler) index
//! 3. buffer → memory mapping index
//! 4. processing-element × communication-element reservation counts,
//!    flattened row-major
//! 5. per-job ordering rank within its scheduler
//!
//! Decoding reconstructs the name-keyed decision variables, deriving
//! each runtime's super-loop schedule by grouping jobs by scheduler
//! and sorting by ordering rank. Encoding is only defined for models
//! whose decision variables are representable in the declared ranges;
//! anything else is a contract violation, not a recoverable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::ModelError;
use crate::types::{ExplorationView, MappingVariables};

/// The integer chromosome of one mapping candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    /// Memory index per process.
    pub process_memory_mapping: Vec<usize>,
    /// Runtime index per process.
    pub process_scheduling: Vec<usize>,
    /// Memory index per buffer.
    pub buffer_memory_mapping: Vec<usize>,
    /// Reservation count per (processing element, communication
    /// element), row-major.
    pub reservations: Vec<u32>,
    /// Ordering rank per job.
    pub job_ordering: Vec<usize>,
}

impl Genotype {
    /// Flatten into a single integer vector, segments in declaration
    /// order.
    pub fn as_vec(&self) -> Vec<u64> {
        let mut flat = Vec::with_capacity(
            self.process_memory_mapping.len()
                + self.process_scheduling.len()
                + self.buffer_memory_mapping.len()
                + self.reservations.len()
                + self.job_ordering.len(),
        );
        flat.extend(self.process_memory_mapping.iter().map(|&v| v as u64));
        flat.extend(self.process_scheduling.iter().map(|&v| v as u64));
        flat.extend(self.buffer_memory_mapping.iter().map(|&v| v as u64));
        flat.extend(self.reservations.iter().map(|&v| u64::from(v)));
        flat.extend(self.job_ordering.iter().map(|&v| v as u64));
        flat
    }
}

/// Segment lengths and allele bounds of a genotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenotypeShape {
    /// Number of processes.
    pub processes: usize,
    /// Number of buffers.
    pub buffers: usize,
    /// Number of memory elements (exclusive mapping bound).
    pub memories: usize,
    /// Number of runtimes (exclusive scheduling bound).
    pub runtimes: usize,
    /// Number of processing elements.
    pub processing_elements: usize,
    /// Number of communication elements.
    pub communication_elements: usize,
    /// Number of jobs (exclusive ordering bound).
    pub jobs: usize,
    /// Inclusive reservation bound.
    pub max_reservations: u32,
}

impl GenotypeShape {
    /// The shape induced by an exploration view.
    pub fn of(view: &ExplorationView) -> Self {
        Self {
            processes: view.processes.len(),
            buffers: view.buffers.len(),
            memories: view.memories.len(),
            runtimes: view.runtimes.len(),
            processing_elements: view.processing_elements.len(),
            communication_elements: view.communication_elements.len(),
            jobs: view.jobs.len(),
            max_reservations: view.max_reservations(),
        }
    }

    /// Total gene count across all five segments.
    pub fn total_genes(&self) -> usize {
        self.processes * 2
            + self.buffers
            + self.processing_elements * self.communication_elements
            + self.jobs
    }

    /// Rebuild a genotype from its flat integer vector.
    pub fn from_vec(&self, flat: &[u64]) -> Result<Genotype, ModelError> {
        if flat.len() != self.total_genes() {
            return Err(ModelError::GeneOutOfRange {
                element: "<chromosome length>".to_string(),
                value: flat.len(),
                bound: self.total_genes(),
            });
        }
        let mut at = 0;
        let mut take = |len: usize| -> Vec<u64> {
            let seg = flat[at..at + len].to_vec();
            at += len;
            seg
        };
        let process_memory_mapping = take(self.processes)
            .into_iter()
            .map(|v| v as usize)
            .collect();
        let process_scheduling = take(self.processes)
            .into_iter()
            .map(|v| v as usize)
            .collect();
        let buffer_memory_mapping = take(self.buffers)
            .into_iter()
            .map(|v| v as usize)
            .collect();
        let reservations = take(self.processing_elements * self.communication_elements)
            .into_iter()
            .map(|v| v as u32)
            .collect();
        let job_ordering = take(self.jobs).into_iter().map(|v| v as usize).collect();
        Ok(Genotype {
            process_memory_mapping,
            process_scheduling,
            buffer_memory_mapping,
            reservations,
            job_ordering,
        })
    }
}

/// Bidirectional, deterministic codec between mapping decision
/// variables and genotypes, over one exploration view.
pub struct MulticoreDataflowCodec {
    view: Arc<ExplorationView>,
    shape: GenotypeShape,
}

impl MulticoreDataflowCodec {
    /// Build the codec for a view.
    pub fn new(view: Arc<ExplorationView>) -> Self {
        let shape = GenotypeShape::of(&view);
        Self { view, shape }
    }

    /// The genotype shape this codec produces and accepts.
    pub fn shape(&self) -> GenotypeShape {
        self.shape
    }

    /// Encode decision variables into a genotype.
    ///
    /// Fails with a contract violation when a variable names an element
    /// outside the view or a reservation exceeds the declared channel
    /// bound.
    pub fn encode(&self, variables: &MappingVariables) -> Result<Genotype, ModelError> {
        let view = self.view.as_ref();
        let index_of = |items: &[String], name: &str, kind: &str| -> Result<usize, ModelError> {
            items
                .iter()
                .position(|i| i == name)
                .ok_or_else(|| ModelError::UnknownElement {
                    element: name.to_string(),
                    category: kind.to_string(),
                })
        };

        let mut process_memory_mapping = Vec::with_capacity(view.processes.len());
        let mut process_scheduling = Vec::with_capacity(view.processes.len());
        for process in &view.processes {
            let memory = variables
                .processes_to_memory_mapping
                .get(process)
                .ok_or_else(|| ModelError::UnknownElement {
                    element: process.clone(),
                    category: "processes_to_memory_mapping".to_string(),
                })?;
            process_memory_mapping.push(index_of(&view.memories, memory, "memories")?);
            let runtime = variables
                .processes_to_runtime_scheduling
                .get(process)
                .ok_or_else(|| ModelError::UnknownElement {
                    element: process.clone(),
                    category: "processes_to_runtime_scheduling".to_string(),
                })?;
            process_scheduling.push(index_of(&view.runtimes, runtime, "runtimes")?);
        }

        let mut buffer_memory_mapping = Vec::with_capacity(view.buffers.len());
        for buffer in &view.buffers {
            let memory = variables
                .buffer_to_memory_mappings
                .get(buffer)
                .ok_or_else(|| ModelError::UnknownElement {
                    element: buffer.clone(),
                    category: "buffer_to_memory_mappings".to_string(),
                })?;
            buffer_memory_mapping.push(index_of(&view.memories, memory, "memories")?);
        }

        let n_ce = view.communication_elements.len();
        let mut reservations = vec![0u32; view.processing_elements.len() * n_ce];
        for (pe_name, row) in &variables.processing_elements_to_routers_reservations {
            let pe = index_of(&view.processing_elements, pe_name, "processing_elements")?;
            for (ce_name, &count) in row {
                let ce = index_of(&view.communication_elements, ce_name, "communication_elements")?;
                if count > self.shape.max_reservations {
                    return Err(ModelError::GeneOutOfRange {
                        element: format!("{}:{}", pe_name, ce_name),
                        value: count as usize,
                        bound: self.shape.max_reservations as usize + 1,
                    });
                }
                reservations[pe * n_ce + ce] = count;
            }
        }

        let job_ordering = self.orderings_from_schedules(variables, &process_scheduling)?;

        Ok(Genotype {
            process_memory_mapping,
            process_scheduling,
            buffer_memory_mapping,
            reservations,
            job_ordering,
        })
    }

    /// Decode a genotype into name-keyed decision variables.
    pub fn decode(&self, genotype: &Genotype) -> MappingVariables {
        let view = self.view.as_ref();
        let n_ce = view.communication_elements.len();

        let processes_to_memory_mapping = view
            .processes
            .iter()
            .enumerate()
            .map(|(p, name)| {
                (
                    name.clone(),
                    view.memories[genotype.process_memory_mapping[p]].clone(),
                )
            })
            .collect();
        let processes_to_runtime_scheduling: BTreeMap<String, String> = view
            .processes
            .iter()
            .enumerate()
            .map(|(p, name)| {
                (
                    name.clone(),
                    view.runtimes[genotype.process_scheduling[p]].clone(),
                )
            })
            .collect();
        let buffer_to_memory_mappings = view
            .buffers
            .iter()
            .enumerate()
            .map(|(b, name)| {
                (
                    name.clone(),
                    view.memories[genotype.buffer_memory_mapping[b]].clone(),
                )
            })
            .collect();

        let processing_elements_to_routers_reservations = view
            .processing_elements
            .iter()
            .enumerate()
            .map(|(pe, pe_name)| {
                (
                    pe_name.clone(),
                    view.communication_elements
                        .iter()
                        .enumerate()
                        .map(|(ce, ce_name)| {
                            (ce_name.clone(), genotype.reservations[pe * n_ce + ce])
                        })
                        .collect(),
                )
            })
            .collect();

        // Super loops: per runtime, its jobs sorted by rank, ties by
        // job index, rendered as process names.
        let super_loop_schedules = view
            .runtimes
            .iter()
            .enumerate()
            .map(|(r, r_name)| {
                let mut scheduled: Vec<usize> = (0..view.jobs.len())
                    .filter(|&j| genotype.process_scheduling[view.job_process[j]] == r)
                    .collect();
                scheduled.sort_by_key(|&j| (genotype.job_ordering[j], j));
                (
                    r_name.clone(),
                    scheduled
                        .into_iter()
                        .map(|j| view.processes[view.job_process[j]].clone())
                        .collect(),
                )
            })
            .collect();

        MappingVariables {
            processes_to_runtime_scheduling,
            processes_to_memory_mapping,
            buffer_to_memory_mappings,
            super_loop_schedules,
            processing_elements_to_routers_reservations,
        }
    }

    /// Recover per-job ordering ranks from super-loop schedules.
    ///
    /// Walks each schedule in order, assigning the position to the
    /// first still-unassigned instance of the named process on that
    /// runtime, lowest instance first. Jobs never named by a schedule
    /// get the ranks after the last assigned one, in job order.
    fn orderings_from_schedules(
        &self,
        variables: &MappingVariables,
        process_scheduling: &[usize],
    ) -> Result<Vec<usize>, ModelError> {
        let view = self.view.as_ref();
        let mut ordering: Vec<Option<usize>> = vec![None; view.jobs.len()];
        for (r, r_name) in view.runtimes.iter().enumerate() {
            let Some(loop_list) = variables.super_loop_schedules.get(r_name) else {
                continue;
            };
            for (position, entry) in loop_list.iter().enumerate() {
                if position >= view.jobs.len() {
                    return Err(ModelError::GeneOutOfRange {
                        element: entry.clone(),
                        value: position,
                        bound: view.jobs.len(),
                    });
                }
                let chosen = (0..view.jobs.len())
                    .filter(|&j| {
                        ordering[j].is_none()
                            && process_scheduling[view.job_process[j]] == r
                            && view.processes[view.job_process[j]] == *entry
                    })
                    .min_by_key(|&j| view.jobs[j].instance);
                if let Some(j) = chosen {
                    ordering[j] = Some(position);
                }
            }
        }
        let mut next_free = ordering.iter().flatten().copied().max().map_or(0, |m| m + 1);
        Ok(ordering
            .into_iter()
            .map(|rank| {
                rank.unwrap_or_else(|| {
                    let assigned = next_free;
                    next_free += 1;
                    assigned
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn solved_variables() -> MappingVariables {
        MappingVariables {
            processes_to_runtime_scheduling: [
                ("A".to_string(), "rt0".to_string()),
                ("B".to_string(), "rt1".to_string()),
            ]
            .into_iter()
            .collect(),
            processes_to_memory_mapping: [
                ("A".to_string(), "mem0".to_string()),
                ("B".to_string(), "mem0".to_string()),
            ]
            .into_iter()
            .collect(),
            buffer_to_memory_mappings: [("A_to_B".to_string(), "mem0".to_string())]
                .into_iter()
                .collect(),
            super_loop_schedules: [
                ("rt0".to_string(), vec!["A".to_string()]),
                ("rt1".to_string(), vec!["B".to_string()]),
            ]
            .into_iter()
            .collect(),
            processing_elements_to_routers_reservations: [
                (
                    "pe0".to_string(),
                    [("bus0".to_string(), 1u32)].into_iter().collect(),
                ),
                (
                    "pe1".to_string(),
                    [("bus0".to_string(), 1u32)].into_iter().collect(),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_shape_counts() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let shape = GenotypeShape::of(&view);
        assert_eq!(shape.processes, 2);
        assert_eq!(shape.buffers, 1);
        assert_eq!(shape.jobs, 2);
        // 2 + 2 + 1 + 2*1 + 2 genes in total.
        assert_eq!(shape.total_genes(), 9);
    }

    #[test]
    fn test_round_trip() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let codec = MulticoreDataflowCodec::new(view.clone());

        let variables = solved_variables();
        let genotype = codec.encode(&variables).unwrap();
        let decoded = codec.decode(&genotype);
        assert_eq!(decoded, variables);

        // And the genotype itself survives another encode.
        assert_eq!(codec.encode(&decoded).unwrap(), genotype);
    }

    #[test]
    fn test_flat_vector_round_trip() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let codec = MulticoreDataflowCodec::new(view.clone());
        let genotype = codec.encode(&solved_variables()).unwrap();

        let flat = genotype.as_vec();
        assert_eq!(flat.len(), codec.shape().total_genes());
        assert_eq!(codec.shape().from_vec(&flat).unwrap(), genotype);
    }

    #[test]
    fn test_encode_rejects_unknown_memory() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let codec = MulticoreDataflowCodec::new(view.clone());

        let mut variables = solved_variables();
        variables
            .processes_to_memory_mapping
            .insert("A".to_string(), "mem9".to_string());
        assert!(codec.encode(&variables).is_err());
    }

    #[test]
    fn test_encode_rejects_reservation_over_bound() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let codec = MulticoreDataflowCodec::new(view.clone());

        let mut variables = solved_variables();
        variables
            .processing_elements_to_routers_reservations
            .get_mut("pe0")
            .unwrap()
            .insert("bus0".to_string(), 99);
        assert!(matches!(
            codec.encode(&variables),
            Err(ModelError::GeneOutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_groups_jobs_by_scheduler() {
        let model = fixtures::two_process_composite();
        let view = Arc::new(model.view());
        let codec = MulticoreDataflowCodec::new(view.clone());

        // Both processes on rt0, A ordered before B.
        let genotype = Genotype {
            process_memory_mapping: vec![0, 0],
            process_scheduling: vec![0, 0],
            buffer_memory_mapping: vec![0],
            reservations: vec![1, 1],
            job_ordering: vec![0, 1],
        };
        let decoded = codec.decode(&genotype);
        assert_eq!(
            decoded.super_loop_schedules["rt0"],
            vec!["A".to_string(), "B".to_string()]
        );
        assert!(decoded.super_loop_schedules["rt1"].is_empty());
    }
}
