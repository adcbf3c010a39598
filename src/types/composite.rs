//! Composite decision models: one-or-more dataflow applications mapped
//! onto a partitioned platform.
//!
//! These are the models the exploration engine searches over. They
//! aggregate the applications, the platform, the instrumentation data,
//! and the decision variables: process→runtime scheduling, process and
//! buffer memory mappings, per-runtime super-loop schedules, and
//! processing-element×communication-element reservation counts.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::dataflow::{AperiodicAsynchronousDataflow, Job};
use super::instrumentation::{InstrumentedComputationTimes, InstrumentedMemoryRequirements};
use super::model::DecisionModel;
use super::platform::{PartitionedMemoryMappableMulticore, PartitionedTiledMulticore};

/// The decision variables shared by every mapping composite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingVariables {
    /// Runtime (scheduler) each process executes on.
    pub processes_to_runtime_scheduling: BTreeMap<String, String>,
    /// Memory each process's code and state lives in.
    pub processes_to_memory_mapping: BTreeMap<String, String>,
    /// Memory each buffer lives in.
    pub buffer_to_memory_mappings: BTreeMap<String, String>,
    /// Fixed repeating process list per runtime.
    pub super_loop_schedules: BTreeMap<String, Vec<String>>,
    /// Reserved channel count per processing element per communication
    /// element.
    pub processing_elements_to_routers_reservations: BTreeMap<String, BTreeMap<String, u32>>,
}

impl MappingVariables {
    /// Variables with every decision still open.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any decision has been taken yet.
    pub fn is_empty(&self) -> bool {
        self.processes_to_runtime_scheduling.is_empty()
            && self.processes_to_memory_mapping.is_empty()
            && self.buffer_to_memory_mappings.is_empty()
            && self.super_loop_schedules.is_empty()
            && self.processing_elements_to_routers_reservations.is_empty()
    }
}

/// Dataflow applications mapped onto a partitioned memory-mappable
/// multicore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore {
    /// The applications being mapped.
    pub aperiodic_asynchronous_dataflows: Vec<AperiodicAsynchronousDataflow>,
    /// The target platform.
    pub partitioned_mem_mappable_multicore: PartitionedMemoryMappableMulticore,
    /// Execution time instrumentation.
    pub instrumented_computation_times: InstrumentedComputationTimes,
    /// Memory footprint instrumentation.
    pub instrumented_memory_requirements: InstrumentedMemoryRequirements,
    /// The decision variables.
    #[serde(flatten)]
    pub variables: MappingVariables,
}

impl AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore {
    /// The same model with different decision variables.
    pub fn with_variables(&self, variables: MappingVariables) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    /// Flatten into the index space the exploration engine works in.
    pub fn view(&self) -> ExplorationView {
        let hw = &self.partitioned_mem_mappable_multicore.hardware;
        ExplorationView::assemble(
            &self.aperiodic_asynchronous_dataflows,
            hw.processing_elems.iter().cloned().collect(),
            hw.storage_elems.iter().cloned().collect(),
            hw.communication_elems.iter().cloned().collect(),
            &hw.storage_sizes,
            &hw.communication_elements_max_channels,
            &hw.communication_elements_bit_per_sec_per_channel,
            &hw.pre_computed_paths,
            &self.partitioned_mem_mappable_multicore.runtimes.runtime_host,
            &self.instrumented_computation_times,
            &self.instrumented_memory_requirements,
        )
    }
}

impl DecisionModel for AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore {
    fn category(&self) -> String {
        "AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        let mut elems = BTreeSet::new();
        for app in &self.aperiodic_asynchronous_dataflows {
            elems.extend(app.part());
        }
        elems.extend(self.partitioned_mem_mappable_multicore.part());
        elems.extend(self.instrumented_computation_times.part());
        elems
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Dataflow applications mapped onto a partitioned tiled multicore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AperiodicAsynchronousDataflowToPartitionedTiledMulticore {
    /// The applications being mapped.
    pub aperiodic_asynchronous_dataflows: Vec<AperiodicAsynchronousDataflow>,
    /// The target platform.
    pub partitioned_tiled_multicore: PartitionedTiledMulticore,
    /// Execution time instrumentation.
    pub instrumented_computation_times: InstrumentedComputationTimes,
    /// Memory footprint instrumentation.
    pub instrumented_memory_requirements: InstrumentedMemoryRequirements,
    /// The decision variables.
    #[serde(flatten)]
    pub variables: MappingVariables,
}

impl AperiodicAsynchronousDataflowToPartitionedTiledMulticore {
    /// The same model with different decision variables.
    pub fn with_variables(&self, variables: MappingVariables) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    /// Flatten into the index space the exploration engine works in.
    pub fn view(&self) -> ExplorationView {
        let hw = &self.partitioned_tiled_multicore.hardware;
        ExplorationView::assemble(
            &self.aperiodic_asynchronous_dataflows,
            hw.processors.clone(),
            hw.memories.clone(),
            hw.communication_elems(),
            &hw.tile_memory_sizes,
            &hw.communication_elements_max_channels,
            &hw.communication_elements_bit_per_sec_per_channel,
            &hw.pre_computed_paths,
            &self.partitioned_tiled_multicore.runtimes.runtime_host,
            &self.instrumented_computation_times,
            &self.instrumented_memory_requirements,
        )
    }
}

impl DecisionModel for AperiodicAsynchronousDataflowToPartitionedTiledMulticore {
    fn category(&self) -> String {
        "AperiodicAsynchronousDataflowToPartitionedTiledMulticore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        let mut elems = BTreeSet::new();
        for app in &self.aperiodic_asynchronous_dataflows {
            elems.extend(app.part());
        }
        elems.extend(self.partitioned_tiled_multicore.part());
        elems.extend(self.instrumented_computation_times.part());
        elems
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Index-space flattening of a mapping composite.
///
/// All exploration machinery (codec, constraints, cycle analysis,
/// objective evaluation) works on integer indices into these parallel
/// vectors rather than on the name-keyed maps of the composites. Both
/// composite shapes flatten into the same view, so one codec and one
/// constraint set serve both.
#[derive(Debug, Clone)]
pub struct ExplorationView {
    /// Process names, all applications concatenated.
    pub processes: Vec<String>,
    /// Buffer names, all applications concatenated.
    pub buffers: Vec<String>,
    /// Runtime (scheduler) names.
    pub runtimes: Vec<String>,
    /// Processing element names.
    pub processing_elements: Vec<String>,
    /// Memory element names.
    pub memories: Vec<String>,
    /// Communication element names.
    pub communication_elements: Vec<String>,
    /// Host processing element index per runtime.
    pub runtime_host_pe: Vec<usize>,
    /// Channel count per communication element.
    pub ce_max_channels: Vec<u32>,
    /// Bandwidth per channel per communication element, bit/s.
    pub ce_bandwidth_per_channel: Vec<f64>,
    /// CE index path from each PE to each memory (empty = colocated).
    pub pe_me_paths: Vec<Vec<Vec<usize>>>,
    /// CE index path from each PE to each PE.
    pub pe_pe_paths: Vec<Vec<Vec<usize>>>,
    /// Worst-case execution time in seconds, process × PE.
    pub wcet_secs: Vec<Vec<Option<f64>>>,
    /// Memory footprint in bits, process × memory.
    pub process_memory_bits: Vec<Vec<Option<u64>>>,
    /// Memory footprint in bits, buffer × memory.
    pub buffer_memory_bits: Vec<Vec<Option<u64>>>,
    /// Capacity per memory element, bits.
    pub memory_capacity_bits: Vec<u64>,
    /// Whether a process reads a buffer, process × buffer.
    pub process_reads_buffer: Vec<Vec<bool>>,
    /// Whether a process writes a buffer, process × buffer.
    pub process_writes_buffer: Vec<Vec<bool>>,
    /// Total bits written per firing, per process.
    pub process_put_total_bits: Vec<f64>,
    /// Total bits read per firing, per process.
    pub process_get_total_bits: Vec<f64>,
    /// Repetitions within one period, per process.
    pub process_repetitions: Vec<u64>,
    /// All jobs, applications concatenated.
    pub jobs: Vec<Job>,
    /// Process index of each job.
    pub job_process: Vec<usize>,
    /// Direct job-graph successor indices per job.
    pub job_direct_successors: Vec<BTreeSet<usize>>,
    /// Transitive closure of the job precedence relation.
    pub job_precedence_closure: Vec<BTreeSet<usize>>,
}

impl ExplorationView {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        apps: &[AperiodicAsynchronousDataflow],
        processing_elements: Vec<String>,
        memories: Vec<String>,
        communication_elements: Vec<String>,
        memory_sizes: &BTreeMap<String, u64>,
        ce_max_channels: &BTreeMap<String, u32>,
        ce_bandwidths: &BTreeMap<String, f64>,
        paths: &BTreeMap<String, BTreeMap<String, Vec<String>>>,
        runtime_host: &BTreeMap<String, String>,
        times: &InstrumentedComputationTimes,
        requirements: &InstrumentedMemoryRequirements,
    ) -> Self {
        let processes: Vec<String> = apps
            .iter()
            .flat_map(|a| a.processes.iter().cloned())
            .collect();
        let buffers: Vec<String> = apps.iter().flat_map(|a| a.buffers.iter().cloned()).collect();
        let runtimes: Vec<String> = runtime_host.keys().cloned().collect();
        let pe_index: BTreeMap<&str, usize> = processing_elements
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), i))
            .collect();
        let ce_index: BTreeMap<&str, usize> = communication_elements
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let runtime_host_pe = runtimes
            .iter()
            .map(|r| pe_index.get(runtime_host[r].as_str()).copied().unwrap_or(0))
            .collect();

        let index_path = |src: &str, dst: &str| -> Vec<usize> {
            paths
                .get(src)
                .and_then(|row| row.get(dst))
                .map(|ces| {
                    ces.iter()
                        .filter_map(|ce| ce_index.get(ce.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        };
        let pe_me_paths = processing_elements
            .iter()
            .map(|pe| memories.iter().map(|me| index_path(pe, me)).collect())
            .collect();
        let pe_pe_paths = processing_elements
            .iter()
            .map(|src| {
                processing_elements
                    .iter()
                    .map(|dst| index_path(src, dst))
                    .collect()
            })
            .collect();

        let wcet_secs = processes
            .iter()
            .map(|p| {
                processing_elements
                    .iter()
                    .map(|pe| times.worst_execution_time_secs(p, pe))
                    .collect()
            })
            .collect();
        let process_memory_bits = processes
            .iter()
            .map(|p| {
                memories
                    .iter()
                    .map(|me| requirements.requirement(p, me))
                    .collect()
            })
            .collect();
        let buffer_memory_bits = buffers
            .iter()
            .map(|b| {
                memories
                    .iter()
                    .map(|me| requirements.requirement(b, me))
                    .collect()
            })
            .collect();
        let memory_capacity_bits = memories
            .iter()
            .map(|me| memory_sizes.get(me).copied().unwrap_or(0))
            .collect();

        let reads = |p: &str, b: &str| {
            apps.iter().any(|a| {
                a.process_get_from_buffer_in_bits
                    .get(p)
                    .map(|row| row.contains_key(b))
                    .unwrap_or(false)
            })
        };
        let writes = |p: &str, b: &str| {
            apps.iter().any(|a| {
                a.process_put_in_buffer_in_bits
                    .get(p)
                    .map(|row| row.contains_key(b))
                    .unwrap_or(false)
            })
        };
        let process_reads_buffer = processes
            .iter()
            .map(|p| buffers.iter().map(|b| reads(p, b)).collect())
            .collect();
        let process_writes_buffer = processes
            .iter()
            .map(|p| buffers.iter().map(|b| writes(p, b)).collect())
            .collect();
        let total_bits = |table: &dyn Fn(&AperiodicAsynchronousDataflow) -> Option<u64>| -> f64 {
            apps.iter().filter_map(table).sum::<u64>() as f64
        };
        let process_put_total_bits = processes
            .iter()
            .map(|p| {
                total_bits(&|a: &AperiodicAsynchronousDataflow| {
                    a.process_put_in_buffer_in_bits
                        .get(p)
                        .map(|row| row.values().sum())
                })
            })
            .collect();
        let process_get_total_bits = processes
            .iter()
            .map(|p| {
                total_bits(&|a: &AperiodicAsynchronousDataflow| {
                    a.process_get_from_buffer_in_bits
                        .get(p)
                        .map(|row| row.values().sum())
                })
            })
            .collect();
        let process_repetitions = processes.iter().map(|p| repetitions(apps, p)).collect();

        // Concatenate per-application job spaces with index offsets.
        let mut jobs = Vec::new();
        let mut job_process = Vec::new();
        let mut job_direct_successors: Vec<BTreeSet<usize>> = Vec::new();
        let mut job_precedence_closure: Vec<BTreeSet<usize>> = Vec::new();
        let process_index: BTreeMap<&str, usize> = processes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), i))
            .collect();
        for app in apps {
            let offset = jobs.len();
            jobs.extend(app.jobs_of_processes.iter().cloned());
            for job in &app.jobs_of_processes {
                job_process.push(
                    process_index
                        .get(job.process.as_str())
                        .copied()
                        .unwrap_or(0),
                );
            }
            for succ in app.direct_successors() {
                job_direct_successors.push(succ.iter().map(|&s| s + offset).collect());
            }
            for succ in app.successor_closure() {
                job_precedence_closure.push(succ.iter().map(|&s| s + offset).collect());
            }
        }

        let ce_max_channels = communication_elements
            .iter()
            .map(|ce| ce_max_channels.get(ce).copied().unwrap_or(1))
            .collect();
        let ce_bandwidth_per_channel = communication_elements
            .iter()
            .map(|ce| ce_bandwidths.get(ce).copied().unwrap_or(1.0))
            .collect();

        Self {
            processes,
            buffers,
            runtimes,
            processing_elements,
            memories,
            communication_elements,
            runtime_host_pe,
            ce_max_channels,
            ce_bandwidth_per_channel,
            pe_me_paths,
            pe_pe_paths,
            wcet_secs,
            process_memory_bits,
            buffer_memory_bits,
            memory_capacity_bits,
            process_reads_buffer,
            process_writes_buffer,
            process_put_total_bits,
            process_get_total_bits,
            process_repetitions,
            jobs,
            job_process,
            job_direct_successors,
            job_precedence_closure,
        }
    }

    /// The largest channel count any communication element offers.
    pub fn max_reservations(&self) -> u32 {
        self.ce_max_channels.iter().copied().max().unwrap_or(0)
    }

    /// Indices of processing elements a process can execute on.
    pub fn allowed_processing_elements(&self, process: usize) -> Vec<usize> {
        self.wcet_secs[process]
            .iter()
            .enumerate()
            .filter_map(|(pe, wcet)| wcet.map(|_| pe))
            .collect()
    }
}

fn repetitions(apps: &[AperiodicAsynchronousDataflow], process: &str) -> u64 {
    apps.iter()
        .filter(|a| a.processes.contains(process))
        .map(|a| a.repetitions(process))
        .max()
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    #[test]
    fn test_view_index_spaces() {
        let model = fixtures::two_process_composite();
        let view = model.view();

        assert_eq!(view.processes.len(), 2);
        assert_eq!(view.buffers.len(), 1);
        assert_eq!(view.processing_elements.len(), 2);
        assert_eq!(view.memories.len(), 1);
        assert_eq!(view.runtimes.len(), 2);
        assert_eq!(view.jobs.len(), 2);
    }

    #[test]
    fn test_view_paths_resolved_to_indices() {
        let model = fixtures::two_process_composite();
        let view = model.view();

        // Both PEs reach the single memory through the single bus.
        for pe in 0..2 {
            assert_eq!(view.pe_me_paths[pe][0], vec![0]);
        }
    }

    #[test]
    fn test_view_wcet_in_seconds() {
        let model = fixtures::two_process_composite();
        let view = model.view();

        // Fixture stores scaled integers with scale factor 1000.
        assert_eq!(view.wcet_secs[0][0], Some(0.001));
    }

    #[test]
    fn test_with_variables_keeps_structure() {
        let model = fixtures::two_process_composite();
        let mut vars = MappingVariables::empty();
        vars.processes_to_runtime_scheduling
            .insert("A".to_string(), "rt0".to_string());
        let solved = model.with_variables(vars.clone());

        assert_eq!(solved.variables, vars);
        assert_eq!(
            solved.aperiodic_asynchronous_dataflows,
            model.aperiodic_asynchronous_dataflows
        );
    }

    #[test]
    fn test_composite_part_covers_all() {
        let model = fixtures::two_process_composite();
        let part = model.part();
        for elem in ["A", "B", "A_to_B", "pe0", "pe1", "mem0"] {
            assert!(part.contains(elem), "part should contain {}", elem);
        }
    }
}
