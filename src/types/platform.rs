//! Platform abstractions: processing, storage, and communication.
//!
//! Two hardware shapes are covered. A memory-mappable multicore is the
//! von-Neumann-style platform where storage elements hold data and
//! instructions and processors reach them through an interconnect of
//! communication elements. A tiled multicore pairs each processor with
//! a local tile memory and a network interface, connected by routers.
//! Every platform model carries a precomputed all-pairs path table;
//! paths consist only of communication elements.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::DecisionModel;

/// Memory-mappable multicore platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMappableMultiCore {
    /// Processing element identifiers.
    pub processing_elems: BTreeSet<String>,
    /// Storage element identifiers.
    pub storage_elems: BTreeSet<String>,
    /// Communication element identifiers.
    pub communication_elems: BTreeSet<String>,
    /// Interconnect topology edge sources.
    pub topology_srcs: Vec<String>,
    /// Interconnect topology edge destinations.
    pub topology_dsts: Vec<String>,
    /// Operating frequency per processor, in Hz.
    pub processors_frequency: BTreeMap<String, u64>,
    /// Instruction provisions per processor, per ISA, per instruction.
    pub processors_provisions: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
    /// Capacity per storage element, in bits.
    pub storage_sizes: BTreeMap<String, u64>,
    /// Channel count per communication element.
    pub communication_elements_max_channels: BTreeMap<String, u32>,
    /// Bandwidth per channel per communication element, in bit/s.
    pub communication_elements_bit_per_sec_per_channel: BTreeMap<String, f64>,
    /// All-pairs path table: element → element → ordered CE list.
    pub pre_computed_paths: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl DecisionModel for MemoryMappableMultiCore {
    fn category(&self) -> String {
        "MemoryMappableMultiCore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        self.processing_elems
            .iter()
            .chain(self.storage_elems.iter())
            .chain(self.communication_elems.iter())
            .cloned()
            .collect()
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tiled multicore platform.
///
/// Each tile is a processor with a private memory and a network
/// interface; tiles communicate through routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiledMultiCore {
    /// Tile processor identifiers.
    pub processors: Vec<String>,
    /// Tile memory identifiers, parallel to `processors`.
    pub memories: Vec<String>,
    /// Network interface identifiers.
    pub network_interfaces: Vec<String>,
    /// Router identifiers.
    pub routers: Vec<String>,
    /// Interconnect topology edge sources.
    pub interconnect_topology_srcs: Vec<String>,
    /// Interconnect topology edge destinations.
    pub interconnect_topology_dsts: Vec<String>,
    /// Instruction provisions per processor, per ISA, per instruction.
    pub processors_provisions: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
    /// Operating frequency per processor, in Hz.
    pub processors_frequency: BTreeMap<String, u64>,
    /// Capacity per tile memory, in bits.
    pub tile_memory_sizes: BTreeMap<String, u64>,
    /// Channel count per communication element.
    pub communication_elements_max_channels: BTreeMap<String, u32>,
    /// Bandwidth per channel per communication element, in bit/s.
    pub communication_elements_bit_per_sec_per_channel: BTreeMap<String, f64>,
    /// All-pairs path table: element → element → ordered CE list.
    pub pre_computed_paths: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl TiledMultiCore {
    /// Communication elements: network interfaces and routers.
    pub fn communication_elems(&self) -> Vec<String> {
        self.network_interfaces
            .iter()
            .chain(self.routers.iter())
            .cloned()
            .collect()
    }
}

impl DecisionModel for TiledMultiCore {
    fn category(&self) -> String {
        "TiledMultiCore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        self.processors
            .iter()
            .chain(self.memories.iter())
            .chain(self.network_interfaces.iter())
            .chain(self.routers.iter())
            .cloned()
            .collect()
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Runtime-to-processor affinity map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimesAndProcessors {
    /// Runtime (scheduler) identifiers.
    pub runtimes: BTreeSet<String>,
    /// Processor identifiers.
    pub processors: BTreeSet<String>,
    /// Host processor per runtime.
    pub runtime_host: BTreeMap<String, String>,
    /// Affine runtime per processor.
    pub processor_affinities: BTreeMap<String, String>,
    /// Runtimes running without an operating system.
    pub is_bare_metal: BTreeSet<String>,
    /// Runtimes scheduling by fixed priority.
    pub is_fixed_priority: BTreeSet<String>,
    /// Runtimes scheduling by earliest deadline first.
    pub is_earliest_deadline_first: BTreeSet<String>,
    /// Runtimes executing a cyclic executive (super loop).
    pub is_cyclic_executive: BTreeSet<String>,
}

impl RuntimesAndProcessors {
    /// Whether runtimes and processors are in one-to-one correspondence.
    pub fn is_partitioned(&self) -> bool {
        let same_number = self.runtimes.len() == self.processors.len();
        let every_processor_hosts = self
            .processors
            .iter()
            .all(|p| self.runtime_host.values().any(|host| host == p));
        let every_runtime_affine = self
            .runtimes
            .iter()
            .all(|r| self.processor_affinities.values().any(|rt| rt == r));
        same_number && every_processor_hosts && every_runtime_affine
    }
}

impl DecisionModel for RuntimesAndProcessors {
    fn category(&self) -> String {
        "RuntimesAndProcessors".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        let mut elems: BTreeSet<String> = self
            .runtimes
            .iter()
            .chain(self.processors.iter())
            .cloned()
            .collect();
        for (sched, pe) in &self.runtime_host {
            elems.insert(format!("host={}:{}", sched, pe));
        }
        for (pe, sched) in &self.processor_affinities {
            elems.insert(format!("scheduler={}:{}", pe, sched));
        }
        elems
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Memory-mappable platform partitioned by one runtime per processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedMemoryMappableMulticore {
    /// The hardware platform.
    pub hardware: MemoryMappableMultiCore,
    /// The runtime partition.
    pub runtimes: RuntimesAndProcessors,
}

impl DecisionModel for PartitionedMemoryMappableMulticore {
    fn category(&self) -> String {
        "PartitionedMemoryMappableMulticore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        let mut elems = self.hardware.part();
        elems.extend(self.runtimes.part());
        elems
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tiled platform partitioned by one runtime per tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedTiledMulticore {
    /// The hardware platform.
    pub hardware: TiledMultiCore,
    /// The runtime partition.
    pub runtimes: RuntimesAndProcessors,
}

impl DecisionModel for PartitionedTiledMulticore {
    fn category(&self) -> String {
        "PartitionedTiledMulticore".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        let mut elems = self.hardware.part();
        elems.extend(self.runtimes.part());
        elems
    }

    fn body_as_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn two_pe_one_memory() -> MemoryMappableMultiCore {
        let pes: BTreeSet<String> = ["pe0", "pe1"].iter().map(|s| s.to_string()).collect();
        let mut paths: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for pe in &pes {
            paths
                .entry(pe.clone())
                .or_default()
                .insert("mem0".to_string(), vec!["bus0".to_string()]);
            paths
                .entry("mem0".to_string())
                .or_default()
                .insert(pe.clone(), vec!["bus0".to_string()]);
        }
        MemoryMappableMultiCore {
            processing_elems: pes.clone(),
            storage_elems: ["mem0"].iter().map(|s| s.to_string()).collect(),
            communication_elems: ["bus0"].iter().map(|s| s.to_string()).collect(),
            topology_srcs: vec![
                "pe0".to_string(),
                "pe1".to_string(),
                "bus0".to_string(),
            ],
            topology_dsts: vec![
                "bus0".to_string(),
                "bus0".to_string(),
                "mem0".to_string(),
            ],
            processors_frequency: pes.iter().map(|p| (p.clone(), 1_000_000_000)).collect(),
            processors_provisions: BTreeMap::new(),
            storage_sizes: [("mem0".to_string(), 1 << 20)].into_iter().collect(),
            communication_elements_max_channels: [("bus0".to_string(), 4)]
                .into_iter()
                .collect(),
            communication_elements_bit_per_sec_per_channel: [("bus0".to_string(), 1e9)]
                .into_iter()
                .collect(),
            pre_computed_paths: paths,
        }
    }

    pub(crate) fn one_runtime_per_pe() -> RuntimesAndProcessors {
        RuntimesAndProcessors {
            runtimes: ["rt0", "rt1"].iter().map(|s| s.to_string()).collect(),
            processors: ["pe0", "pe1"].iter().map(|s| s.to_string()).collect(),
            runtime_host: [
                ("rt0".to_string(), "pe0".to_string()),
                ("rt1".to_string(), "pe1".to_string()),
            ]
            .into_iter()
            .collect(),
            processor_affinities: [
                ("pe0".to_string(), "rt0".to_string()),
                ("pe1".to_string(), "rt1".to_string()),
            ]
            .into_iter()
            .collect(),
            is_bare_metal: BTreeSet::new(),
            is_fixed_priority: BTreeSet::new(),
            is_earliest_deadline_first: BTreeSet::new(),
            is_cyclic_executive: ["rt0", "rt1"].iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_partition_bijection() {
        let runtimes = one_runtime_per_pe();
        assert!(runtimes.is_partitioned());
    }

    #[test]
    fn test_partition_rejects_unhosted_processor() {
        let mut runtimes = one_runtime_per_pe();
        runtimes.runtime_host.remove("rt1");
        assert!(!runtimes.is_partitioned());
    }

    #[test]
    fn test_tiled_communication_elems() {
        let tiled = TiledMultiCore {
            processors: vec!["tile0".to_string()],
            memories: vec!["tile0_mem".to_string()],
            network_interfaces: vec!["tile0_ni".to_string()],
            routers: vec!["r0".to_string()],
            interconnect_topology_srcs: vec![],
            interconnect_topology_dsts: vec![],
            processors_provisions: BTreeMap::new(),
            processors_frequency: BTreeMap::new(),
            tile_memory_sizes: BTreeMap::new(),
            communication_elements_max_channels: BTreeMap::new(),
            communication_elements_bit_per_sec_per_channel: BTreeMap::new(),
            pre_computed_paths: BTreeMap::new(),
        };
        assert_eq!(
            tiled.communication_elems(),
            vec!["tile0_ni".to_string(), "r0".to_string()]
        );
    }

    #[test]
    fn test_partitioned_part_union() {
        let partitioned = PartitionedMemoryMappableMulticore {
            hardware: two_pe_one_memory(),
            runtimes: one_runtime_per_pe(),
        };
        let part = partitioned.part();
        assert!(part.contains("pe0"));
        assert!(part.contains("mem0"));
        assert!(part.contains("rt1"));
    }
}
