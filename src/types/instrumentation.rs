//! Instrumentation data: execution times and memory footprints.
//!
//! Both tables are associative: the *absence* of an entry between a
//! process and a processing element means the process cannot execute
//! there at all. Execution times are stored scaled so they travel as
//! integers; the actual value in seconds is `stored / scale_factor`.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::model::DecisionModel;

/// Computation times of processes on processing elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentedComputationTimes {
    /// Instrumented process identifiers.
    pub processes: BTreeSet<String>,
    /// Instrumented processing element identifiers.
    pub processing_elements: BTreeSet<String>,
    /// Best-case execution times, scaled.
    pub best_execution_times: BTreeMap<String, BTreeMap<String, u64>>,
    /// Average execution times, scaled.
    pub average_execution_times: BTreeMap<String, BTreeMap<String, u64>>,
    /// Worst-case execution times, scaled.
    pub worst_execution_times: BTreeMap<String, BTreeMap<String, u64>>,
    /// Denominator converting stored values to seconds.
    pub scale_factor: u64,
}

impl InstrumentedComputationTimes {
    /// Worst-case execution time of a process on a processing element,
    /// in seconds. `None` means the process cannot run there.
    pub fn worst_execution_time_secs(&self, process: &str, pe: &str) -> Option<f64> {
        self.worst_execution_times
            .get(process)
            .and_then(|row| row.get(pe))
            .map(|&scaled| scaled as f64 / self.scale_factor as f64)
    }
}

impl DecisionModel for InstrumentedComputationTimes {
    fn category(&self) -> String {
        "InstrumentedComputationTimes".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        self.processes
            .iter()
            .chain(self.processing_elements.iter())
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

/// Memory footprints of processes and buffers on storage elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentedMemoryRequirements {
    /// Instrumented process identifiers.
    pub processes: BTreeSet<String>,
    /// Instrumented buffer (channel) identifiers.
    pub channels: BTreeSet<String>,
    /// Instrumented processing element identifiers.
    pub processing_elements: BTreeSet<String>,
    /// Bits required per process or buffer, per memory element.
    pub memory_requirements: BTreeMap<String, BTreeMap<String, u64>>,
}

impl InstrumentedMemoryRequirements {
    /// Footprint of an element on a memory, in bits.
    pub fn requirement(&self, element: &str, memory: &str) -> Option<u64> {
        self.memory_requirements
            .get(element)
            .and_then(|row| row.get(memory))
            .copied()
    }
}

impl DecisionModel for InstrumentedMemoryRequirements {
    fn category(&self) -> String {
        "InstrumentedMemoryRequirements".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        self.processes
            .iter()
            .chain(self.channels.iter())
            .chain(self.processing_elements.iter())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_means_cannot_run() {
        let times = InstrumentedComputationTimes {
            processes: ["p"].iter().map(|s| s.to_string()).collect(),
            processing_elements: ["pe0", "pe1"].iter().map(|s| s.to_string()).collect(),
            best_execution_times: BTreeMap::new(),
            average_execution_times: BTreeMap::new(),
            worst_execution_times: [(
                "p".to_string(),
                [("pe0".to_string(), 500)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            scale_factor: 1000,
        };
        assert_eq!(times.worst_execution_time_secs("p", "pe0"), Some(0.5));
        assert_eq!(times.worst_execution_time_secs("p", "pe1"), None);
    }

    #[test]
    fn test_requirement_lookup() {
        let reqs = InstrumentedMemoryRequirements {
            processes: ["p"].iter().map(|s| s.to_string()).collect(),
            channels: BTreeSet::new(),
            processing_elements: BTreeSet::new(),
            memory_requirements: [(
                "p".to_string(),
                [("mem0".to_string(), 4096)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        };
        assert_eq!(reqs.requirement("p", "mem0"), Some(4096));
        assert_eq!(reqs.requirement("p", "mem1"), None);
    }
}
