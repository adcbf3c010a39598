//! The application abstraction: aperiodic asynchronous dataflow.
//!
//! An application is a set of *processes* exchanging data through
//! *buffers*, with its repeating execution described by a *job graph*:
//! one job per (process, instance) pair within a single repetition
//! period, connected by strong or weak precedence edges. Restricted to
//! one repetition the job graph is weakly connected per application;
//! multiple applications become multiple decision models.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::DecisionModel;

/// One instance of a process within a repetition period.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Job {
    /// The process this job instantiates.
    pub process: String,
    /// Instance number within the repetition period (1-based).
    pub instance: u64,
}

impl Job {
    /// Create a job for a process instance.
    pub fn new(process: impl Into<String>, instance: u64) -> Self {
        Self {
            process: process.into(),
            instance,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.process, self.instance)
    }
}

/// Dataflow application abstracted as a repeating job graph.
///
/// The job graph is stored as parallel edge arrays of
/// (source process, source instance) → (destination process,
/// destination instance) pairs, each tagged as a strong or weak
/// precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AperiodicAsynchronousDataflow {
    /// Process identifiers.
    pub processes: BTreeSet<String>,
    /// Buffer identifiers.
    pub buffers: BTreeSet<String>,
    /// Buffer capacity in bits.
    pub buffer_max_size_in_bits: BTreeMap<String, u64>,
    /// Buffer token size in bits.
    pub buffer_token_size_in_bits: BTreeMap<String, u64>,
    /// Bits each process writes into each buffer per firing.
    pub process_put_in_buffer_in_bits: BTreeMap<String, BTreeMap<String, u64>>,
    /// Bits each process reads from each buffer per firing.
    pub process_get_from_buffer_in_bits: BTreeMap<String, BTreeMap<String, u64>>,
    /// All jobs of one repetition period.
    pub jobs_of_processes: Vec<Job>,
    /// Source process of each job-graph edge.
    pub job_graph_src_name: Vec<String>,
    /// Source instance of each job-graph edge.
    pub job_graph_src_instance: Vec<u64>,
    /// Destination process of each job-graph edge.
    pub job_graph_dst_name: Vec<String>,
    /// Destination instance of each job-graph edge.
    pub job_graph_dst_instance: Vec<u64>,
    /// Whether each edge is a strong precedence.
    pub job_graph_is_strong_precedence: Vec<bool>,
    /// Required minimum throughput per process, in firings per second.
    pub process_minimum_throughput: BTreeMap<String, f64>,
    /// Maximum allowed latency between process pairs, in seconds.
    pub process_path_maximum_latency: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AperiodicAsynchronousDataflow {
    /// Index of a job in `jobs_of_processes`.
    pub fn job_index(&self, job: &Job) -> Option<usize> {
        self.jobs_of_processes.iter().position(|j| j == job)
    }

    /// Direct successor job indices of each job, from the edge arrays.
    pub fn direct_successors(&self) -> Vec<BTreeSet<usize>> {
        let mut succ = vec![BTreeSet::new(); self.jobs_of_processes.len()];
        for e in 0..self.job_graph_src_name.len() {
            let src = Job::new(
                self.job_graph_src_name[e].clone(),
                self.job_graph_src_instance[e],
            );
            let dst = Job::new(
                self.job_graph_dst_name[e].clone(),
                self.job_graph_dst_instance[e],
            );
            if let (Some(s), Some(d)) = (self.job_index(&src), self.job_index(&dst)) {
                succ[s].insert(d);
            }
        }
        succ
    }

    /// Transitive closure of the job precedence relation.
    ///
    /// Computed by breadth-first traversal over the edge arrays; the
    /// job set is finite, so the traversal terminates even when the
    /// edge arrays describe cyclic successor relationships.
    pub fn successor_closure(&self) -> Vec<BTreeSet<usize>> {
        let direct = self.direct_successors();
        let n = self.jobs_of_processes.len();
        let mut closure = vec![BTreeSet::new(); n];
        for start in 0..n {
            let mut queue: VecDeque<usize> = direct[start].iter().copied().collect();
            while let Some(next) = queue.pop_front() {
                if closure[start].insert(next) {
                    for &further in &direct[next] {
                        if !closure[start].contains(&further) {
                            queue.push_back(further);
                        }
                    }
                }
            }
        }
        closure
    }

    /// Number of repetitions of a process within one period.
    ///
    /// The maximum instance number among the process's jobs, at least 1.
    pub fn repetitions(&self, process: &str) -> u64 {
        self.jobs_of_processes
            .iter()
            .filter(|j| j.process == process)
            .map(|j| j.instance)
            .max()
            .unwrap_or(1)
            .max(1)
    }
}

impl DecisionModel for AperiodicAsynchronousDataflow {
    fn category(&self) -> String {
        "AperiodicAsynchronousDataflow".to_string()
    }

    fn part(&self) -> BTreeSet<String> {
        self.processes
            .iter()
            .chain(self.buffers.iter())
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

    /// a#1 -> b#1 -> b#2, all strong.
    pub(crate) fn chain_app() -> AperiodicAsynchronousDataflow {
        AperiodicAsynchronousDataflow {
            processes: ["a", "b"].iter().map(|s| s.to_string()).collect(),
            buffers: ["ab"].iter().map(|s| s.to_string()).collect(),
            buffer_max_size_in_bits: [("ab".to_string(), 1024)].into_iter().collect(),
            buffer_token_size_in_bits: [("ab".to_string(), 32)].into_iter().collect(),
            process_put_in_buffer_in_bits: [(
                "a".to_string(),
                [("ab".to_string(), 32)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            process_get_from_buffer_in_bits: [(
                "b".to_string(),
                [("ab".to_string(), 32)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            jobs_of_processes: vec![Job::new("a", 1), Job::new("b", 1), Job::new("b", 2)],
            job_graph_src_name: vec!["a".to_string(), "b".to_string()],
            job_graph_src_instance: vec![1, 1],
            job_graph_dst_name: vec!["b".to_string(), "b".to_string()],
            job_graph_dst_instance: vec![1, 2],
            job_graph_is_strong_precedence: vec![true, true],
            process_minimum_throughput: BTreeMap::new(),
            process_path_maximum_latency: BTreeMap::new(),
        }
    }

    #[test]
    fn test_direct_successors() {
        let app = chain_app();
        let succ = app.direct_successors();
        assert_eq!(succ[0], [1].into_iter().collect());
        assert_eq!(succ[1], [2].into_iter().collect());
        assert!(succ[2].is_empty());
    }

    #[test]
    fn test_successor_closure_is_transitive() {
        let app = chain_app();
        let closure = app.successor_closure();
        assert_eq!(closure[0], [1, 2].into_iter().collect());
        assert_eq!(closure[1], [2].into_iter().collect());
        assert!(closure[2].is_empty());
    }

    #[test]
    fn test_closure_terminates_on_cycles() {
        let mut app = chain_app();
        // Close the loop: b#2 -> a#1.
        app.job_graph_src_name.push("b".to_string());
        app.job_graph_src_instance.push(2);
        app.job_graph_dst_name.push("a".to_string());
        app.job_graph_dst_instance.push(1);
        app.job_graph_is_strong_precedence.push(false);

        let closure = app.successor_closure();
        // Every job reaches every job, including itself.
        for row in &closure {
            assert_eq!(row.len(), 3);
        }
    }

    #[test]
    fn test_repetitions() {
        let app = chain_app();
        assert_eq!(app.repetitions("a"), 1);
        assert_eq!(app.repetitions("b"), 2);
        assert_eq!(app.repetitions("missing"), 1);
    }

    #[test]
    fn test_part_covers_processes_and_buffers() {
        let app = chain_app();
        let part = app.part();
        assert!(part.contains("a"));
        assert!(part.contains("b"));
        assert!(part.contains("ab"));
    }
}
