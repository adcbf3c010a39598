//! Job-graph cycle analysis for throughput bounds.
//!
//! Under a self-timed super-loop execution, the steady-state period of a
//! job is bounded by the heaviest cycle reachable from it through
//! precedence and scheduling edges. Two edge relations feed the
//! analysis:
//!
//! - **must-precede**: the explicit job-graph edges, plus an edge
//!   between consecutively ordered jobs on the same mapping unit;
//! - **must-cycle**: on each mapping unit, an edge from every later
//!   scheduled job back to the job at schedule position zero, encoding
//!   the repeating super loop. Position zero is the loop start.
//!
//! Each job's *cycle value* is the maximum over discovered cycles
//! through it of the cycle's total execution and transfer time; a job
//! on no cycle keeps its own execution time (it never waits). A closing
//! pass propagates values across must-precede edges until jobs directly
//! connected by a precedence edge agree on the same bound.

use std::collections::BTreeSet;

use crate::types::ExplorationView;

/// Must-precede and must-cycle edges induced by a mapping and ordering.
///
/// `mapping` assigns each job to a mapping unit (runtime index) and
/// `ordering` gives its rank within that unit's schedule.
pub fn scheduling_edges(
    mapping: &[usize],
    ordering: &[usize],
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let n = mapping.len();
    let mut precede = Vec::new();
    let mut cycle = Vec::new();
    for i in 0..n {
        for j in 0..n {
            if i == j || mapping[i] != mapping[j] {
                continue;
            }
            if ordering[i] + 1 == ordering[j] {
                precede.push((i, j));
            } else if ordering[j] == 0 && ordering[i] > 0 {
                cycle.push((i, j));
            }
        }
    }
    (precede, cycle)
}

/// Per-job maximum cycle values.
///
/// `edge_weights[i][j]` is the transfer latency charged when job `i`
/// precedes job `j`; `must_precede` and `must_cycle` are successor
/// sets per job. Every job is taken as a depth-first root; cycles
/// closed on the current path contribute their total weight to every
/// job on the cycle, and revisiting an already finished job
/// back-propagates its known value through the visiting edge. The
/// closing pass equalizes jobs joined by a must-precede edge.
pub fn maximum_cycle_vector(
    job_weights: &[f64],
    edge_weights: &[Vec<f64>],
    must_precede: &[BTreeSet<usize>],
    must_cycle: &[BTreeSet<usize>],
) -> Vec<f64> {
    let n = job_weights.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, row) in successors.iter_mut().enumerate() {
        let combined: BTreeSet<usize> = must_precede[i]
            .iter()
            .chain(must_cycle[i].iter())
            .copied()
            .collect();
        row.extend(combined);
    }

    let mut cycle_values = job_weights.to_vec();
    for root in 0..n {
        let mut visited = vec![false; n];
        let mut on_path = vec![false; n];
        let mut path: Vec<usize> = vec![root];
        // (job, index of the next successor to look at)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        on_path[root] = true;

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            if frame.1 < successors[node].len() {
                let next = successors[node][frame.1];
                frame.1 += 1;
                if on_path[next] {
                    // Cycle closure: total weight of the path segment
                    // from `next` around back to `next`.
                    if let Some(start) = path.iter().position(|&p| p == next) {
                        let segment = &path[start..];
                        let mut total = 0.0;
                        for (k, &a) in segment.iter().enumerate() {
                            let b = if k + 1 < segment.len() {
                                segment[k + 1]
                            } else {
                                next
                            };
                            total += job_weights[a] + edge_weights[a][b];
                        }
                        for &a in segment {
                            cycle_values[a] = cycle_values[a].max(total);
                        }
                    }
                } else if visited[next] {
                    // Finished node with a known value: fold it back
                    // through the visiting edge.
                    let candidate =
                        job_weights[node] + edge_weights[node][next] + cycle_values[next];
                    cycle_values[node] = cycle_values[node].max(candidate);
                } else {
                    on_path[next] = true;
                    path.push(next);
                    stack.push((next, 0));
                }
            } else {
                visited[node] = true;
                on_path[node] = false;
                path.pop();
                stack.pop();
            }
        }
    }

    // Closing pass: jobs joined by a must-precede edge converge to the
    // same bound; iterate so chains settle.
    let mut changed = true;
    let mut rounds = 0;
    while changed && rounds <= n {
        changed = false;
        rounds += 1;
        for (i, succs) in must_precede.iter().enumerate() {
            for &j in succs {
                let bound = cycle_values[i].max(cycle_values[j]);
                if bound > cycle_values[i] {
                    cycle_values[i] = bound;
                    changed = true;
                }
                if bound > cycle_values[j] {
                    cycle_values[j] = bound;
                    changed = true;
                }
            }
        }
    }

    cycle_values
}

/// Execution-time weight per job under a process→runtime assignment.
///
/// A job whose process has no instrumented execution time on the host
/// processing element weighs infinite; feasible individuals never do.
pub fn job_execution_weights(view: &ExplorationView, process_to_runtime: &[usize]) -> Vec<f64> {
    view.job_process
        .iter()
        .map(|&p| {
            let pe = view.runtime_host_pe[process_to_runtime[p]];
            view.wcet_secs[p][pe].unwrap_or(f64::INFINITY)
        })
        .collect()
}

/// Transfer-latency matrix between jobs under a mapping and channel
/// reservation.
///
/// Jobs hosted on the same processing element transfer for free; across
/// processing elements the latency is the path length times the bits
/// moved divided by the bottleneck reserved bandwidth along the path.
pub fn job_transfer_weights(
    view: &ExplorationView,
    process_to_runtime: &[usize],
    reservations: &[u32],
) -> Vec<Vec<f64>> {
    let n_ce = view.communication_elements.len();
    let n = view.jobs.len();
    let mut weights = vec![vec![0.0; n]; n];
    for src in 0..n {
        let src_proc = view.job_process[src];
        let src_pe = view.runtime_host_pe[process_to_runtime[src_proc]];
        for dst in 0..n {
            let dst_proc = view.job_process[dst];
            let dst_pe = view.runtime_host_pe[process_to_runtime[dst_proc]];
            if src_pe == dst_pe {
                continue;
            }
            let path = &view.pe_pe_paths[src_pe][dst_pe];
            if path.is_empty() {
                continue;
            }
            let bottleneck = path
                .iter()
                .map(|&ce| {
                    view.ce_bandwidth_per_channel[ce]
                        * f64::from(reservations[src_pe * n_ce + ce].max(1))
                })
                .fold(f64::INFINITY, f64::min);
            let hops = path.len() as f64;
            weights[src][dst] = hops * view.process_put_total_bits[src_proc] / bottleneck
                + hops * view.process_get_total_bits[dst_proc] / bottleneck;
        }
    }
    weights
}

/// Inverse throughput per process: the worst job cycle value of the
/// process divided by its repetitions within one period.
pub fn inverse_throughputs(view: &ExplorationView, cycle_values: &[f64]) -> Vec<f64> {
    view.processes
        .iter()
        .enumerate()
        .map(|(p, _)| {
            let repetitions = view.process_repetitions[p] as f64;
            view.job_process
                .iter()
                .enumerate()
                .filter(|&(_, &jp)| jp == p)
                .map(|(j, _)| cycle_values[j] / repetitions)
                .fold(0.0, f64::max)
        })
        .collect()
}
