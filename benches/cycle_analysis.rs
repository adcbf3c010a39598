//! Performance benchmarks for the job-graph cycle analysis.
//!
//! Run with: `cargo bench --bench cycle_analysis`
//!
//! The analysis is the hot path of fitness evaluation: it runs once
//! per individual per generation, so its cost bounds the throughput
//! of the whole exploration loop.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use dse_kernel::analysis::{maximum_cycle_vector, scheduling_edges};

/// A super loop of `n` jobs on one mapping unit: a precedence chain
/// with a cycle edge from every later job back to the loop start.
fn super_loop_inputs(
    n: usize,
) -> (
    Vec<f64>,
    Vec<Vec<f64>>,
    Vec<BTreeSet<usize>>,
    Vec<BTreeSet<usize>>,
) {
    let mapping = vec![0usize; n];
    let ordering: Vec<usize> = (0..n).collect();
    let (precede_edges, cycle_edges) = scheduling_edges(&mapping, &ordering);

    let mut must_precede = vec![BTreeSet::new(); n];
    for (i, j) in precede_edges {
        must_precede[i].insert(j);
    }
    let mut must_cycle = vec![BTreeSet::new(); n];
    for (i, j) in cycle_edges {
        must_cycle[i].insert(j);
    }

    let weights: Vec<f64> = (0..n).map(|i| 1.0 + (i % 7) as f64 * 0.25).collect();
    let mut edge_weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        edge_weights[i][(i + 1) % n] = 0.125;
    }

    (weights, edge_weights, must_precede, must_cycle)
}

fn bench_maximum_cycle_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("maximum_cycle_vector");
    for n in [8usize, 32, 128] {
        let (weights, edge_weights, must_precede, must_cycle) = super_loop_inputs(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                maximum_cycle_vector(
                    black_box(&weights),
                    black_box(&edge_weights),
                    black_box(&must_precede),
                    black_box(&must_cycle),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_maximum_cycle_vector);
criterion_main!(benches);
