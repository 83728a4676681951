//! Benchmarks for basis construction and projection.
//!
//! Projection runs once per vector per level at build time and once per
//! level per query, so it dominates both.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use strata::basis::eigen;
use ndarray::Array2;
use strata::projection::PreparedBasis;
use strata::{Basis, IndexConfig, Indexer, MemoryStore, Norm};

// === Generators ===

fn random_vectors(n: usize, dim: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())
        .collect()
}

fn random_covariance(size: usize) -> Array2<f64> {
    // AᵀA is symmetric positive semi-definite.
    let values: Vec<f64> = random_vectors(size, size).into_iter().flatten().collect();
    let a = Array2::from_shape_vec((size, size), values).expect("square");
    a.t().dot(&a)
}

// === Benchmarks ===

fn bench_project_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("project_vector");
    let dim = 256;

    for window in [2, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(dim as u64));

        let basis = PreparedBasis::new(&Basis::fixed(1, *window, dim / window)).expect("basis");
        let row = random_vectors(1, dim).remove(0);

        group.bench_with_input(BenchmarkId::from_parameter(window), window, |bench, _| {
            bench.iter(|| basis.project(black_box(&row), Norm::L2).expect("project"));
        });
    }

    group.finish();
}

fn bench_jacobi(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobi_dominant");

    for size in [2, 4, 8, 16, 32].iter() {
        let cov = random_covariance(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |bench, _| {
            bench.iter(|| eigen::dominant(black_box(&cov)).expect("eigen"));
        });
    }

    group.finish();
}

fn bench_build_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_index");
    group.sample_size(10);
    let dim = 64;

    for n in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*n as u64));
        let rows = random_vectors(*n, dim);
        let cfg = IndexConfig::new(dim, *n as u64, vec![4, 4]).with_chunk_size(256);

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |bench, _| {
            bench.iter(|| {
                let mut store = MemoryStore::new();
                Indexer::new(&cfg)
                    .expect("config")
                    .run(&mut store, rows.clone())
                    .expect("build");
                store
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_project_vector, bench_jacobi, bench_build_index);
criterion_main!(benches);
