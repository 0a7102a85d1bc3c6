//! Benchmarks for the tiling planner
//!
//! Planning runs once per invocation, so these track that it stays in the
//! microsecond range across problem shapes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tessel_core::{DType, IndexDType, PlatformInfo, Reduction, TensorShape};
use tessel_planner::{
    order_for_determinism, partition, plan_scatter, solve_tile_size, Contribution, CostModel,
    ScatterRequest, TilingConfig,
};

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for units in [10u64, 4096, 4097, 1 << 30].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(units), units, |b, &units| {
            b.iter(|| partition(black_box(units), black_box(64)));
        });
    }

    group.finish();
}

fn bench_solve_tile(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_tile_size");

    let encounter = CostModel::encounter(DType::F32, IndexDType::I64, Reduction::Add, true, 32);
    let sorted = CostModel::sorted(DType::BF16, IndexDType::I64, 2, 1024, 32 * 1024, 32);

    group.bench_function("encounter", |b| {
        b.iter(|| solve_tile_size(1, black_box(1 << 24), 188_416, |t| encounter.cost(t)));
    });
    group.bench_function("sorted", |b| {
        b.iter(|| solve_tile_size(1, black_box(1 << 24), 188_416, |t| sorted.cost(t)));
    });

    group.finish();
}

fn bench_plan_scatter(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_scatter");
    let platform = PlatformInfo::default();
    let config = TilingConfig::default();

    let cases = [
        ("rank3_inner", vec![32u64, 4096, 64], vec![32u64, 1024, 64], 1i64),
        ("rank1_outer", vec![100_000], vec![1_000_000], 0),
        ("rank7", vec![2, 3, 4, 5, 6, 7, 8], vec![2, 3, 4, 5, 6, 7, 3], -1),
    ];

    for (name, data, indices, axis) in cases.iter() {
        for deterministic in [false, true] {
            let indices = TensorShape::new(indices).unwrap();
            let request = ScatterRequest::new(
                TensorShape::new(data).unwrap(),
                indices.clone(),
                indices,
            )
            .with_axis(*axis)
            .with_reduction(Reduction::Add)
            .with_deterministic(deterministic);

            let id = format!("{}/deterministic={}", name, deterministic);
            group.bench_function(id, |b| {
                b.iter(|| plan_scatter(black_box(&request), &platform, &config));
            });
        }
    }

    group.finish();
}

fn bench_order_for_determinism(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_for_determinism");

    for n in [256usize, 4096, 65_536].iter() {
        let contributions: Vec<Contribution> = (0..*n as u64)
            .map(|p| Contribution {
                dest: (p * 2_654_435_761) % 1000,
                position: p,
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            b.iter(|| order_for_determinism(black_box(&contributions), 1000));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_partition,
    bench_solve_tile,
    bench_plan_scatter,
    bench_order_for_determinism
);
criterion_main!(benches);
