//! Control-layer overhead benchmarks.
//!
//! Runs against the scripted engine, so the numbers measure the loop,
//! evaluation bookkeeping and fold handling rather than tree building:
//! - Training loop rounds with one validation set
//! - Cross-validation, sequential vs parallel folds

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use lgbm::testing::ScriptedEngine;
use lgbm::training::LogSink;
use lgbm::{CvConfig, Dataset, EngineRef, EvalSet, Parallelism, Params, TrainConfig, cv, train};

// =============================================================================
// Data
// =============================================================================

fn generate_rows(n_rows: usize, n_features: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let rows: Vec<Vec<f64>> = (0..n_rows)
        .map(|i| (0..n_features).map(|j| ((i * 31 + j * 7) % 101) as f64).collect())
        .collect();
    let label = rows.iter().map(|r| r.iter().sum::<f64>() / 100.0).collect();
    (rows, label)
}

fn params() -> Params {
    Params::new().with("objective", "regression").with("metric", "l2,l1")
}

// =============================================================================
// Training loop
// =============================================================================

fn bench_training_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("train/rounds");
    let (rows, label) = generate_rows(1_000, 10);

    for rounds in [10, 100, 500] {
        group.throughput(Throughput::Elements(rounds as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rounds), &rounds, |b, &rounds| {
            let engine: EngineRef = Arc::new(ScriptedEngine::new());
            let train_set = Dataset::from_rows(&engine, &rows[..800], &label[..800]).unwrap();
            let valid_set = Dataset::from_rows(&engine, &rows[800..], &label[800..]).unwrap();
            b.iter(|| {
                let config = TrainConfig::builder()
                    .num_boost_round(rounds)
                    .sink(LogSink::buffer())
                    .build()
                    .unwrap();
                let booster = train(
                    &params(),
                    &train_set,
                    &[EvalSet::new(&train_set), EvalSet::new(&valid_set)],
                    config,
                )
                .unwrap();
                black_box(booster)
            });
        });
    }
    group.finish();
}

// =============================================================================
// Cross-validation
// =============================================================================

fn bench_cross_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cv/folds");
    let (rows, label) = generate_rows(2_000, 10);
    let engine: EngineRef = Arc::new(ScriptedEngine::new());
    let data = Dataset::from_rows(&engine, &rows, &label).unwrap();

    for (name, parallelism) in [
        ("sequential", Parallelism::Sequential),
        ("parallel", Parallelism::Parallel),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let config = CvConfig::builder()
                    .num_boost_round(50)
                    .n_folds(5)
                    .parallelism(parallelism)
                    .build()
                    .unwrap();
                black_box(cv(&params(), &data, config).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_training_loop, bench_cross_validation);
criterion_main!(benches);
