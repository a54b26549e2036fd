//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lgbm::testing::ScriptedEngine;
use lgbm::{Dataset, EngineRef};

/// Wrap a scripted engine, keeping a typed handle for its counters.
pub fn engine(scripted: ScriptedEngine) -> (Arc<ScriptedEngine>, EngineRef) {
    let scripted = Arc::new(scripted);
    let engine: EngineRef = scripted.clone();
    (scripted, engine)
}

/// Deterministic regression data: `y = 2*x0 - x1 + (i % 3)`.
pub fn regression_rows(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| vec![i as f64 * 0.1, (i % 7) as f64])
        .collect();
    let label = rows
        .iter()
        .enumerate()
        .map(|(i, r)| 2.0 * r[0] - r[1] + (i % 3) as f64)
        .collect();
    (rows, label)
}

/// Class labels `i % n_classes` over the same features.
pub fn class_rows(n: usize, n_classes: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let (rows, _) = regression_rows(n);
    let label = (0..n).map(|i| (i % n_classes) as f64).collect();
    (rows, label)
}

/// A training set and a held-out set built on the same engine.
pub fn train_test(engine: &EngineRef, n_train: usize, n_test: usize) -> (Dataset, Dataset) {
    let (rows, label) = regression_rows(n_train + n_test);
    let train = Dataset::from_rows(engine, &rows[..n_train], &label[..n_train]).unwrap();
    let test = Dataset::builder(engine, &rows[n_train..])
        .label(&label[n_train..])
        .reference(&train)
        .build()
        .unwrap();
    (train, test)
}

/// Lines written to a buffer sink.
pub fn lines(contents: &str) -> Vec<&str> {
    contents.lines().collect()
}
