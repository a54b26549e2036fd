//! Evaluation records collected during training.
//!
//! Provides [`EvalSet`] for naming the datasets evaluated each round,
//! [`EvaluationRecord`] for one metric value, and [`EvalHistory`] for the
//! per-iteration series of every (dataset, metric) pair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::Dataset;

use super::metrics::Direction;

/// Name reported for the training data.
pub const TRAINING_NAME: &str = "training";

// =============================================================================
// EvaluationRecord
// =============================================================================

/// One metric value on one dataset at one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// 1-based boosting iteration.
    pub iteration: usize,
    /// Dataset label (`training`, `valid_1`, ...).
    pub dataset: String,
    /// Metric name as reported by the engine.
    pub metric: String,
    pub value: f64,
    pub direction: Direction,
}

// =============================================================================
// EvalSet
// =============================================================================

/// A dataset evaluated every round, with an optional display name.
///
/// Passing the training dataset itself reports training metrics under the
/// name `training` (or the given name) without adding it as validation data.
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub name: Option<&'a str>,
    pub dataset: &'a Dataset,
}

impl<'a> EvalSet<'a> {
    /// Unnamed set; it is labeled by position.
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { name: None, dataset }
    }

    pub fn named(name: &'a str, dataset: &'a Dataset) -> Self {
        Self {
            name: Some(name),
            dataset,
        }
    }

    /// Whether this set is `train` itself rather than an equal copy.
    pub(crate) fn is(&self, train: &Dataset) -> bool {
        std::ptr::eq(self.dataset, train)
    }

    /// Display label for the set at `position` in the caller's list.
    pub(crate) fn label(&self, position: usize, is_train: bool) -> String {
        match (self.name, is_train) {
            (Some(name), _) => name.to_string(),
            (None, true) => TRAINING_NAME.to_string(),
            (None, false) => format!("valid_{position}"),
        }
    }
}

impl<'a> From<&'a Dataset> for EvalSet<'a> {
    fn from(dataset: &'a Dataset) -> Self {
        EvalSet::new(dataset)
    }
}

// =============================================================================
// EvalHistory
// =============================================================================

/// Per-iteration values for every (dataset, metric) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalHistory {
    series: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl EvalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &EvaluationRecord) {
        self.series
            .entry(record.dataset.clone())
            .or_default()
            .entry(record.metric.clone())
            .or_default()
            .push(record.value);
    }

    pub fn extend<'r>(&mut self, records: impl IntoIterator<Item = &'r EvaluationRecord>) {
        for record in records {
            self.push(record);
        }
    }

    /// Series for one dataset and metric.
    pub fn get(&self, dataset: &str, metric: &str) -> Option<&[f64]> {
        self.series
            .get(dataset)
            .and_then(|metrics| metrics.get(metric))
            .map(Vec::as_slice)
    }

    /// Metrics recorded for one dataset.
    pub fn metrics(&self, dataset: &str) -> Option<&BTreeMap<String, Vec<f64>>> {
        self.series.get(dataset)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Number of iterations recorded (the longest series).
    pub fn len(&self) -> usize {
        self.series
            .values()
            .flat_map(|metrics| metrics.values())
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
