//! Testing utilities for lgbm.
//!
//! [`ScriptedEngine`] is an in-process [`Engine`] that behaves like a small
//! gradient-boosting library: it stores datasets, "trains" a constant model
//! per class, computes real metrics on the stored labels, and writes and
//! reads a plain-text model file. Metric values can be scripted per data
//! slot (and per booster) so early-stopping paths can be driven to exact
//! iterations.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lgbm::testing::ScriptedEngine;
//! use lgbm::EngineRef;
//!
//! // Validation l2 bottoms out at iteration 3.
//! let engine = ScriptedEngine::new()
//!     .with_curve(1, "l2", [5.0, 4.0, 3.0, 3.5, 4.0, 4.5])
//!     .finish_after(50);
//! let engine: EngineRef = Arc::new(engine);
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::ffi::{
    CallError, CallResult, Engine, ImportanceType, PredictType, RawHandle, ReturnCode,
};
use crate::params::{Objective, Params};
use crate::training::Metric;

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for floating point comparisons in tests.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

const MODEL_HEADER: &str = "scripted_model v1";
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const PROB_EPS: f64 = 1e-15;

// =============================================================================
// Assertions
// =============================================================================

/// Assert that two metric series are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than `epsilon`.
pub fn assert_series_approx_eq(actual: &[f64], expected: &[f64], epsilon: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            approx::abs_diff_eq!(a, e, epsilon = epsilon),
            "{context}[{i}]: {a} != {e} (epsilon={epsilon})"
        );
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Resource and call counts observed by a [`ScriptedEngine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub datasets_created: usize,
    pub datasets_freed: usize,
    pub boosters_created: usize,
    pub boosters_freed: usize,
    pub updates: usize,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct DatasetState {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
    label: Vec<f32>,
    weight: Option<Vec<f32>>,
    feature_names: Vec<String>,
}

impl DatasetState {
    fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }
}

/// Labels and weights of one evaluation slot.
#[derive(Debug, Clone)]
struct Slot {
    label: Vec<f32>,
    weight: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
struct BoosterState {
    /// Creation order among trained boosters; selects fold curves.
    ordinal: Option<usize>,
    objective: Objective,
    metrics: Vec<String>,
    n_features: usize,
    n_outputs: usize,
    learning_rate: f64,
    /// Per-class score the model converges to.
    target: Vec<f64>,
    /// Raw scores after each iteration; `scores[0]` is the initial model.
    scores: Vec<Vec<f64>>,
    /// Slot 0 is the training data; later slots are validation sets.
    slots: Vec<Slot>,
}

impl BoosterState {
    fn iterations(&self) -> usize {
        self.scores.len() - 1
    }

    fn raw_at(&self, num_iteration: Option<usize>) -> &[f64] {
        let it = num_iteration.map_or(self.iterations(), |n| n.min(self.iterations()));
        &self.scores[it]
    }

    fn transform(&self, raw: &[f64]) -> Vec<f64> {
        match self.objective {
            Objective::Binary | Objective::CrossEntropy => raw.iter().map(|&s| sigmoid(s)).collect(),
            Objective::MulticlassOva => raw.iter().map(|&s| sigmoid(s)).collect(),
            Objective::Multiclass => softmax(raw),
            _ => raw.to_vec(),
        }
    }

    fn to_model_text(&self, num_iteration: Option<usize>) -> String {
        let n = num_iteration.map_or(self.iterations(), |n| n.min(self.iterations()));
        let mut text = String::new();
        let _ = writeln!(text, "{MODEL_HEADER}");
        let _ = writeln!(text, "objective={}", self.objective.name());
        let _ = writeln!(text, "num_class={}", self.n_outputs);
        let _ = writeln!(text, "num_features={}", self.n_features);
        let _ = writeln!(text, "iterations={n}");
        for scores in &self.scores[..=n] {
            let values: Vec<String> = scores.iter().map(|s| format!("{s:e}")).collect();
            let _ = writeln!(text, "score={}", values.join(","));
        }
        text
    }

    fn from_model_text(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        if lines.next()? != MODEL_HEADER {
            return None;
        }
        let mut objective = Objective::Regression;
        let mut n_outputs = 1;
        let mut n_features = 0;
        let mut scores = Vec::new();
        for line in lines {
            let (key, value) = line.split_once('=')?;
            match key {
                "objective" => objective = Objective::from_name(value),
                "num_class" => n_outputs = value.parse().ok()?,
                "num_features" => n_features = value.parse().ok()?,
                "iterations" => {}
                "score" => scores.push(
                    value
                        .split(',')
                        .map(|v| v.parse::<f64>().ok())
                        .collect::<Option<Vec<f64>>>()?,
                ),
                _ => return None,
            }
        }
        if scores.is_empty() {
            return None;
        }
        let target = scores.last()?.clone();
        Some(Self {
            ordinal: None,
            objective,
            metrics: Vec::new(),
            n_features,
            n_outputs,
            learning_rate: DEFAULT_LEARNING_RATE,
            target,
            scores,
            slots: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CurveKey {
    booster: Option<usize>,
    slot: usize,
    metric: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    datasets: HashMap<usize, DatasetState>,
    boosters: HashMap<usize, BoosterState>,
    counters: Counters,
    last_error: HashMap<ThreadId, String>,
}

impl State {
    fn alloc(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

// =============================================================================
// ScriptedEngine
// =============================================================================

/// In-process engine for tests, doc examples and benchmarks.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    state: Mutex<State>,
    curves: HashMap<CurveKey, Vec<f64>>,
    finish_after: Option<usize>,
    failures: HashMap<String, String>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the values `metric` reports on data slot `slot` (0 = training
    /// data) for every booster. Iteration `i` reads `values[i - 1]`; the
    /// last value repeats once the curve runs out.
    pub fn with_curve(
        mut self,
        slot: usize,
        metric: &str,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        let key = CurveKey {
            booster: None,
            slot,
            metric: metric.to_string(),
        };
        self.curves.insert(key, values.into_iter().collect());
        self
    }

    /// Like [`with_curve`](Self::with_curve), for the `booster`-th trained
    /// booster only (0-based creation order). Takes precedence over
    /// engine-wide curves.
    pub fn with_fold_curve(
        mut self,
        booster: usize,
        slot: usize,
        metric: &str,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        let key = CurveKey {
            booster: Some(booster),
            slot,
            metric: metric.to_string(),
        };
        self.curves.insert(key, values.into_iter().collect());
        self
    }

    /// Report "cannot continue" on every update once `n` iterations exist.
    pub fn finish_after(mut self, n: usize) -> Self {
        self.finish_after = Some(n);
        self
    }

    /// Fail every call to `call` (an [`Engine`] method name) with `message`.
    pub fn fail_on(mut self, call: &str, message: &str) -> Self {
        self.failures.insert(call.to_string(), message.to_string());
        self
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters
    }

    /// Datasets and boosters allocated and not yet freed.
    pub fn live_handles(&self) -> usize {
        let state = self.lock();
        state.datasets.len() + state.boosters.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail<T>(&self, state: &mut State, message: impl Into<String>) -> CallResult<T> {
        state.last_error.insert(thread::current().id(), message.into());
        Err(ReturnCode(-1).into())
    }

    /// Lock the state, or fail the call if it is scripted to fail.
    fn enter(&self, call: &str) -> CallResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        match self.failures.get(call) {
            Some(message) => self.fail(&mut state, message.clone()),
            None => Ok(state),
        }
    }

    fn curve_value(&self, ordinal: Option<usize>, slot: usize, metric: &str, iteration: usize) -> Option<f64> {
        let lookup = |booster| {
            self.curves.get(&CurveKey {
                booster,
                slot,
                metric: metric.to_string(),
            })
        };
        let curve = ordinal
            .and_then(|o| lookup(Some(o)))
            .or_else(|| lookup(None))?;
        let last = curve.len().checked_sub(1)?;
        Some(curve[iteration.saturating_sub(1).min(last)])
    }

    fn has_curve(&self, metric: &str) -> bool {
        self.curves.keys().any(|key| key.metric == metric)
    }
}

fn parse_params(params: &str) -> Params {
    Params::from_pairs(
        params
            .split_whitespace()
            .filter_map(|pair| pair.split_once('=')),
    )
}

fn default_metric(objective: &Objective) -> &'static str {
    match objective {
        Objective::Binary => "binary_logloss",
        Objective::Multiclass | Objective::MulticlassOva => "multi_logloss",
        Objective::RegressionL1 => "l1",
        Objective::CrossEntropy => "cross_entropy",
        Objective::LambdaRank | Objective::RankXendcg => "ndcg",
        _ => "l2",
    }
}

fn is_computed(metric: &str) -> bool {
    matches!(
        metric,
        "l1" | "l2" | "rmse" | "binary_logloss" | "binary_error" | "multi_logloss" | "multi_error"
            | "cross_entropy" | "auc"
    )
}

fn weighted_mean(values: impl Iterator<Item = f64>, weight: Option<&[f32]>) -> f64 {
    let (sum, total) = values.enumerate().fold((0.0, 0.0), |(sum, total), (i, v)| {
        let w = weight.map_or(1.0, |w| f64::from(w[i]));
        (sum + w * v, total + w)
    });
    if total > 0.0 { sum / total } else { f64::NAN }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(raw: &[f64]) -> Vec<f64> {
    let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = raw.iter().map(|&s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// Per-class score the constant model converges to.
fn fit_target(objective: &Objective, n_outputs: usize, slot: &Slot) -> Vec<f64> {
    let w = slot.weight.as_deref();
    let labels = || slot.label.iter().map(|&y| f64::from(y));
    match objective {
        Objective::Binary | Objective::CrossEntropy => vec![logit(weighted_mean(labels(), w))],
        Objective::Multiclass | Objective::MulticlassOva => (0..n_outputs)
            .map(|k| {
                let freq = weighted_mean(labels().map(|y| f64::from(y as usize == k)), w);
                match objective {
                    Objective::Multiclass => freq.max(1e-6).ln(),
                    _ => logit(freq),
                }
            })
            .collect(),
        _ => vec![weighted_mean(labels(), w)],
    }
}

fn evaluate(booster: &BoosterState, metric: &str, slot: &Slot) -> f64 {
    let pred = booster.transform(booster.raw_at(None));
    let w = slot.weight.as_deref();
    let labels = slot.label.iter().map(|&y| f64::from(y));
    match metric {
        "l2" => weighted_mean(labels.map(|y| (y - pred[0]).powi(2)), w),
        "rmse" => weighted_mean(labels.map(|y| (y - pred[0]).powi(2)), w).sqrt(),
        "l1" => weighted_mean(labels.map(|y| (y - pred[0]).abs()), w),
        "binary_logloss" | "cross_entropy" => {
            let p = pred[0].clamp(PROB_EPS, 1.0 - PROB_EPS);
            weighted_mean(labels.map(|y| -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())), w)
        }
        "binary_error" => {
            let positive = pred[0] > 0.5;
            weighted_mean(labels.map(|y| f64::from((y > 0.5) != positive)), w)
        }
        "multi_logloss" => weighted_mean(
            labels.map(|y| {
                let p = pred.get(y as usize).copied().unwrap_or(0.0);
                -p.max(PROB_EPS).ln()
            }),
            w,
        ),
        "multi_error" => {
            let argmax = pred
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
                .0;
            weighted_mean(labels.map(|y| f64::from(y as usize != argmax)), w)
        }
        // Constant scores rank every pair as a tie.
        "auc" => 0.5,
        _ => f64::NAN,
    }
}

// =============================================================================
// Engine
// =============================================================================

impl Engine for ScriptedEngine {
    fn dataset_create_from_mat(
        &self,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        _params: &str,
        reference: Option<RawHandle>,
    ) -> CallResult<RawHandle> {
        let mut state = self.enter("dataset_create_from_mat")?;
        if data.len() != n_rows * n_cols {
            return self.fail(&mut state, format!("expected {} values, got {}", n_rows * n_cols, data.len()));
        }
        if let Some(reference) = reference {
            match state.datasets.get(&reference.0).map(|r| r.n_cols) {
                Some(cols) if cols == n_cols => {}
                Some(_) => return self.fail(&mut state, "reference dataset has a different number of columns"),
                None => return self.fail(&mut state, format!("unknown reference dataset {}", reference.0)),
            }
        }
        let id = state.alloc();
        state.datasets.insert(
            id,
            DatasetState {
                data: data.to_vec(),
                n_rows,
                n_cols,
                label: vec![0.0; n_rows],
                weight: None,
                feature_names: (0..n_cols).map(|i| format!("Column_{i}")).collect(),
            },
        );
        state.counters.datasets_created += 1;
        Ok(RawHandle(id))
    }

    fn dataset_get_subset(&self, dataset: RawHandle, indices: &[i32], _params: &str) -> CallResult<RawHandle> {
        let mut state = self.enter("dataset_get_subset")?;
        let Some(parent) = state.datasets.get(&dataset.0).cloned() else {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        };
        let mut rows = Vec::with_capacity(indices.len());
        for &i in indices {
            match usize::try_from(i) {
                Ok(i) if i < parent.n_rows => rows.push(i),
                _ => return self.fail(&mut state, format!("subset index {i} out of range")),
            }
        }
        let subset = DatasetState {
            data: rows.iter().flat_map(|&i| parent.row(i).iter().copied()).collect(),
            n_rows: rows.len(),
            n_cols: parent.n_cols,
            label: rows.iter().map(|&i| parent.label[i]).collect(),
            weight: parent.weight.as_ref().map(|w| rows.iter().map(|&i| w[i]).collect()),
            feature_names: parent.feature_names.clone(),
        };
        let id = state.alloc();
        state.datasets.insert(id, subset);
        state.counters.datasets_created += 1;
        Ok(RawHandle(id))
    }

    fn dataset_set_field(&self, dataset: RawHandle, field: &str, data: &[f32]) -> CallResult<()> {
        let mut state = self.enter("dataset_set_field")?;
        let Some(ds) = state.datasets.get_mut(&dataset.0) else {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        };
        if data.len() != ds.n_rows {
            let message = format!("{field} has {} entries for {} rows", data.len(), ds.n_rows);
            return self.fail(&mut state, message);
        }
        match field {
            "label" => ds.label = data.to_vec(),
            "weight" => ds.weight = Some(data.to_vec()),
            other => {
                let message = format!("unknown field name: {other}");
                return self.fail(&mut state, message);
            }
        }
        Ok(())
    }

    fn dataset_set_feature_names(&self, dataset: RawHandle, names: &[String]) -> CallResult<()> {
        let mut state = self.enter("dataset_set_feature_names")?;
        let Some(ds) = state.datasets.get_mut(&dataset.0) else {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        };
        if names.len() != ds.n_cols {
            return self.fail(&mut state, "feature name count does not match columns");
        }
        ds.feature_names = names.to_vec();
        Ok(())
    }

    fn dataset_save_binary(&self, dataset: RawHandle, path: &Path) -> CallResult<()> {
        let mut state = self.enter("dataset_save_binary")?;
        let Some(ds) = state.datasets.get(&dataset.0) else {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        };
        let mut bytes = Vec::with_capacity(16 + ds.data.len() * 8);
        bytes.extend_from_slice(&(ds.n_rows as u64).to_le_bytes());
        bytes.extend_from_slice(&(ds.n_cols as u64).to_le_bytes());
        for v in &ds.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(ds.feature_names.join("\n").as_bytes());
        match std::fs::write(path, bytes) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(&mut state, format!("cannot write {}: {e}", path.display())),
        }
    }

    fn dataset_free(&self, dataset: RawHandle) -> CallResult<()> {
        let mut state = self.enter("dataset_free")?;
        if state.datasets.remove(&dataset.0).is_none() {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        }
        state.counters.datasets_freed += 1;
        Ok(())
    }

    fn booster_create(&self, train: RawHandle, params: &str) -> CallResult<RawHandle> {
        let mut state = self.enter("booster_create")?;
        let Some(ds) = state.datasets.get(&train.0).cloned() else {
            return self.fail(&mut state, format!("unknown dataset {}", train.0));
        };
        let params = parse_params(params);
        let objective = params.objective.clone().unwrap_or(Objective::Regression);
        if let Objective::Other(name) = &objective {
            return self.fail(&mut state, format!("Unknown objective type name: {name}"));
        }
        let n_outputs = params.n_outputs();
        if objective.is_multiclass() && n_outputs < 2 {
            return self.fail(&mut state, "Number of classes should be specified and greater than 1 for multiclass training");
        }
        let metrics: Vec<String> = if params.metric.is_empty() {
            vec![default_metric(&objective).to_string()]
        } else {
            params.metric.iter().map(Metric::name).collect()
        };
        if let Some(unknown) = metrics.iter().find(|m| !is_computed(m) && !self.has_curve(m)) {
            let message = format!("Unknown metric type name: {unknown}");
            return self.fail(&mut state, message);
        }

        let train_slot = Slot {
            label: ds.label.clone(),
            weight: ds.weight.clone(),
        };
        let booster = BoosterState {
            ordinal: Some(state.counters.boosters_created),
            target: fit_target(&objective, n_outputs, &train_slot),
            objective,
            metrics,
            n_features: ds.n_cols,
            n_outputs,
            learning_rate: params.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE),
            scores: vec![vec![0.0; n_outputs]],
            slots: vec![train_slot],
        };
        let id = state.alloc();
        state.boosters.insert(id, booster);
        state.counters.boosters_created += 1;
        Ok(RawHandle(id))
    }

    fn booster_create_from_modelfile(&self, path: &Path) -> CallResult<(RawHandle, usize)> {
        let mut state = self.enter("booster_create_from_modelfile")?;
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => return self.fail(&mut state, format!("cannot read {}: {e}", path.display())),
        };
        let Some(booster) = BoosterState::from_model_text(&text) else {
            return self.fail(&mut state, format!("Model file {} is not a valid model", path.display()));
        };
        let iterations = booster.iterations();
        let id = state.alloc();
        state.boosters.insert(id, booster);
        Ok((RawHandle(id), iterations))
    }

    fn booster_free(&self, booster: RawHandle) -> CallResult<()> {
        let mut state = self.enter("booster_free")?;
        if state.boosters.remove(&booster.0).is_none() {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        }
        state.counters.boosters_freed += 1;
        Ok(())
    }

    fn booster_add_valid_data(&self, booster: RawHandle, dataset: RawHandle) -> CallResult<()> {
        let mut state = self.enter("booster_add_valid_data")?;
        let Some(ds) = state.datasets.get(&dataset.0).cloned() else {
            return self.fail(&mut state, format!("unknown dataset {}", dataset.0));
        };
        let Some(b) = state.boosters.get_mut(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        if ds.n_cols != b.n_features {
            return self.fail(&mut state, "validation data has a different number of columns");
        }
        b.slots.push(Slot {
            label: ds.label,
            weight: ds.weight,
        });
        Ok(())
    }

    fn booster_update_one_iter(&self, booster: RawHandle) -> CallResult<bool> {
        let mut state = self.enter("booster_update_one_iter")?;
        state.counters.updates += 1;
        let Some(b) = state.boosters.get_mut(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        if b.slots.is_empty() {
            return self.fail(&mut state, "cannot update a booster without training data");
        }
        if self.finish_after.is_some_and(|n| b.iterations() >= n) {
            return Ok(true);
        }
        let last = b.scores[b.iterations()].clone();
        let next = last
            .iter()
            .zip(&b.target)
            .map(|(s, t)| s + b.learning_rate * (t - s))
            .collect();
        b.scores.push(next);
        Ok(false)
    }

    fn booster_current_iteration(&self, booster: RawHandle) -> CallResult<usize> {
        let mut state = self.enter("booster_current_iteration")?;
        match state.boosters.get(&booster.0) {
            Some(b) => Ok(b.iterations()),
            None => self.fail(&mut state, format!("unknown booster {}", booster.0)),
        }
    }

    fn booster_num_classes(&self, booster: RawHandle) -> CallResult<usize> {
        let mut state = self.enter("booster_num_classes")?;
        match state.boosters.get(&booster.0) {
            Some(b) => Ok(b.n_outputs),
            None => self.fail(&mut state, format!("unknown booster {}", booster.0)),
        }
    }

    fn booster_num_feature(&self, booster: RawHandle) -> CallResult<usize> {
        let mut state = self.enter("booster_num_feature")?;
        match state.boosters.get(&booster.0) {
            Some(b) => Ok(b.n_features),
            None => self.fail(&mut state, format!("unknown booster {}", booster.0)),
        }
    }

    fn booster_eval_names(&self, booster: RawHandle) -> CallResult<Vec<String>> {
        let mut state = self.enter("booster_eval_names")?;
        match state.boosters.get(&booster.0) {
            Some(b) => Ok(b.metrics.clone()),
            None => self.fail(&mut state, format!("unknown booster {}", booster.0)),
        }
    }

    fn booster_eval(&self, booster: RawHandle, data_idx: usize) -> CallResult<Vec<f64>> {
        let mut state = self.enter("booster_eval")?;
        let Some(b) = state.boosters.get(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        let Some(slot) = b.slots.get(data_idx) else {
            let message = format!("data slot {data_idx} out of range");
            return self.fail(&mut state, message);
        };
        Ok(b.metrics
            .iter()
            .map(|metric| {
                self.curve_value(b.ordinal, data_idx, metric, b.iterations())
                    .unwrap_or_else(|| evaluate(b, metric, slot))
            })
            .collect())
    }

    fn booster_predict_for_mat(
        &self,
        booster: RawHandle,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        predict_type: PredictType,
        num_iteration: Option<usize>,
        _params: &str,
    ) -> CallResult<Vec<f64>> {
        let mut state = self.enter("booster_predict_for_mat")?;
        let Some(b) = state.boosters.get(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        if n_cols != b.n_features || data.len() != n_rows * n_cols {
            let message = format!(
                "The number of features in data ({n_cols}) is not the same as it was in training data ({})",
                b.n_features
            );
            return self.fail(&mut state, message);
        }
        let raw = b.raw_at(num_iteration);
        let per_row: Vec<f64> = match predict_type {
            PredictType::Normal => b.transform(raw),
            PredictType::RawScore => raw.to_vec(),
            PredictType::LeafIndex => {
                let trees = num_iteration.map_or(b.iterations(), |n| n.min(b.iterations()));
                vec![0.0; trees * b.n_outputs]
            }
            PredictType::Contrib => raw
                .iter()
                .flat_map(|&s| std::iter::repeat_n(0.0, n_cols).chain(std::iter::once(s)))
                .collect(),
        };
        Ok(std::iter::repeat_n(per_row, n_rows).flatten().collect())
    }

    fn booster_save_model(&self, booster: RawHandle, num_iteration: Option<usize>, path: &Path) -> CallResult<()> {
        let mut state = self.enter("booster_save_model")?;
        let Some(b) = state.boosters.get(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        let text = b.to_model_text(num_iteration);
        match std::fs::write(path, text) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(&mut state, format!("cannot write {}: {e}", path.display())),
        }
    }

    fn booster_save_model_to_string(&self, booster: RawHandle, num_iteration: Option<usize>) -> CallResult<String> {
        let mut state = self.enter("booster_save_model_to_string")?;
        match state.boosters.get(&booster.0) {
            Some(b) => Ok(b.to_model_text(num_iteration)),
            None => self.fail(&mut state, format!("unknown booster {}", booster.0)),
        }
    }

    fn booster_feature_importance(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
        importance_type: ImportanceType,
    ) -> CallResult<Vec<f64>> {
        let mut state = self.enter("booster_feature_importance")?;
        let Some(b) = state.boosters.get(&booster.0) else {
            return self.fail(&mut state, format!("unknown booster {}", booster.0));
        };
        // Iteration `i` splits on feature `(i - 1) % n_features`.
        let mut importance = vec![0.0; b.n_features];
        if b.n_features == 0 {
            return Ok(importance);
        }
        let n = num_iteration.map_or(b.iterations(), |n| n.min(b.iterations()));
        for i in 1..=n {
            let gain: f64 = b.scores[i]
                .iter()
                .zip(&b.scores[i - 1])
                .map(|(a, c)| (a - c).abs())
                .sum();
            importance[(i - 1) % b.n_features] += match importance_type {
                ImportanceType::Split => 1.0,
                ImportanceType::Gain => gain,
            };
        }
        Ok(importance)
    }

    fn last_error(&self) -> String {
        let state = self.lock();
        state
            .last_error
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_else(|| "Everything is fine".to_string())
    }
}
