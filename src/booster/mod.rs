//! Trained or training model owned by the engine.
//!
//! A [`Booster`] is created from a training [`Dataset`] or loaded from a
//! model file. It advances one boosting round per [`Booster::update`],
//! evaluates its metrics on the training and validation data, and predicts.
//!
//! Predictions use [`Booster::best_iteration`] when one has been recorded,
//! so a model returned by early-stopped training predicts with its best
//! round rather than the last one.

mod predict;

pub use predict::{PredictInput, PredictOptions, Prediction};

use std::path::Path;

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::ffi::{self, EngineRef, ImportanceType, PredictType, RawHandle};
use crate::handle::{HandleKind, ResourceHandle};
use crate::params::Params;
use crate::training::{EvaluationRecord, TRAINING_NAME, direction_of};

/// A gradient-boosted model held by the engine.
#[derive(Debug)]
pub struct Booster {
    handle: ResourceHandle,
    /// Column count predictions must match.
    n_features: usize,
    /// Validation set names in the order they were added.
    valid_names: Vec<String>,
    best_iteration: Option<usize>,
}

impl Booster {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create an untrained booster over `train`.
    ///
    /// The parameter string is validated before the engine is called, so a
    /// key or value containing whitespace fails with [`Error::Argument`]
    /// without touching the engine.
    pub fn from_dataset(train: &Dataset, params: &Params) -> Result<Self> {
        let param_string = params.to_param_string()?;
        let train_raw = train.raw()?;
        let handle = ResourceHandle::acquire(train.engine(), HandleKind::Booster, |engine| {
            engine.booster_create(train_raw, &param_string)
        })?;
        tracing::debug!(params = %param_string, "created booster");
        Ok(Self {
            handle,
            n_features: train.n_features(),
            valid_names: Vec::new(),
            best_iteration: None,
        })
    }

    /// Load a model file written by [`Booster::save`].
    pub fn from_file(engine: &EngineRef, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::metadata(path)?;

        let mut iterations = 0;
        let handle = ResourceHandle::acquire(engine, HandleKind::Booster, |engine| {
            engine.booster_create_from_modelfile(path).map(|(raw, n)| {
                iterations = n;
                raw
            })
        })?;
        let raw = handle.borrow()?;
        let n_features = ffi::check(engine.as_ref(), engine.booster_num_feature(raw))?;
        tracing::debug!(path = %path.display(), iterations, n_features, "loaded booster");
        Ok(Self {
            handle,
            n_features,
            valid_names: Vec::new(),
            best_iteration: None,
        })
    }

    fn raw(&self) -> Result<RawHandle> {
        self.handle.borrow()
    }

    fn engine(&self) -> &EngineRef {
        self.handle.engine()
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Register `dataset` as validation data evaluated every round.
    pub fn add_valid(&mut self, dataset: &Dataset, name: impl Into<String>) -> Result<()> {
        let raw = self.raw()?;
        let data = dataset.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.booster_add_valid_data(raw, data))?;
        self.valid_names.push(name.into());
        Ok(())
    }

    /// Run one boosting round.
    ///
    /// Returns `true` when the engine reports that training cannot continue.
    pub fn update(&mut self) -> Result<bool> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.booster_update_one_iter(raw))
    }

    /// Metric names in the order the engine reports them.
    pub fn eval_names(&self) -> Result<Vec<String>> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.booster_eval_names(raw))
    }

    /// Current metric values on the training data.
    pub fn eval_train(&self) -> Result<Vec<EvaluationRecord>> {
        self.eval_slot(0, TRAINING_NAME)
    }

    /// Current metric values on every validation set, in the order added.
    pub fn eval_valid(&self) -> Result<Vec<EvaluationRecord>> {
        let mut records = Vec::new();
        for (i, name) in self.valid_names.iter().enumerate() {
            records.extend(self.eval_slot(i + 1, name)?);
        }
        Ok(records)
    }

    /// Evaluate data slot `slot` (0 = training data) and label it `name`.
    pub(crate) fn eval_slot(&self, slot: usize, name: &str) -> Result<Vec<EvaluationRecord>> {
        let raw = self.raw()?;
        let engine = self.engine();
        let names = ffi::check(engine.as_ref(), engine.booster_eval_names(raw))?;
        let values = ffi::check(engine.as_ref(), engine.booster_eval(raw, slot))?;
        if values.len() != names.len() {
            return Err(Error::Engine {
                message: format!(
                    "engine returned {} metric values for {} metric names",
                    values.len(),
                    names.len()
                ),
            });
        }
        let iteration = self.current_iteration()?;
        Ok(names
            .into_iter()
            .zip(values)
            .map(|(metric, value)| EvaluationRecord {
                iteration,
                dataset: name.to_string(),
                direction: direction_of(&metric),
                metric,
                value,
            })
            .collect())
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Predict one row or a batch.
    ///
    /// A single row returns [`Prediction::Scalar`] (or [`Prediction::Vector`]
    /// for multiclass); a batch of `L` rows returns `L` predictions.
    pub fn predict<'a>(&self, input: impl Into<PredictInput<'a>>) -> Result<Prediction> {
        self.predict_with(input, &PredictOptions::default())
    }

    /// Predict with an explicit output type or iteration cap.
    pub fn predict_with<'a>(
        &self,
        input: impl Into<PredictInput<'a>>,
        options: &PredictOptions,
    ) -> Result<Prediction> {
        let input = input.into();
        let (data, n_rows) = input.flatten(self.n_features)?;
        if n_rows == 0 {
            return Ok(Prediction::empty(self.output_width(options)?));
        }
        let raw = self.raw()?;
        let engine = self.engine();
        let num_iteration = options.num_iteration.or(self.best_iteration);
        let values = ffi::check(
            engine.as_ref(),
            engine.booster_predict_for_mat(
                raw,
                &data,
                n_rows,
                self.n_features,
                options.predict_type,
                num_iteration,
                "",
            ),
        )?;
        Prediction::from_flat(values, n_rows, input.is_single())
    }

    /// Outputs per row the engine would produce under `options`.
    fn output_width(&self, options: &PredictOptions) -> Result<usize> {
        let n_classes = self.num_classes()?;
        let width = match options.predict_type {
            PredictType::Normal | PredictType::RawScore => n_classes,
            PredictType::LeafIndex => {
                let iterations = self.current_iteration()?;
                let used = options
                    .num_iteration
                    .or(self.best_iteration)
                    .map_or(iterations, |n| n.min(iterations));
                used * n_classes
            }
            PredictType::Contrib => (self.n_features + 1) * n_classes,
        };
        Ok(width)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write the model file, up to the best iteration when one is recorded.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(
            engine.as_ref(),
            engine.booster_save_model(raw, self.best_iteration, path.as_ref()),
        )
    }

    /// The model file contents as a string.
    pub fn to_model_string(&self) -> Result<String> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(
            engine.as_ref(),
            engine.booster_save_model_to_string(raw, self.best_iteration),
        )
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn current_iteration(&self) -> Result<usize> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.booster_current_iteration(raw))
    }

    /// Outputs per row for normal predictions.
    pub fn num_classes(&self) -> Result<usize> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.booster_num_classes(raw))
    }

    pub fn num_features(&self) -> usize {
        self.n_features
    }

    /// Per-feature importance over the best (or every) iteration.
    pub fn feature_importance(&self, importance_type: ImportanceType) -> Result<Vec<f64>> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(
            engine.as_ref(),
            engine.booster_feature_importance(raw, self.best_iteration, importance_type),
        )
    }

    /// Validation set names in the order they were added.
    pub fn valid_names(&self) -> &[String] {
        &self.valid_names
    }

    /// Iteration chosen by early stopping, if any.
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn set_best_iteration(&mut self, iteration: Option<usize>) {
        self.best_iteration = iteration;
    }

    /// Free the native model. Later calls are no-ops.
    pub fn release(&mut self) -> Result<()> {
        self.handle.release()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }
}
