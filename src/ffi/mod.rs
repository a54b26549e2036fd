//! Foreign call interface to the gradient-boosting engine.
//!
//! [`Engine`] mirrors the engine's C entry points one method per call. A
//! method fails with [`CallError::Status`] when the engine returned a
//! non-zero code; the translation into [`Error::Engine`] happens in
//! [`check`], which reads the engine's last-error text immediately after the
//! failing call. Arguments the C interface cannot represent are refused
//! before the call with [`CallError::Rejected`].
//!
//! Handles cross this boundary as [`RawHandle`], an opaque integer id. Only
//! [`crate::handle::ResourceHandle`] stores them.
//!
//! # Implementations
//!
//! - [`native::NativeEngine`]: the LightGBM C library (feature `native`)
//! - [`crate::testing::ScriptedEngine`]: an in-process engine for tests

#[cfg(feature = "native")]
pub mod native;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

#[cfg(feature = "native")]
pub use native::NativeEngine;

// =============================================================================
// Raw types
// =============================================================================

/// Opaque resource id returned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle(pub usize);

/// Non-zero status returned by a failing foreign call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReturnCode(pub i32);

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "return code {}", self.0)
    }
}

/// Why a foreign call failed.
#[derive(Debug)]
pub enum CallError {
    /// The engine ran and returned a non-zero status.
    Status(ReturnCode),
    /// The arguments were refused locally; the engine was never called.
    Rejected(Error),
}

impl From<ReturnCode> for CallError {
    fn from(code: ReturnCode) -> Self {
        CallError::Status(code)
    }
}

impl From<Error> for CallError {
    fn from(error: Error) -> Self {
        CallError::Rejected(error)
    }
}

/// Outcome of one foreign call.
pub type CallResult<T> = std::result::Result<T, CallError>;

/// What the engine computes in `booster_predict_for_mat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredictType {
    /// Transformed output (probabilities for classification).
    #[default]
    Normal,
    /// Untransformed margin.
    RawScore,
    /// Index of the leaf each row lands in, per tree.
    LeafIndex,
    /// Per-feature contributions plus the expected value.
    Contrib,
}

impl PredictType {
    pub fn code(self) -> i32 {
        match self {
            PredictType::Normal => 0,
            PredictType::RawScore => 1,
            PredictType::LeafIndex => 2,
            PredictType::Contrib => 3,
        }
    }
}

/// Feature importance flavour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImportanceType {
    /// Number of times a feature is used in a split.
    #[default]
    Split,
    /// Total gain of the splits that use the feature.
    Gain,
}

impl ImportanceType {
    pub fn code(self) -> i32 {
        match self {
            ImportanceType::Split => 0,
            ImportanceType::Gain => 1,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The engine's fixed call interface.
///
/// `num_iteration: None` means "all iterations" wherever it appears.
#[cfg_attr(test, mockall::automock)]
pub trait Engine: Send + Sync {
    fn dataset_create_from_mat(
        &self,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        params: &str,
        reference: Option<RawHandle>,
    ) -> CallResult<RawHandle>;

    fn dataset_get_subset(
        &self,
        dataset: RawHandle,
        indices: &[i32],
        params: &str,
    ) -> CallResult<RawHandle>;

    /// Set a float32 field (`label`, `weight`).
    fn dataset_set_field(&self, dataset: RawHandle, field: &str, data: &[f32]) -> CallResult<()>;

    fn dataset_set_feature_names(&self, dataset: RawHandle, names: &[String]) -> CallResult<()>;

    fn dataset_save_binary(&self, dataset: RawHandle, path: &Path) -> CallResult<()>;

    fn dataset_free(&self, dataset: RawHandle) -> CallResult<()>;

    fn booster_create(&self, train: RawHandle, params: &str) -> CallResult<RawHandle>;

    /// Returns the handle and the number of iterations stored in the file.
    fn booster_create_from_modelfile(&self, path: &Path) -> CallResult<(RawHandle, usize)>;

    fn booster_free(&self, booster: RawHandle) -> CallResult<()>;

    fn booster_add_valid_data(&self, booster: RawHandle, dataset: RawHandle) -> CallResult<()>;

    /// Returns `true` when the engine signals training cannot continue.
    fn booster_update_one_iter(&self, booster: RawHandle) -> CallResult<bool>;

    fn booster_current_iteration(&self, booster: RawHandle) -> CallResult<usize>;

    fn booster_num_classes(&self, booster: RawHandle) -> CallResult<usize>;

    fn booster_num_feature(&self, booster: RawHandle) -> CallResult<usize>;

    fn booster_eval_names(&self, booster: RawHandle) -> CallResult<Vec<String>>;

    /// Metric values for data slot `data_idx` (0 = training data, then
    /// validation sets in the order they were added).
    fn booster_eval(&self, booster: RawHandle, data_idx: usize) -> CallResult<Vec<f64>>;

    #[allow(clippy::too_many_arguments)]
    fn booster_predict_for_mat(
        &self,
        booster: RawHandle,
        data: &[f64],
        n_rows: usize,
        n_cols: usize,
        predict_type: PredictType,
        num_iteration: Option<usize>,
        params: &str,
    ) -> CallResult<Vec<f64>>;

    fn booster_save_model(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
        path: &Path,
    ) -> CallResult<()>;

    fn booster_save_model_to_string(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
    ) -> CallResult<String>;

    fn booster_feature_importance(
        &self,
        booster: RawHandle,
        num_iteration: Option<usize>,
        importance_type: ImportanceType,
    ) -> CallResult<Vec<f64>>;

    /// Text of the most recent failure on the calling thread.
    fn last_error(&self) -> String;
}

/// Shared reference to an engine implementation.
pub type EngineRef = Arc<dyn Engine>;

/// Translate a foreign status into the crate error.
///
/// The last-error text is fetched here, synchronously after the call, so
/// it always describes the call that failed. Rejected calls never reached
/// the engine and keep their local error.
pub fn check<T>(engine: &dyn Engine, result: CallResult<T>) -> Result<T> {
    result.map_err(|err| match err {
        CallError::Status(code) => {
            let message = engine.last_error();
            tracing::debug!(%code, %message, "foreign call failed");
            Error::Engine { message }
        }
        CallError::Rejected(error) => {
            tracing::debug!(%error, "foreign call refused");
            error
        }
    })
}

/// The LightGBM C library engine.
#[cfg(feature = "native")]
pub fn native_engine() -> EngineRef {
    Arc::new(NativeEngine::new())
}
