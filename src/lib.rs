//! lgbm: a safe control layer over the LightGBM C engine.
//!
//! The boosting algorithm itself lives behind the engine's fixed call
//! interface. This crate owns the native resources, drives the training
//! loop with evaluation and early stopping, and runs k-fold
//! cross-validation.
//!
//! # Key Types
//!
//! - [`Dataset`] / [`DatasetBuilder`] - Training data held by the engine
//! - [`Booster`] - A model: update, evaluate, predict, save
//! - [`Params`] - Engine parameters and their string encoding
//! - [`Trainer`] / [`TrainConfig`] - The boosting loop
//! - [`CrossValidator`] / [`CvConfig`] - K-fold cross-validation
//!
//! # Engines
//!
//! Every foreign call goes through the [`Engine`] trait. Enable the
//! `native` feature for [`ffi::NativeEngine`], the real library; use
//! [`testing::ScriptedEngine`] to run everything in process.
//!
//! # Training
//!
//! ```
//! use std::sync::Arc;
//! use lgbm::testing::ScriptedEngine;
//! use lgbm::{Dataset, EngineRef, EvalSet, Params, TrainConfig, train};
//!
//! let engine: EngineRef = Arc::new(ScriptedEngine::new());
//! let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64, (i % 3) as f64]).collect();
//! let label: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
//! let train_set = Dataset::from_rows(&engine, &rows, &label).unwrap();
//!
//! let params = Params::new().with("objective", "regression");
//! let config = TrainConfig::builder()
//!     .num_boost_round(20)
//!     .verbose_eval(false)
//!     .build()
//!     .unwrap();
//! let booster = train(&params, &train_set, &[EvalSet::new(&train_set)], config).unwrap();
//! assert_eq!(booster.current_iteration().unwrap(), 20);
//! ```

// Re-export approx for callers comparing predictions
pub use approx;

pub mod booster;
pub mod data;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod params;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use error::{Error, Result};
pub use ffi::{Engine, EngineRef, ImportanceType, PredictType};

pub use booster::{Booster, PredictInput, PredictOptions, Prediction};
pub use data::{Dataset, DatasetBuilder};
pub use params::{Objective, Params};

pub use training::{
    CrossValidator, CvConfig, CvResult, EvalSet, Metric, TrainConfig, TrainOutput, Trainer, cv,
    train,
};

pub use utils::Parallelism;
