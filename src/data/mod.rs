//! Training data owned by the engine.
//!
//! A [`Dataset`] is built once from a row-major feature matrix and is
//! immutable afterwards. The engine bins the features at construction time;
//! the Rust side keeps only the shape, labels, and weights for validation
//! and fold splitting.
//!
//! # Key Types
//!
//! - [`Dataset`]: owns one native dataset handle
//! - [`DatasetBuilder`]: fluent builder for labels, weights, categorical
//!   columns, feature names, and a reference dataset
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lgbm::data::Dataset;
//! use lgbm::testing::ScriptedEngine;
//! use lgbm::EngineRef;
//!
//! let engine: EngineRef = Arc::new(ScriptedEngine::new());
//! let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
//!
//! let ds = Dataset::builder(&engine, &rows)
//!     .label(&[0.0, 1.0, 0.0])
//!     .categorical(&[1])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(ds.n_rows(), 3);
//! assert_eq!(ds.n_features(), 2);
//! ```

mod dataset;

pub use dataset::{Dataset, DatasetBuilder};
