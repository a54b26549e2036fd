//! [`Dataset`] and [`DatasetBuilder`].

use std::path::Path;

use ndarray::{ArrayView1, ArrayView2};

use crate::error::{Error, Result};
use crate::ffi::{self, EngineRef, RawHandle};
use crate::handle::{HandleKind, ResourceHandle};
use crate::params::Params;

/// A feature matrix, labels and weights held by the engine.
///
/// Construction validates the shape, then hands the matrix to the engine,
/// which bins it. After that the dataset is immutable; derived datasets come
/// from [`Dataset::subset`].
#[derive(Debug)]
pub struct Dataset {
    handle: ResourceHandle,
    n_rows: usize,
    n_features: usize,
    label: Option<Vec<f32>>,
    weight: Option<Vec<f32>>,
    feature_names: Option<Vec<String>>,
    categorical: Vec<usize>,
    /// Parameter string the dataset was constructed with, reused for subsets.
    param_string: String,
}

impl Dataset {
    /// Start building a dataset from row-major rows.
    pub fn builder<'a>(engine: &EngineRef, rows: &'a [Vec<f64>]) -> DatasetBuilder<'a> {
        DatasetBuilder::new(engine, Features::Rows(rows))
    }

    /// Start building a dataset from an `[n_rows, n_features]` array.
    pub fn array_builder<'a>(engine: &EngineRef, features: ArrayView2<'a, f64>) -> DatasetBuilder<'a> {
        DatasetBuilder::new(engine, Features::Array(features))
    }

    /// Labeled dataset from rows with default options.
    pub fn from_rows(engine: &EngineRef, rows: &[Vec<f64>], label: &[f64]) -> Result<Self> {
        Self::builder(engine, rows).label(label).build()
    }

    /// Labeled dataset from an `[n_rows, n_features]` array with default options.
    pub fn from_array(
        engine: &EngineRef,
        features: ArrayView2<'_, f64>,
        label: ArrayView1<'_, f64>,
    ) -> Result<Self> {
        let label: Vec<f64> = label.iter().copied().collect();
        Self::array_builder(engine, features).label(&label).build()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn label(&self) -> Option<&[f32]> {
        self.label.as_deref()
    }

    pub fn weight(&self) -> Option<&[f32]> {
        self.weight.as_deref()
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    /// Column indices treated as categorical.
    pub fn categorical(&self) -> &[usize] {
        &self.categorical
    }

    pub fn engine(&self) -> &EngineRef {
        self.handle.engine()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    pub(crate) fn raw(&self) -> Result<RawHandle> {
        self.handle.borrow()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Derive a dataset holding the given rows.
    ///
    /// Indices are sorted before they reach the engine; labels and weights
    /// follow the same order. The subset shares this dataset's bin mappers.
    pub fn subset(&self, indices: &[usize]) -> Result<Dataset> {
        if indices.is_empty() {
            return Err(Error::validation("subset must contain at least one row"));
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        if let Some(&last) = sorted.last() {
            if last >= self.n_rows {
                return Err(Error::validation(format!(
                    "subset index {last} out of range for {} rows",
                    self.n_rows
                )));
            }
        }
        let used: Vec<i32> = sorted
            .iter()
            .map(|&i| i32::try_from(i).map_err(|_| Error::validation("row index exceeds i32")))
            .collect::<Result<_>>()?;

        let parent = self.raw()?;
        let params = self.param_string.as_str();
        let handle = ResourceHandle::acquire(self.engine(), HandleKind::Dataset, |engine| {
            engine.dataset_get_subset(parent, &used, params)
        })?;

        let pick = |values: &Option<Vec<f32>>| {
            values
                .as_ref()
                .map(|v| sorted.iter().map(|&i| v[i]).collect::<Vec<f32>>())
        };

        tracing::debug!(parent = parent.0, rows = sorted.len(), "created dataset subset");
        Ok(Dataset {
            handle,
            n_rows: sorted.len(),
            n_features: self.n_features,
            label: pick(&self.label),
            weight: pick(&self.weight),
            feature_names: self.feature_names.clone(),
            categorical: self.categorical.clone(),
            param_string: self.param_string.clone(),
        })
    }

    /// Write the engine's binary dataset file.
    pub fn save_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = self.raw()?;
        let engine = self.engine();
        ffi::check(engine.as_ref(), engine.dataset_save_binary(raw, path.as_ref()))
    }

    /// Free the native dataset. Later calls are no-ops.
    pub fn release(&mut self) -> Result<()> {
        self.handle.release()
    }
}

// =============================================================================
// DatasetBuilder
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Features<'a> {
    Rows(&'a [Vec<f64>]),
    Array(ArrayView2<'a, f64>),
}

impl Features<'_> {
    /// Flatten into a row-major buffer, checking for an empty or ragged matrix.
    fn flatten(self) -> Result<(Vec<f64>, usize, usize)> {
        match self {
            Features::Rows(rows) => {
                let first = rows
                    .first()
                    .ok_or_else(|| Error::validation("dataset must have at least one row"))?;
                let n_cols = first.len();
                if n_cols == 0 {
                    return Err(Error::validation("dataset must have at least one column"));
                }
                let mut data = Vec::with_capacity(rows.len() * n_cols);
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != n_cols {
                        return Err(Error::validation(format!(
                            "row {i} has {} columns, expected {n_cols}",
                            row.len()
                        )));
                    }
                    data.extend_from_slice(row);
                }
                Ok((data, rows.len(), n_cols))
            }
            Features::Array(view) => {
                let (n_rows, n_cols) = view.dim();
                if n_rows == 0 {
                    return Err(Error::validation("dataset must have at least one row"));
                }
                if n_cols == 0 {
                    return Err(Error::validation("dataset must have at least one column"));
                }
                Ok((view.iter().copied().collect(), n_rows, n_cols))
            }
        }
    }
}

/// Builder for [`Dataset`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lgbm::data::Dataset;
/// use lgbm::testing::ScriptedEngine;
/// use lgbm::EngineRef;
///
/// let engine: EngineRef = Arc::new(ScriptedEngine::new());
/// let rows = vec![vec![1.0, 0.0], vec![2.0, 1.0]];
/// let train = Dataset::from_rows(&engine, &rows, &[1.0, 2.0]).unwrap();
///
/// let valid = Dataset::builder(&engine, &rows)
///     .label(&[1.5, 2.5])
///     .weight(&[1.0, 0.5])
///     .feature_names(["size", "flag"])
///     .reference(&train)
///     .build()
///     .unwrap();
///
/// assert_eq!(valid.weight(), Some(&[1.0f32, 0.5][..]));
/// ```
pub struct DatasetBuilder<'a> {
    engine: EngineRef,
    features: Features<'a>,
    label: Option<Vec<f64>>,
    weight: Option<Vec<f64>>,
    categorical: Vec<usize>,
    feature_names: Option<Vec<String>>,
    reference: Option<&'a Dataset>,
    params: Params,
}

impl<'a> DatasetBuilder<'a> {
    fn new(engine: &EngineRef, features: Features<'a>) -> Self {
        Self {
            engine: engine.clone(),
            features,
            label: None,
            weight: None,
            categorical: Vec::new(),
            feature_names: None,
            reference: None,
            params: Params::default(),
        }
    }

    /// One label per row.
    pub fn label(mut self, label: &[f64]) -> Self {
        self.label = Some(label.to_vec());
        self
    }

    /// One weight per row.
    pub fn weight(mut self, weight: &[f64]) -> Self {
        self.weight = Some(weight.to_vec());
        self
    }

    /// Column indices to treat as categorical.
    pub fn categorical(mut self, columns: &[usize]) -> Self {
        self.categorical = columns.to_vec();
        self
    }

    /// One name per column.
    pub fn feature_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Share bin mappers with `reference`; use this for validation data.
    pub fn reference(mut self, reference: &'a Dataset) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Dataset-level engine parameters (`max_bin`, `min_data_in_bin`, ...).
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Validate the inputs and construct the native dataset.
    pub fn build(self) -> Result<Dataset> {
        let (data, n_rows, n_features) = self.features.flatten()?;

        check_len("label", self.label.as_deref(), n_rows)?;
        check_len("weight", self.weight.as_deref(), n_rows)?;
        if let Some(&bad) = self.categorical.iter().find(|&&c| c >= n_features) {
            return Err(Error::validation(format!(
                "categorical column {bad} out of range for {n_features} columns"
            )));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != n_features {
                return Err(Error::validation(format!(
                    "{} feature names for {n_features} columns",
                    names.len()
                )));
            }
        }
        let reference = match self.reference {
            Some(reference) if reference.n_features() != n_features => {
                return Err(Error::validation(format!(
                    "reference dataset has {} columns, expected {n_features}",
                    reference.n_features()
                )));
            }
            Some(reference) => Some(reference.raw()?),
            None => None,
        };

        let mut params = self.params;
        if !self.categorical.is_empty() {
            let columns: Vec<String> = self.categorical.iter().map(usize::to_string).collect();
            params.set("categorical_feature", columns.join(","));
        }
        let param_string = params.to_param_string()?;

        let handle = ResourceHandle::acquire(&self.engine, HandleKind::Dataset, |engine| {
            engine.dataset_create_from_mat(&data, n_rows, n_features, &param_string, reference)
        })?;
        let raw = handle.borrow()?;
        let engine = self.engine.as_ref();

        let label = self.label.map(to_f32);
        if let Some(label) = &label {
            ffi::check(engine, engine.dataset_set_field(raw, "label", label))?;
        }
        let weight = self.weight.map(to_f32);
        if let Some(weight) = &weight {
            ffi::check(engine, engine.dataset_set_field(raw, "weight", weight))?;
        }
        if let Some(names) = &self.feature_names {
            ffi::check(engine, engine.dataset_set_feature_names(raw, names))?;
        }

        Ok(Dataset {
            handle,
            n_rows,
            n_features,
            label,
            weight,
            feature_names: self.feature_names,
            categorical: self.categorical,
            param_string,
        })
    }
}

fn check_len(what: &str, values: Option<&[f64]>, n_rows: usize) -> Result<()> {
    match values {
        Some(values) if values.len() != n_rows => Err(Error::validation(format!(
            "{what} has {} entries for {n_rows} rows",
            values.len()
        ))),
        _ => Ok(()),
    }
}

fn to_f32(values: Vec<f64>) -> Vec<f32> {
    values.into_iter().map(|v| v as f32).collect()
}
