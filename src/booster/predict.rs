//! Prediction inputs and outputs.
//!
//! The engine returns a flat `rows × outputs` buffer. [`Prediction`] reshapes
//! it so a single row comes back unwrapped and a batch keeps its length.

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::ffi::PredictType;

// =============================================================================
// PredictInput
// =============================================================================

/// One row or a batch of rows to predict.
#[derive(Debug, Clone, Copy)]
pub enum PredictInput<'a> {
    /// A single feature vector.
    Row(&'a [f64]),
    /// A batch of feature vectors.
    Rows(&'a [Vec<f64>]),
    /// A batch as an `[n_rows, n_features]` array.
    Array(ArrayView2<'a, f64>),
}

impl PredictInput<'_> {
    pub fn is_single(&self) -> bool {
        matches!(self, PredictInput::Row(_))
    }

    /// Flatten into a row-major buffer, checking every row has `n_features` columns.
    pub(crate) fn flatten(&self, n_features: usize) -> Result<(Vec<f64>, usize)> {
        let mismatch = |got: usize| {
            Error::validation(format!(
                "expected {n_features} features per row, got {got}"
            ))
        };
        match *self {
            PredictInput::Row(row) => {
                if row.len() != n_features {
                    return Err(mismatch(row.len()));
                }
                Ok((row.to_vec(), 1))
            }
            PredictInput::Rows(rows) => {
                let mut data = Vec::with_capacity(rows.len() * n_features);
                for row in rows {
                    if row.len() != n_features {
                        return Err(mismatch(row.len()));
                    }
                    data.extend_from_slice(row);
                }
                Ok((data, rows.len()))
            }
            PredictInput::Array(view) => {
                let (n_rows, n_cols) = view.dim();
                if n_rows > 0 && n_cols != n_features {
                    return Err(mismatch(n_cols));
                }
                Ok((view.iter().copied().collect(), n_rows))
            }
        }
    }
}

impl<'a> From<&'a [f64]> for PredictInput<'a> {
    fn from(row: &'a [f64]) -> Self {
        PredictInput::Row(row)
    }
}

impl<'a, const N: usize> From<&'a [f64; N]> for PredictInput<'a> {
    fn from(row: &'a [f64; N]) -> Self {
        PredictInput::Row(row)
    }
}

impl<'a> From<&'a Vec<f64>> for PredictInput<'a> {
    fn from(row: &'a Vec<f64>) -> Self {
        PredictInput::Row(row)
    }
}

impl<'a> From<&'a [Vec<f64>]> for PredictInput<'a> {
    fn from(rows: &'a [Vec<f64>]) -> Self {
        PredictInput::Rows(rows)
    }
}

impl<'a> From<&'a Vec<Vec<f64>>> for PredictInput<'a> {
    fn from(rows: &'a Vec<Vec<f64>>) -> Self {
        PredictInput::Rows(rows)
    }
}

impl<'a> From<ArrayView2<'a, f64>> for PredictInput<'a> {
    fn from(view: ArrayView2<'a, f64>) -> Self {
        PredictInput::Array(view)
    }
}

// =============================================================================
// PredictOptions
// =============================================================================

/// What to predict and with how many iterations.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct PredictOptions {
    #[builder(default)]
    pub predict_type: PredictType,
    /// Iteration cap. `None` uses the best iteration when one is recorded,
    /// otherwise every iteration.
    pub num_iteration: Option<usize>,
}

// =============================================================================
// Prediction
// =============================================================================

/// Reshaped prediction output.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Single row, single output.
    Scalar(f64),
    /// Single row, one value per class (or per contribution/leaf column).
    Vector(Vec<f64>),
    /// Batch, single output: one value per row.
    Scalars(Vec<f64>),
    /// Batch, `[n_rows, n_outputs]`.
    Vectors(Array2<f64>),
}

impl Prediction {
    /// A batch of zero rows with `width` outputs per row.
    pub(crate) fn empty(width: usize) -> Self {
        if width == 1 {
            Prediction::Scalars(Vec::new())
        } else {
            Prediction::Vectors(Array2::zeros((0, width)))
        }
    }

    /// Reshape a flat engine buffer of `n_rows` rows.
    pub(crate) fn from_flat(values: Vec<f64>, n_rows: usize, single: bool) -> Result<Self> {
        if n_rows == 0 || values.is_empty() || values.len() % n_rows != 0 {
            return Err(Error::validation(format!(
                "engine returned {} values for {n_rows} rows",
                values.len()
            )));
        }
        let width = values.len() / n_rows;
        let prediction = match (single, width) {
            (true, 1) => Prediction::Scalar(values[0]),
            (true, _) => Prediction::Vector(values),
            (false, 1) => Prediction::Scalars(values),
            (false, _) => Prediction::Vectors(
                Array2::from_shape_vec((n_rows, width), values)
                    .map_err(|e| Error::validation(e.to_string()))?,
            ),
        };
        Ok(prediction)
    }

    /// Number of rows predicted.
    pub fn len(&self) -> usize {
        match self {
            Prediction::Scalar(_) | Prediction::Vector(_) => 1,
            Prediction::Scalars(values) => values.len(),
            Prediction::Vectors(values) => values.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outputs per row.
    pub fn n_outputs(&self) -> usize {
        match self {
            Prediction::Scalar(_) | Prediction::Scalars(_) => 1,
            Prediction::Vector(values) => values.len(),
            Prediction::Vectors(values) => values.ncols(),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Prediction::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Prediction::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_scalars(&self) -> Option<&[f64]> {
        match self {
            Prediction::Scalars(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vectors(&self) -> Option<&Array2<f64>> {
        match self {
            Prediction::Vectors(v) => Some(v),
            _ => None,
        }
    }

    /// Row-major values regardless of shape.
    pub fn to_flat(&self) -> Vec<f64> {
        match self {
            Prediction::Scalar(v) => vec![*v],
            Prediction::Vector(v) | Prediction::Scalars(v) => v.clone(),
            Prediction::Vectors(v) => v.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rstest::rstest;

    #[rstest]
    #[case::scalar(vec![0.5], 1, true, Prediction::Scalar(0.5))]
    #[case::vector(vec![0.2, 0.8], 1, true, Prediction::Vector(vec![0.2, 0.8]))]
    #[case::scalars(vec![0.1, 0.2, 0.3], 3, false, Prediction::Scalars(vec![0.1, 0.2, 0.3]))]
    #[case::single_row_batch(vec![0.4], 1, false, Prediction::Scalars(vec![0.4]))]
    fn reshapes_flat_output(
        #[case] values: Vec<f64>,
        #[case] n_rows: usize,
        #[case] single: bool,
        #[case] expected: Prediction,
    ) {
        assert_eq!(Prediction::from_flat(values, n_rows, single).unwrap(), expected);
    }

    #[test]
    fn reshapes_multiclass_batch() {
        let flat = vec![0.1, 0.2, 0.7, 0.3, 0.3, 0.4];
        let prediction = Prediction::from_flat(flat, 2, false).unwrap();
        assert_eq!(prediction.len(), 2);
        assert_eq!(prediction.n_outputs(), 3);
        assert_eq!(
            prediction.as_vectors().unwrap(),
            &array![[0.1, 0.2, 0.7], [0.3, 0.3, 0.4]]
        );
    }

    #[test]
    fn rejects_uneven_buffer() {
        assert!(Prediction::from_flat(vec![1.0, 2.0, 3.0], 2, false).is_err());
    }

    #[test]
    fn flatten_checks_columns() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let err = PredictInput::from(&rows).flatten(2).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let (data, n_rows) = PredictInput::from(&[1.0, 2.0]).flatten(2).unwrap();
        assert_eq!((data, n_rows), (vec![1.0, 2.0], 1));
    }

    #[test]
    fn empty_batch_flattens_to_zero_rows() {
        let rows: Vec<Vec<f64>> = Vec::new();
        assert_eq!(PredictInput::from(&rows).flatten(2).unwrap(), (Vec::new(), 0));

        let view = ArrayView2::<f64>::from_shape((0, 0), &[]).unwrap();
        assert_eq!(PredictInput::from(view).flatten(2).unwrap().1, 0);
    }

    #[test]
    fn empty_prediction_keeps_width() {
        assert_eq!(Prediction::empty(1), Prediction::Scalars(Vec::new()));
        let wide = Prediction::empty(3);
        assert!(wide.is_empty());
        assert_eq!(wide.n_outputs(), 3);
    }
}
