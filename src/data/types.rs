//! Observation sequence types

use crate::error::{HmmError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};

/// One recording: an ordered run of fixed-dimension feature vectors, with an
/// optional recording id and ground-truth activity label.
///
/// The matrix is rows = time steps, cols = features. Dimension consistency
/// is checked at construction; the model layers only borrow read access.
#[derive(Debug, Clone)]
pub struct Sequence {
    data: Array2<f64>,
    id: Option<String>,
    label: Option<String>,
}

impl Sequence {
    /// Wrap a T x D observation matrix.
    pub fn new(data: Array2<f64>) -> Self {
        Self {
            data,
            id: None,
            label: None,
        }
    }

    /// Build from row vectors, validating that every row has the same
    /// dimension.
    ///
    /// # Errors
    ///
    /// Fails on an empty row set, a zero-dimension first row, or any row
    /// whose length disagrees with the first.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(HmmError::InvalidInput("sequence has no observations".into()));
        }
        let dim = rows[0].len();
        if dim == 0 {
            return Err(HmmError::InvalidInput("observations have zero dimension".into()));
        }
        for row in rows {
            if row.len() != dim {
                return Err(HmmError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
        }

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((rows.len(), dim), flat)
            .map_err(|e| HmmError::InvalidInput(format!("bad sequence shape: {e}")))?;
        Ok(Self::new(data))
    }

    /// Attach a recording identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a ground-truth activity label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    /// True if the sequence holds no observations.
    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    /// Feature dimension.
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// Read-only view of the observation matrix.
    pub fn observations(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// One observation row.
    pub fn observation(&self, t: usize) -> ArrayView1<'_, f64> {
        self.data.row(t)
    }

    /// Recording identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Ground-truth label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_builds_matrix() {
        let seq = Sequence::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.dim(), 2);
        assert_eq!(seq.observation(1)[0], 3.0);
        assert!(!seq.is_empty());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let res = Sequence::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            res,
            Err(HmmError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(Sequence::from_rows(&[]).is_err());
        assert!(Sequence::from_rows(&[vec![]]).is_err());
    }

    #[test]
    fn id_and_label_attach() {
        let seq = Sequence::from_rows(&[vec![0.0]])
            .unwrap()
            .with_id("rene-running-01")
            .with_label("running");
        assert_eq!(seq.id(), Some("rene-running-01"));
        assert_eq!(seq.label(), Some("running"));
    }
}
