//! Dense numeric matrices exchanged with the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shape errors when building a matrix from a flat buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("buffer holds {len} elements but shape is {rows}x{cols}")]
    LengthMismatch { rows: usize, cols: usize, len: usize },
    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("a {rows}x{cols} matrix is not a vector")]
    NotAVector { rows: usize, cols: usize },
    #[error("a {rows}x{cols} matrix has no elements to carry its shape")]
    EmptyDimension { rows: usize, cols: usize },
}

/// `rows * cols`, or a length mismatch when the product overflows.
fn cell_count(rows: usize, cols: usize, len: usize) -> Result<usize, ShapeError> {
    rows.checked_mul(cols)
        .ok_or(ShapeError::LengthMismatch { rows, cols, len })
}

/// A dense `rows × cols` matrix stored row-major.
///
/// The `integer` flag is a hint for literal encoding: integral matrices are
/// emitted without fractional parts. It does not take part in equality.
/// Equality treats `NaN == NaN` so that values fetched back from the engine
/// compare equal to what was sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    integer: bool,
}

impl Matrix {
    /// Build from a row-major buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        if cell_count(rows, cols, data.len())? != data.len() {
            return Err(ShapeError::LengthMismatch {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            data,
            integer: false,
        })
    }

    /// Build from integer values; the result carries the integer hint.
    pub fn from_integers(rows: usize, cols: usize, values: &[i64]) -> Result<Self, ShapeError> {
        let data = values.iter().map(|&v| v as f64).collect();
        Ok(Self::new(rows, cols, data)?.with_integer(true))
    }

    /// Build from a list of rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ShapeError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(cell_count(rows.len(), cols, 0)?);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ShapeError::RaggedRow {
                    row: i,
                    expected: cols,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// A `len × 1` column vector.
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
            integer: false,
        }
    }

    /// A `1 × len` row vector.
    pub fn row(values: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values,
            integer: false,
        }
    }

    /// Build with `f(row, col)` for every cell.
    pub fn from_fn(
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Result<Self, ShapeError> {
        let mut data = Vec::with_capacity(cell_count(rows, cols, 0)?);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Ok(Self {
            rows,
            cols,
            data,
            integer: false,
        })
    }

    pub fn with_integer(mut self, integer: bool) -> Self {
        self.integer = integer;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_integer(&self) -> bool {
        self.integer
    }

    /// Row-major element buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Whether one dimension is 1.
    pub fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }

    /// Fails when one dimension is zero and the other is not.
    ///
    /// Such a matrix has no elements, so the engine would hand it back
    /// as `0 x 0`.
    pub fn check_shape_survives(&self) -> Result<(), ShapeError> {
        if self.is_empty() && self.rows + self.cols > 0 {
            Err(ShapeError::EmptyDimension {
                rows: self.rows,
                cols: self.cols,
            })
        } else {
            Ok(())
        }
    }

    /// Fails unless this matrix has a single row or a single column.
    pub fn check_vector(&self) -> Result<(), ShapeError> {
        if self.is_vector() {
            Ok(())
        } else {
            Err(ShapeError::NotAVector {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    /// Elements in column-major order, the engine's native storage order.
    pub fn column_major(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.cols).flat_map(move |c| (0..self.rows).map(move |r| self.data[r * self.cols + c]))
    }

    pub fn transpose(&self) -> Matrix {
        Matrix {
            rows: self.cols,
            cols: self.rows,
            data: self.column_major().collect(),
            integer: self.integer,
        }
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_length() {
        let err = Matrix::new(2, 2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::LengthMismatch {
                rows: 2,
                cols: 2,
                len: 3
            }
        );
    }

    #[test]
    fn oversized_shape_is_a_mismatch_not_a_panic() {
        let err = Matrix::new(usize::MAX, 2, vec![1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::LengthMismatch {
                rows: usize::MAX,
                cols: 2,
                len: 2
            }
        );
        assert!(Matrix::from_fn(usize::MAX, 3, |_, _| 0.0).is_err());
        assert!(Matrix::from_integers(2, usize::MAX, &[1]).is_err());
    }

    #[test]
    fn empty_dimension_shape_check() {
        let flat = Matrix::new(0, 3, vec![]).unwrap();
        assert_eq!(
            flat.check_shape_survives(),
            Err(ShapeError::EmptyDimension { rows: 0, cols: 3 })
        );
        assert!(Matrix::new(0, 0, vec![]).unwrap().check_shape_survives().is_ok());
        assert!(Matrix::column(vec![1.0]).check_shape_survives().is_ok());
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, ShapeError::RaggedRow { row: 1, .. }));
    }

    #[test]
    fn column_major_order() {
        let m = Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let cm: Vec<f64> = m.column_major().collect();
        assert_eq!(cm, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(m.transpose().as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn equality_ignores_integer_hint_and_matches_nan() {
        let a = Matrix::new(1, 2, vec![f64::NAN, 1.0]).unwrap();
        let b = Matrix::new(1, 2, vec![f64::NAN, 1.0]).unwrap().with_integer(true);
        assert_eq!(a, b);
        assert_ne!(a, Matrix::new(2, 1, vec![f64::NAN, 1.0]).unwrap());
    }

    #[test]
    fn vector_shape_check() {
        assert!(Matrix::column(vec![1.0, 2.0]).check_vector().is_ok());
        assert!(Matrix::row(vec![1.0, 2.0]).check_vector().is_ok());
        let square = Matrix::from_fn(2, 2, |r, c| (r + c) as f64).unwrap();
        assert_eq!(
            square.check_vector(),
            Err(ShapeError::NotAVector { rows: 2, cols: 2 })
        );
        assert_eq!(square.get(1, 1), Some(2.0));
        assert_eq!(square.get(2, 0), None);
    }
}
