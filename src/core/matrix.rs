//! Dense row-major matrix of `f32` used for parameter values and gradients.

use crate::core::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A dense matrix of single-precision floats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    /// Number of rows
    rows: usize,
    /// Number of columns
    cols: usize,
    /// Row-major values
    data: Vec<f32>,
}

impl Matrix {
    /// Create a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a matrix filled with a constant.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a matrix from row-major data.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                expected: (rows, cols),
                got: (1, data.len()),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a matrix with values drawn uniformly from `[-bound, bound)`.
    pub fn random_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, bound: f32, rng: &mut R) -> Self {
        let data = (0..rows * cols)
            .map(|_| if bound > 0.0 { rng.gen_range(-bound..bound) } else { 0.0 })
            .collect();
        Self { rows, cols, data }
    }

    /// Shape as `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at `(row, col)`, if in bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// `self += other`, in place.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<()> {
        self.check_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// `self -= alpha * other`, in place.
    pub fn sub_scaled_assign(&mut self, other: &Matrix, alpha: f32) -> Result<()> {
        self.check_shape(other)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a -= alpha * b;
        }
        Ok(())
    }

    /// Divide every element by `divisor`, in place.
    pub fn div_scalar_assign(&mut self, divisor: f32) {
        for v in &mut self.data {
            *v /= divisor;
        }
    }

    /// A new matrix with every element multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    fn check_shape(&self, other: &Matrix) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape(),
                got: other.shape(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zeros() {
        let m = Matrix::zeros(2, 3);
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m.len(), 6);
        assert!(m.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).is_ok());
        let err = Matrix::from_vec(2, 2, vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_get_is_row_major() {
        let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(0, 1), Some(2.0));
        assert_eq!(m.get(1, 0), Some(3.0));
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_add_assign() {
        let mut a = Matrix::filled(1, 2, 1.0);
        a.add_assign(&Matrix::filled(1, 2, 2.5)).unwrap();
        assert_eq!(a.as_slice(), &[3.5, 3.5]);
    }

    #[test]
    fn test_add_assign_shape_mismatch() {
        let mut a = Matrix::zeros(2, 2);
        let err = a.add_assign(&Matrix::zeros(3, 1)).unwrap_err();
        assert_eq!(
            err,
            Error::ShapeMismatch {
                expected: (2, 2),
                got: (3, 1)
            }
        );
        assert_eq!(a, Matrix::zeros(2, 2));
    }

    #[test]
    fn test_sub_scaled_and_div() {
        let mut a = Matrix::filled(1, 1, 1.0);
        a.sub_scaled_assign(&Matrix::filled(1, 1, 2.0), 0.25).unwrap();
        assert!((a.as_slice()[0] - 0.5).abs() < 1e-6);

        a.div_scalar_assign(2.0);
        assert!((a.as_slice()[0] - 0.25).abs() < 1e-6);
        assert_eq!(a.scaled(4.0).as_slice(), &[1.0]);
    }

    #[test]
    fn test_random_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = Matrix::random_uniform(4, 4, 0.1, &mut rng);
        assert!(m.as_slice().iter().all(|v| v.abs() <= 0.1));
    }
}
