//! Design matrices and ordinary least squares
//!
//! Columns are pushed by name. [`DesignMatrix::drop_aliased`] removes columns
//! that are linear combinations of earlier ones (modified Gram-Schmidt), so an
//! over-parameterized formula still yields a full-rank fit.

use nalgebra::{DMatrix, DVector};

use crate::{Error, Result};

/// Relative tolerance under which a column is considered aliased.
const ALIAS_TOLERANCE: f64 = 1e-9;

/// Named columns of a model matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl DesignMatrix {
    /// Empty matrix with `n_rows` observations.
    #[must_use]
    pub const fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Append a column. Columns of the wrong length are ignored with a warning.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        if values.len() != self.n_rows {
            tracing::warn!(column = %name, expected = self.n_rows, got = values.len(), "design column length mismatch");
            return;
        }
        self.names.push(name);
        self.columns.push(values);
    }

    /// Observations
    #[must_use]
    pub const fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names, in order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Remove columns in the span of earlier ones; returns the dropped names.
    pub fn drop_aliased(&mut self) -> Vec<String> {
        let mut basis: Vec<Vec<f64>> = Vec::new();
        let mut keep = Vec::with_capacity(self.columns.len());

        for column in &self.columns {
            let norm0 = dot(column, column).sqrt();
            let mut residual = column.clone();
            for q in &basis {
                let proj = dot(&residual, q);
                for (r, qv) in residual.iter_mut().zip(q) {
                    *r -= proj * qv;
                }
            }
            let norm = dot(&residual, &residual).sqrt();
            if norm0 > 0.0 && norm > ALIAS_TOLERANCE * norm0.max(1.0) {
                basis.push(residual.iter().map(|v| v / norm).collect());
                keep.push(true);
            } else {
                keep.push(false);
            }
        }

        let mut dropped = Vec::new();
        let mut names = Vec::new();
        let mut columns = Vec::new();
        for ((name, column), kept) in self.names.drain(..).zip(self.columns.drain(..)).zip(keep) {
            if kept {
                names.push(name);
                columns.push(column);
            } else {
                dropped.push(name);
            }
        }
        self.names = names;
        self.columns = columns;
        dropped
    }

    /// Row `i` as a vector.
    #[must_use]
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }

    /// Dense nalgebra matrix (rows × columns).
    #[must_use]
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n_rows, self.columns.len(), |i, j| self.columns[j][i])
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Least-squares fit of `y` on the design, after dropping aliased columns.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Terms that were estimated
    pub names: Vec<String>,
    /// Coefficient estimates
    pub coefficients: Vec<f64>,
    /// y − Xβ
    pub residuals: Vec<f64>,
}

/// Fit `y = Xβ + ε` by least squares.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] on a length mismatch, an empty design, or
/// when there are no residual degrees of freedom.
pub fn ols(design: &DesignMatrix, y: &[f64]) -> Result<OlsFit> {
    if y.len() != design.n_rows() {
        return Err(Error::InvalidInput(format!(
            "response has {} rows, design has {}",
            y.len(),
            design.n_rows()
        )));
    }
    let mut design = design.clone();
    design.drop_aliased();
    let p = design.n_cols();
    if p == 0 {
        return Err(Error::InvalidInput("design matrix has no usable columns".to_string()));
    }
    if y.len() <= p {
        return Err(Error::InvalidInput(format!(
            "{} observations cannot fit {p} parameters",
            y.len()
        )));
    }

    let x = design.to_matrix();
    let yv = DVector::from_column_slice(y);
    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &yv;
    let beta = xtx
        .cholesky()
        .ok_or_else(|| Error::InvalidInput("normal equations are not positive definite".to_string()))?
        .solve(&xty);
    let residuals = &yv - &x * &beta;

    Ok(OlsFit {
        names: design.names().to_vec(),
        coefficients: beta.iter().copied().collect(),
        residuals: residuals.iter().copied().collect(),
    })
}

/// Residuals of the least-squares fit.
///
/// # Errors
///
/// See [`ols`].
pub fn ols_residuals(design: &DesignMatrix, y: &[f64]) -> Result<Vec<f64>> {
    ols(design, y).map(|fit| fit.residuals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_aliased_removes_dependent_column() {
        let mut d = DesignMatrix::new(4);
        d.push_column("Intercept", vec![1.0; 4]);
        d.push_column("a", vec![1.0, 0.0, 1.0, 0.0]);
        d.push_column("b", vec![0.0, 1.0, 0.0, 1.0]);
        let dropped = d.drop_aliased();
        assert_eq!(dropped, vec!["b".to_string()]);
        assert_eq!(d.names(), ["Intercept".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_drop_aliased_removes_zero_column() {
        let mut d = DesignMatrix::new(3);
        d.push_column("Intercept", vec![1.0; 3]);
        d.push_column("never", vec![0.0; 3]);
        assert_eq!(d.drop_aliased(), vec!["never".to_string()]);
    }

    #[test]
    fn test_ols_recovers_line() {
        let mut d = DesignMatrix::new(5);
        d.push_column("Intercept", vec![1.0; 5]);
        d.push_column("x", vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = [1.0, 3.0, 5.0, 7.0, 9.0];
        let fit = ols(&d, &y).unwrap();
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-9);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-9);
        assert!(fit.residuals.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn test_ols_rejects_saturated_model() {
        let mut d = DesignMatrix::new(2);
        d.push_column("Intercept", vec![1.0; 2]);
        d.push_column("x", vec![0.0, 1.0]);
        assert!(ols(&d, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_length_mismatch_is_ignored() {
        let mut d = DesignMatrix::new(3);
        d.push_column("short", vec![1.0]);
        assert_eq!(d.n_cols(), 0);
    }
}
