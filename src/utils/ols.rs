//! Ordinary least squares and small dense solves.
//!
//! Used to initialise regression coefficients of ARIMAX models and to invert
//! the normal matrix when estimating parameter standard errors.

use crate::error::{ForecastError, Result};

/// OLS regression coefficients and intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct OLSResult {
    /// Intercept term, zero when fitted without one.
    pub intercept: f64,
    /// Regression coefficients, one per column.
    pub coefficients: Vec<f64>,
}

impl OLSResult {
    /// Predict `intercept + Σ coef_i · x_i` for each row of the columns.
    pub fn predict(&self, columns: &[&[f64]]) -> Result<Vec<f64>> {
        if columns.len() != self.coefficients.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.coefficients.len(),
                got: columns.len(),
            });
        }
        let n = columns.first().map_or(0, |c| c.len());
        let mut predictions = vec![self.intercept; n];
        for (coef, column) in self.coefficients.iter().zip(columns) {
            if column.len() != n {
                return Err(ForecastError::DimensionMismatch {
                    expected: n,
                    got: column.len(),
                });
            }
            for (pred, x) in predictions.iter_mut().zip(column.iter()) {
                *pred += coef * x;
            }
        }
        Ok(predictions)
    }
}

/// Fit `y = intercept + X·β` by solving the normal equations.
///
/// Rows where `y` or any column is missing are skipped.
pub fn ols_fit(y: &[f64], columns: &[&[f64]], intercept: bool) -> Result<OLSResult> {
    for column in columns {
        if column.len() < y.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: y.len(),
                got: column.len(),
            });
        }
    }

    let offset = usize::from(intercept);
    let k = columns.len() + offset;
    if k == 0 {
        return Ok(OLSResult {
            intercept: 0.0,
            coefficients: vec![],
        });
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    let mut rows = 0;
    let mut row = vec![0.0; k];

    for t in 0..y.len() {
        if !y[t].is_finite() || columns.iter().any(|c| !c[t].is_finite()) {
            continue;
        }
        if intercept {
            row[0] = 1.0;
        }
        for (j, column) in columns.iter().enumerate() {
            row[j + offset] = column[t];
        }
        for i in 0..k {
            xty[i] += row[i] * y[t];
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
        rows += 1;
    }

    if rows < k {
        return Err(ForecastError::InsufficientData {
            needed: k,
            got: rows,
        });
    }

    // Ridge term keeps collinear designs solvable.
    for (i, r) in xtx.iter_mut().enumerate() {
        r[i] += 1e-8;
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        ForecastError::ComputationError("OLS normal matrix is not positive definite".into())
    })?;

    Ok(if intercept {
        OLSResult {
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
        }
    } else {
        OLSResult {
            intercept: 0.0,
            coefficients: beta,
        }
    })
}

fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        if a[i].len() != n {
            return None;
        }
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * y[j]).sum();
        y[i] = (b[i] - sum) / l[i][i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (y[i] - sum) / l[i][i];
    }
    x
}

/// Solve `A·x = b` for symmetric positive definite `A`.
pub fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    if b.is_empty() || a.len() != b.len() {
        return None;
    }
    let l = cholesky(a)?;
    Some(cholesky_solve(&l, b))
}

/// Inverse of a symmetric positive definite matrix.
pub fn invert_symmetric(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    if n == 0 {
        return Some(vec![]);
    }
    let l = cholesky(a)?;
    let mut inverse = vec![vec![0.0; n]; n];
    for col in 0..n {
        let mut e = vec![0.0; n];
        e[col] = 1.0;
        let x = cholesky_solve(&l, &e);
        for row in 0..n {
            inverse[row][col] = x[row];
        }
    }
    Some(inverse)
}
