//! Standard errors and significance of estimated model parameters.

use crate::utils::ols::invert_symmetric;
use crate::utils::stats::two_sided_p_value;
use serde::Serialize;

/// One row of a parameter estimates table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterEstimate {
    #[serde(rename = "_PARM_")]
    pub name: String,
    #[serde(rename = "_EST_")]
    pub estimate: f64,
    #[serde(rename = "_STDERR_")]
    pub std_err: f64,
    #[serde(rename = "_TVALUE_")]
    pub t_value: f64,
    #[serde(rename = "_PVALUE_")]
    pub p_value: f64,
}

impl ParameterEstimate {
    /// Estimate without an available standard error.
    pub fn point(name: impl Into<String>, estimate: f64) -> Self {
        Self::with_std_err(name, estimate, f64::NAN, 0)
    }

    /// Estimate with a standard error; t and p values follow from `df`.
    pub fn with_std_err(name: impl Into<String>, estimate: f64, std_err: f64, df: usize) -> Self {
        let t_value = if std_err.is_finite() && std_err > 0.0 {
            estimate / std_err
        } else {
            f64::NAN
        };
        Self {
            name: name.into(),
            estimate,
            std_err,
            t_value,
            p_value: two_sided_p_value(t_value, df),
        }
    }
}

fn step_size(x: f64) -> f64 {
    1e-5 * x.abs().max(1e-2)
}

/// Estimates for a least-squares fit, `cov = σ²·(JᵀJ)⁻¹`.
///
/// `residuals` maps a parameter vector to its residual vector; missing
/// residuals are ignored. The Jacobian is taken by central differences at
/// `theta`. Standard errors are `NaN` when `JᵀJ` is singular.
pub fn least_squares_estimates<F>(
    names: &[String],
    theta: &[f64],
    sigma2: f64,
    residuals: F,
) -> Vec<ParameterEstimate>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let k = theta.len();
    let base = residuals(theta);
    let n = base.len();

    let mut jacobian = vec![vec![0.0; k]; n];
    for j in 0..k {
        let h = step_size(theta[j]);
        let mut up = theta.to_vec();
        let mut down = theta.to_vec();
        up[j] += h;
        down[j] -= h;
        let r_up = residuals(&up);
        let r_down = residuals(&down);
        for t in 0..n {
            let (a, b) = (r_up.get(t).copied(), r_down.get(t).copied());
            jacobian[t][j] = match (a, b) {
                (Some(a), Some(b)) => (a - b) / (2.0 * h),
                _ => f64::NAN,
            };
        }
    }

    let rows: Vec<&Vec<f64>> = jacobian
        .iter()
        .zip(&base)
        .filter(|(row, r)| r.is_finite() && row.iter().all(|v| v.is_finite()))
        .map(|(row, _)| row)
        .collect();

    let mut jtj = vec![vec![0.0; k]; k];
    for row in &rows {
        for a in 0..k {
            for b in 0..k {
                jtj[a][b] += row[a] * row[b];
            }
        }
    }

    let df = rows.len().saturating_sub(k);
    let covariance = invert_symmetric(&jtj);
    build(names, theta, df, |j| {
        covariance
            .as_ref()
            .map_or(f64::NAN, |c| (sigma2 * c[j][j]).max(0.0).sqrt())
    })
}

/// Estimates for a maximum likelihood fit, `cov = H⁻¹` of the negative
/// log-likelihood `neg_loglik` at `theta`.
pub fn likelihood_estimates<F>(
    names: &[String],
    theta: &[f64],
    nobs: usize,
    neg_loglik: F,
) -> Vec<ParameterEstimate>
where
    F: Fn(&[f64]) -> f64,
{
    let k = theta.len();
    let f0 = neg_loglik(theta);
    let mut hessian = vec![vec![0.0; k]; k];

    for i in 0..k {
        let hi = step_size(theta[i]);
        for j in i..k {
            let hj = step_size(theta[j]);
            let value = if i == j {
                let mut up = theta.to_vec();
                let mut down = theta.to_vec();
                up[i] += hi;
                down[i] -= hi;
                (neg_loglik(&up) - 2.0 * f0 + neg_loglik(&down)) / (hi * hi)
            } else {
                let eval = |si: f64, sj: f64| {
                    let mut x = theta.to_vec();
                    x[i] += si * hi;
                    x[j] += sj * hj;
                    neg_loglik(&x)
                };
                (eval(1.0, 1.0) - eval(1.0, -1.0) - eval(-1.0, 1.0) + eval(-1.0, -1.0))
                    / (4.0 * hi * hj)
            };
            hessian[i][j] = value;
            hessian[j][i] = value;
        }
    }

    let finite = hessian.iter().flatten().all(|v| v.is_finite());
    let covariance = if finite {
        invert_symmetric(&hessian)
    } else {
        None
    };
    build(names, theta, nobs.saturating_sub(k), |j| {
        covariance
            .as_ref()
            .map_or(f64::NAN, |c| c[j][j].max(0.0).sqrt())
    })
}

fn build<S>(names: &[String], theta: &[f64], df: usize, std_err: S) -> Vec<ParameterEstimate>
where
    S: Fn(usize) -> f64,
{
    names
        .iter()
        .zip(theta)
        .enumerate()
        .map(|(j, (name, &est))| ParameterEstimate::with_std_err(name.clone(), est, std_err(j), df))
        .collect()
}
