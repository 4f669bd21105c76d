//! Regression with seasonal ARIMA errors (ARIMAX).
//!
//! `y_t = x_tᵀβ + u_t` where the error `u_t` follows a multiplicative
//! seasonal ARIMA process:
//! `φ(B)Φ(B^s)(∇^d ∇_s^D u_t - μ) = θ(B)Θ(B^s)e_t`.
//! All coefficients, including `β`, are estimated jointly by conditional
//! sum of squares with Nelder-Mead, starting from OLS on the differenced
//! data.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::arima::diff::{
    ar_polynomial, differencing_polynomial, is_invertible, is_stationary, ma_polynomial,
    multiply,
};
use crate::models::traits::residuals_of;
use crate::models::{Component, Forecaster};
use crate::utils::estimates::least_squares_estimates;
use crate::utils::ols::ols_fit;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::ParameterEstimate;
use serde::{Deserialize, Serialize};

/// Orders of a seasonal ARIMA error process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    #[serde(default)]
    pub seasonal_p: usize,
    #[serde(default)]
    pub seasonal_d: usize,
    #[serde(default)]
    pub seasonal_q: usize,
    /// Seasonal period, ignored when all seasonal orders are zero.
    #[serde(default)]
    pub period: usize,
    /// Estimate a mean for the differenced series.
    #[serde(default)]
    pub intercept: bool,
}

impl ArimaOrder {
    /// Non-seasonal order; the intercept is estimated only without
    /// differencing.
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            period: 0,
            intercept: d == 0,
        }
    }

    /// Add seasonal orders; the intercept is re-derived from total
    /// differencing.
    pub fn with_seasonal(mut self, p: usize, d: usize, q: usize, period: usize) -> Self {
        self.seasonal_p = p;
        self.seasonal_d = d;
        self.seasonal_q = q;
        self.period = period;
        self.intercept = self.d + d == 0;
        self
    }

    pub fn with_intercept(mut self, intercept: bool) -> Self {
        self.intercept = intercept;
        self
    }

    pub fn is_seasonal(&self) -> bool {
        self.period > 1 && self.seasonal_p + self.seasonal_d + self.seasonal_q > 0
    }

    fn season(&self) -> usize {
        if self.is_seasonal() {
            self.period
        } else {
            0
        }
    }

    /// Observations consumed by differencing.
    pub fn differencing_lags(&self) -> usize {
        self.d + self.season() * self.seasonal_d
    }

    /// Highest lag of the expanded autoregressive polynomial.
    fn ar_lags(&self) -> usize {
        self.p + self.season() * self.seasonal_p
    }

    fn arma_params(&self) -> usize {
        let seasonal = if self.is_seasonal() {
            self.seasonal_p + self.seasonal_q
        } else {
            0
        };
        self.p + self.q + seasonal
    }

    /// Label such as `ARIMA(1,1,1)` or `ARIMA(0,1,1)(0,1,1)12`.
    pub fn label(&self) -> String {
        let mut label = format!("ARIMA({},{},{})", self.p, self.d, self.q);
        if self.is_seasonal() {
            label.push_str(&format!(
                "({},{},{}){}",
                self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
            ));
        }
        if self.intercept {
            label.push_str(" with mean");
        }
        label
    }
}

/// Coefficient vector split into its blocks.
struct Coefficients<'a> {
    ar: &'a [f64],
    sar: &'a [f64],
    ma: &'a [f64],
    sma: &'a [f64],
    mu: f64,
    beta: &'a [f64],
}

impl<'a> Coefficients<'a> {
    fn split(order: &ArimaOrder, theta: &'a [f64]) -> Self {
        let (sp, sq) = if order.is_seasonal() {
            (order.seasonal_p, order.seasonal_q)
        } else {
            (0, 0)
        };
        let (ar, rest) = theta.split_at(order.p);
        let (sar, rest) = rest.split_at(sp);
        let (ma, rest) = rest.split_at(order.q);
        let (sma, rest) = rest.split_at(sq);
        let (mu, beta) = if order.intercept {
            (rest[0], &rest[1..])
        } else {
            (0.0, rest)
        };
        Self {
            ar,
            sar,
            ma,
            sma,
            mu,
            beta,
        }
    }

    fn admissible(&self) -> bool {
        is_stationary(self.ar)
            && is_stationary(self.sar)
            && is_invertible(self.ma)
            && is_invertible(self.sma)
    }

    /// Expanded `φ(B)Φ(B^s)` and `θ(B)Θ(B^s)`.
    fn polynomials(&self, period: usize) -> (Vec<f64>, Vec<f64>) {
        let ar = multiply(&ar_polynomial(self.ar, 1), &ar_polynomial(self.sar, period));
        let ma = multiply(&ma_polynomial(self.ma, 1), &ma_polynomial(self.sma, period));
        (ar, ma)
    }
}

/// Regression errors `y - Xβ`.
fn regression_errors(y: &[f64], x: &[&[f64]], beta: &[f64]) -> Vec<f64> {
    (0..y.len())
        .map(|t| y[t] - x.iter().zip(beta).map(|(col, b)| col[t] * b).sum::<f64>())
        .collect()
}

/// Conditional one-step residuals, `NaN` before the recursion can start.
fn css_residuals(order: &ArimaOrder, y: &[f64], x: &[&[f64]], theta: &[f64]) -> Vec<f64> {
    let coef = Coefficients::split(order, theta);
    let (ar, ma) = coef.polynomials(order.season());
    let delta = differencing_polynomial(order.d, order.seasonal_d, order.season());
    let u = regression_errors(y, x, coef.beta);
    let n = y.len();
    let lags = order.differencing_lags();
    let start = lags + order.ar_lags();

    let mut w = vec![0.0; n];
    for t in lags..n {
        w[t] = delta.iter().enumerate().map(|(i, c)| c * u[t - i]).sum::<f64>() - coef.mu;
    }

    let mut e = vec![f64::NAN; n];
    for t in start..n {
        let mut value = w[t];
        for (i, c) in ar.iter().enumerate().skip(1) {
            value += c * w[t - i];
        }
        for (j, c) in ma.iter().enumerate().skip(1) {
            if t >= start + j {
                value -= c * e[t - j];
            }
        }
        e[t] = value;
    }
    e
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| v * v)
        .sum()
}

/// Regression with seasonal ARIMA errors.
///
/// # Example
/// ```
/// use anofox_autoforecast::core::{GroupKey, Interval, TimeSeries};
/// use anofox_autoforecast::models::arima::{ArimaOrder, Arimax};
/// use anofox_autoforecast::models::Forecaster;
/// use chrono::{TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
/// let values = vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5];
/// let ts = TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, values).unwrap();
///
/// let mut model = Arimax::new(ArimaOrder::new(1, 1, 1));
/// model.fit(&ts).unwrap();
/// let forecast = model.predict(12).unwrap();
/// assert_eq!(forecast.horizon(), 12);
/// ```
#[derive(Debug, Clone)]
pub struct Arimax {
    order: ArimaOrder,
    name: String,
    theta: Option<Vec<f64>>,
    regressor_names: Vec<String>,
    /// Full regressor values, history and future.
    regressors: Vec<Vec<f64>>,
    sigma2: f64,
    /// `φ*(B) = φ(B)Φ(B^s)∇^d∇_s^D`, lag 0 included.
    integrated_ar: Vec<f64>,
    ma: Vec<f64>,
    constant: f64,
    /// Regression errors over the history.
    errors: Vec<f64>,
    /// Innovations over the history, zero where undefined.
    innovations: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    regression: Option<Vec<f64>>,
    estimates: Vec<ParameterEstimate>,
}

impl Arimax {
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            order,
            name: order.label(),
            theta: None,
            regressor_names: Vec::new(),
            regressors: Vec::new(),
            sigma2: f64::NAN,
            integrated_ar: Vec::new(),
            ma: Vec::new(),
            constant: 0.0,
            errors: Vec::new(),
            innovations: Vec::new(),
            fitted: None,
            residuals: None,
            regression: None,
            estimates: Vec::new(),
        }
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Estimated coefficients in the order AR, SAR, MA, SMA, MU, inputs.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.theta.as_deref()
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Akaike information criterion on the conditional residuals.
    pub fn aic(&self) -> Option<f64> {
        let residuals = self.residuals.as_ref()?;
        let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let n = finite.len() as f64;
        let mse = (sum_of_squares(&finite) / n).max(1e-12);
        Some(n * mse.ln() + 2.0 * self.num_params() as f64)
    }

    fn parameter_names(&self) -> Vec<String> {
        let order = &self.order;
        let mut names = Vec::new();
        names.extend((1..=order.p).map(|i| format!("AR{i}")));
        if order.is_seasonal() {
            names.extend((1..=order.seasonal_p).map(|i| format!("SAR{i}")));
        }
        names.extend((1..=order.q).map(|i| format!("MA{i}")));
        if order.is_seasonal() {
            names.extend((1..=order.seasonal_q).map(|i| format!("SMA{i}")));
        }
        if order.intercept {
            names.push("MU".to_string());
        }
        names.extend(self.regressor_names.iter().cloned());
        names
    }

    fn initial_theta(&self, y: &[f64], x: &[&[f64]]) -> Result<Vec<f64>> {
        let order = &self.order;
        let delta = differencing_polynomial(order.d, order.seasonal_d, order.season());
        let apply = |values: &[f64]| -> Vec<f64> {
            (order.differencing_lags()..values.len())
                .map(|t| delta.iter().enumerate().map(|(i, c)| c * values[t - i]).sum())
                .collect()
        };

        let dy = apply(y);
        let dx: Vec<Vec<f64>> = x.iter().map(|col| apply(&col[..y.len()])).collect();
        let dx_refs: Vec<&[f64]> = dx.iter().map(|c| c.as_slice()).collect();
        let ols = ols_fit(&dy, &dx_refs, order.intercept)?;

        let mut theta = vec![0.0; order.arma_params()];
        if order.intercept {
            theta.push(ols.intercept);
        }
        theta.extend(ols.coefficients);
        Ok(theta)
    }
}

impl Forecaster for Arimax {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let y = series.values();
        if y.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if series.has_missing_values() {
            return Err(ForecastError::MissingValues);
        }
        if self.order.is_seasonal() && self.order.period != series.season_length() {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal period {} does not match season length {}",
                self.order.period,
                series.season_length()
            )));
        }

        self.regressor_names = series.regressors().iter().map(|r| r.name.clone()).collect();
        self.regressors = series.regressors().iter().map(|r| r.values.clone()).collect();
        let x = series.regressor_history();

        let k = self.order.arma_params() + usize::from(self.order.intercept) + x.len();
        let needed = self.order.differencing_lags() + self.order.ar_lags() + k + 1;
        if y.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: y.len(),
            });
        }

        let initial = self.initial_theta(y, &x)?;
        let order = self.order;
        let objective = |theta: &[f64]| {
            if !Coefficients::split(&order, theta).admissible() {
                return f64::INFINITY;
            }
            sum_of_squares(&css_residuals(&order, y, &x, theta))
        };
        let result = nelder_mead(
            objective,
            &initial,
            None,
            NelderMeadConfig {
                max_iter: 2000,
                initial_step: 0.1,
                restarts: 2,
                ..Default::default()
            },
        );
        if !result.optimal_value.is_finite() {
            return Err(ForecastError::ComputationError(
                "no admissible ARMA coefficients found".to_string(),
            ));
        }
        let theta = result.optimal_point;

        let e = css_residuals(&order, y, &x, &theta);
        let nobs = e.iter().filter(|v| !v.is_nan()).count();
        let sigma2 = sum_of_squares(&e) / nobs.saturating_sub(k).max(1) as f64;

        let coef = Coefficients::split(&order, &theta);
        let (ar, ma) = coef.polynomials(order.season());
        let delta = differencing_polynomial(order.d, order.seasonal_d, order.season());
        self.constant = coef.mu * ar.iter().sum::<f64>();
        self.integrated_ar = multiply(&ar, &delta);
        self.ma = ma;
        self.errors = regression_errors(y, &x, coef.beta);
        let regression: Vec<f64> = y.iter().zip(&self.errors).map(|(a, u)| a - u).collect();

        let fitted: Vec<f64> = y
            .iter()
            .zip(&e)
            .map(|(a, r)| if r.is_nan() { f64::NAN } else { a - r })
            .collect();
        self.residuals = Some(residuals_of(y, &fitted));
        self.innovations = e.iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect();
        self.fitted = Some(fitted);
        self.regression = (!x.is_empty()).then_some(regression);
        self.sigma2 = sigma2;

        let names = self.parameter_names();
        self.estimates = least_squares_estimates(&names, &theta, sigma2, |t| {
            css_residuals(&order, y, &x, t)
        });
        self.theta = Some(theta);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let theta = self.theta.as_deref().ok_or(ForecastError::FitRequired)?;
        let beta = Coefficients::split(&self.order, theta).beta;
        let n = self.errors.len();

        for (name, values) in self.regressor_names.iter().zip(&self.regressors) {
            if values.len() < n + horizon {
                return Err(ForecastError::InvalidParameter(format!(
                    "regressor '{name}' has no future values for {horizon} steps"
                )));
            }
        }

        let mut u = self.errors.clone();
        let mut e = self.innovations.clone();
        let mut point = Vec::with_capacity(horizon);
        for h in 0..horizon {
            let t = n + h;
            let mut value = self.constant;
            for (i, c) in self.integrated_ar.iter().enumerate().skip(1) {
                if i <= t {
                    value -= c * u[t - i];
                }
            }
            for (j, c) in self.ma.iter().enumerate().skip(1) {
                if j <= t {
                    value += c * e[t - j];
                }
            }
            u.push(value);
            e.push(0.0);
            let regression: f64 = self
                .regressors
                .iter()
                .zip(beta)
                .map(|(values, b)| values[t] * b)
                .sum();
            point.push(value + regression);
        }

        // ψ-weights of θ*(B) / φ*(B)
        let mut psi = vec![1.0; horizon.max(1)];
        for j in 1..horizon {
            let mut value = self.ma.get(j).copied().unwrap_or(0.0);
            for i in 1..=j.min(self.integrated_ar.len() - 1) {
                value -= self.integrated_ar[i] * psi[j - i];
            }
            psi[j] = value;
        }
        let mut cumulative = 0.0;
        let std: Vec<f64> = psi
            .iter()
            .take(horizon)
            .map(|p| {
                cumulative += p * p;
                (self.sigma2 * cumulative).sqrt()
            })
            .collect();

        Forecast::from_values_with_std(point, std)
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn num_params(&self) -> usize {
        self.order.arma_params() + usize::from(self.order.intercept) + self.regressor_names.len()
    }

    fn parameters(&self) -> Vec<ParameterEstimate> {
        self.estimates.clone()
    }

    fn components(&self) -> Vec<Component> {
        match &self.regression {
            Some(values) => vec![Component::new("REGRESSION", values.clone())],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GroupKey, Interval, Regressor, RegressorKind};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn yearly(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, values).unwrap()
    }

    fn ar1(n: usize, phi: f64) -> Vec<f64> {
        let mut state: u64 = 42;
        let mut value = 0.0;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let noise = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
                value = phi * value + noise;
                10.0 + value
            })
            .collect()
    }

    #[test]
    fn labels_describe_the_order() {
        assert_eq!(ArimaOrder::new(1, 1, 1).label(), "ARIMA(1,1,1)");
        assert_eq!(ArimaOrder::new(2, 0, 0).label(), "ARIMA(2,0,0) with mean");
        assert_eq!(
            ArimaOrder::new(0, 1, 1).with_seasonal(0, 1, 1, 12).label(),
            "ARIMA(0,1,1)(0,1,1)12"
        );
        assert!(!ArimaOrder::new(1, 0, 0).with_seasonal(0, 0, 0, 12).is_seasonal());
    }

    #[test]
    fn revenue_series_forecasts_twelve_finite_steps() {
        let ts = yearly(vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5]);
        let mut model = Arimax::new(ArimaOrder::new(1, 1, 1));
        model.fit(&ts).unwrap();

        let forecast = model.predict_with_intervals(12, 0.95).unwrap();
        assert_eq!(forecast.horizon(), 12);
        for i in 0..12 {
            assert!(forecast.point()[i].is_finite());
            assert!(forecast.std().unwrap()[i] > 0.0);
            assert!(forecast.lower().unwrap()[i] < forecast.upper().unwrap()[i]);
        }
        let std = forecast.std().unwrap();
        assert!(std.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        assert_eq!(model.parameters().len(), 2);
        let fitted = model.fitted_values().unwrap();
        assert!(fitted[0].is_nan() && fitted[1].is_nan() && fitted[2].is_finite());
    }

    #[test]
    fn recovers_ar_coefficient() {
        let ts = yearly(ar1(300, 0.7));
        let mut model = Arimax::new(ArimaOrder::new(1, 0, 0));
        model.fit(&ts).unwrap();
        let coef = model.coefficients().unwrap();
        assert_relative_eq!(coef[0], 0.7, epsilon = 0.1);
        assert_relative_eq!(coef[1], 10.0, epsilon = 0.2);
        assert!(model.aic().unwrap().is_finite());
    }

    #[test]
    fn random_walk_forecast_is_flat_with_growing_std() {
        let ts = yearly(vec![3.0, 4.0, 2.0, 5.0, 6.0, 4.0, 5.0]);
        let mut model = Arimax::new(ArimaOrder::new(0, 1, 0));
        model.fit(&ts).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.point(), &[5.0, 5.0, 5.0]);
        let std = forecast.std().unwrap();
        assert_relative_eq!(std[1] / std[0], 2f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(std[2] / std[0], 3f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn regression_coefficient_is_estimated_and_used() {
        let x: Vec<f64> = (0..45).map(|i| ((i * 7) % 5) as f64).collect();
        let noise = ar1(40, 0.3);
        let y: Vec<f64> = (0..40).map(|i| noise[i] + 3.0 * x[i]).collect();
        let ts = yearly(y)
            .with_regressor(Regressor::new("PRICE", RegressorKind::Input, x.clone()))
            .unwrap();

        let mut model = Arimax::new(ArimaOrder::new(1, 0, 0));
        model.fit(&ts).unwrap();
        let coef = model.coefficients().unwrap();
        assert_relative_eq!(coef[2], 3.0, epsilon = 0.1);
        assert_eq!(model.parameters()[2].name, "PRICE");
        assert_eq!(model.predict(5).unwrap().horizon(), 5);
        assert!(model.predict(6).is_err());
    }

    #[test]
    fn missing_values_and_short_series_are_rejected() {
        let mut model = Arimax::new(ArimaOrder::new(1, 1, 1));
        assert!(matches!(
            model.fit(&yearly(vec![1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0])),
            Err(ForecastError::MissingValues)
        ));
        assert!(matches!(
            model.fit(&yearly(vec![1.0, 2.0, 3.0])),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
