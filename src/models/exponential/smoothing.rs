//! Exponential smoothing in its component form.
//!
//! One recursion covers all methods: a level, an optional (possibly
//! damped) trend and an optional additive or multiplicative seasonal
//! factor. Smoothing weights are estimated by minimising the one-step
//! sum of squared errors with Nelder-Mead.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{residual_variance, residuals_of};
use crate::models::{Component, Forecaster};
use crate::utils::estimates::least_squares_estimates;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::ParameterEstimate;
use serde::{Deserialize, Serialize};

const WEIGHT_BOUNDS: (f64, f64) = (0.001, 0.999);
const DAMPING_BOUNDS: (f64, f64) = (0.8, 0.98);

/// Exponential smoothing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsmMethod {
    /// Level only.
    Simple,
    /// Brown's double smoothing, one weight for level and trend.
    Double,
    /// Holt's linear trend.
    Linear,
    /// Damped trend.
    Damped,
    /// Level with additive seasonal factors.
    Seasonal,
    /// Additive Holt-Winters.
    Winters,
    /// Multiplicative Holt-Winters, positive series only.
    MultiplicativeWinters,
}

impl EsmMethod {
    /// Every method, in the order they are tried by best-method search.
    pub const ALL: [EsmMethod; 7] = [
        EsmMethod::Simple,
        EsmMethod::Double,
        EsmMethod::Linear,
        EsmMethod::Damped,
        EsmMethod::Seasonal,
        EsmMethod::Winters,
        EsmMethod::MultiplicativeWinters,
    ];

    pub fn has_trend(self) -> bool {
        matches!(
            self,
            EsmMethod::Double
                | EsmMethod::Linear
                | EsmMethod::Damped
                | EsmMethod::Winters
                | EsmMethod::MultiplicativeWinters
        )
    }

    pub fn is_seasonal(self) -> bool {
        matches!(
            self,
            EsmMethod::Seasonal | EsmMethod::Winters | EsmMethod::MultiplicativeWinters
        )
    }

    pub fn is_multiplicative(self) -> bool {
        self == EsmMethod::MultiplicativeWinters
    }

    /// Label used in the model information tables.
    pub fn label(self) -> &'static str {
        match self {
            EsmMethod::Simple => "SIMPLE",
            EsmMethod::Double => "DOUBLE",
            EsmMethod::Linear => "LINEAR",
            EsmMethod::Damped => "DAMPTREND",
            EsmMethod::Seasonal => "SEASONAL",
            EsmMethod::Winters => "ADDWINTERS",
            EsmMethod::MultiplicativeWinters => "WINTERS",
        }
    }

    fn weight_names(self) -> &'static [&'static str] {
        match self {
            EsmMethod::Simple | EsmMethod::Double => &["LEVEL_WEIGHT"],
            EsmMethod::Linear => &["LEVEL_WEIGHT", "TREND_WEIGHT"],
            EsmMethod::Damped => &["LEVEL_WEIGHT", "TREND_WEIGHT", "DAMPING_WEIGHT"],
            EsmMethod::Seasonal => &["LEVEL_WEIGHT", "SEASON_WEIGHT"],
            EsmMethod::Winters | EsmMethod::MultiplicativeWinters => {
                &["LEVEL_WEIGHT", "TREND_WEIGHT", "SEASON_WEIGHT"]
            }
        }
    }

    fn bounds(self) -> Vec<(f64, f64)> {
        self.weight_names()
            .iter()
            .map(|name| {
                if *name == "DAMPING_WEIGHT" {
                    DAMPING_BOUNDS
                } else {
                    WEIGHT_BOUNDS
                }
            })
            .collect()
    }

    fn initial_weights(self) -> Vec<f64> {
        self.weight_names()
            .iter()
            .map(|name| match *name {
                "LEVEL_WEIGHT" => 0.3,
                "DAMPING_WEIGHT" => 0.95,
                _ => 0.1,
            })
            .collect()
    }

    /// Minimum number of observations the method can be initialised from.
    pub fn min_observations(self, period: usize) -> usize {
        if self.is_seasonal() {
            2 * period
        } else if self.has_trend() {
            3
        } else {
            2
        }
    }
}

/// Smoothing weights in component form.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Weights {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
}

impl Weights {
    fn from_params(method: EsmMethod, params: &[f64]) -> Self {
        let get = |i: usize| params.get(i).copied().unwrap_or(0.0);
        match method {
            EsmMethod::Simple => Self {
                alpha: get(0),
                beta: 0.0,
                gamma: 0.0,
                phi: 1.0,
            },
            // Brown's method is Holt's with weights tied to one parameter.
            EsmMethod::Double => {
                let a = get(0);
                Self {
                    alpha: a * (2.0 - a),
                    beta: a / (2.0 - a),
                    gamma: 0.0,
                    phi: 1.0,
                }
            }
            EsmMethod::Linear => Self {
                alpha: get(0),
                beta: get(1),
                gamma: 0.0,
                phi: 1.0,
            },
            EsmMethod::Damped => Self {
                alpha: get(0),
                beta: get(1),
                gamma: 0.0,
                phi: get(2),
            },
            EsmMethod::Seasonal => Self {
                alpha: get(0),
                beta: 0.0,
                gamma: get(1),
                phi: 1.0,
            },
            EsmMethod::Winters | EsmMethod::MultiplicativeWinters => Self {
                alpha: get(0),
                beta: get(1),
                gamma: get(2),
                phi: 1.0,
            },
        }
    }
}

/// Smoothing state after the last observation.
#[derive(Debug, Clone, PartialEq)]
struct State {
    level: f64,
    trend: f64,
    /// Seasonal factor for each time index modulo the period.
    season: Vec<f64>,
}

/// Output of one pass of the recursion.
struct Pass {
    fitted: Vec<f64>,
    levels: Vec<f64>,
    trends: Vec<f64>,
    seasons: Vec<f64>,
    state: State,
}

fn finite_mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    (!finite.is_empty()).then(|| finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Initial state and the index the recursion starts at.
fn initial_state(method: EsmMethod, values: &[f64], period: usize) -> Result<(State, usize)> {
    let needed = method.min_observations(period);
    if values.len() < needed {
        return Err(ForecastError::InsufficientData {
            needed,
            got: values.len(),
        });
    }

    if method.is_seasonal() {
        let first = &values[..period];
        let level = finite_mean(first).ok_or(ForecastError::MissingValues)?;
        let trend = if method.has_trend() {
            let second = finite_mean(&values[period..2 * period]).unwrap_or(level);
            (second - level) / period as f64
        } else {
            0.0
        };
        let season = first
            .iter()
            .map(|&y| match (y.is_finite(), method.is_multiplicative()) {
                (false, true) => 1.0,
                (false, false) => 0.0,
                (true, true) => y / level,
                (true, false) => y - level,
            })
            .collect();
        return Ok((
            State {
                level,
                trend,
                season,
            },
            period,
        ));
    }

    let observed: Vec<(usize, f64)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();
    let &(first_idx, level) = observed.first().ok_or(ForecastError::MissingValues)?;
    let trend = if method.has_trend() {
        let &(second_idx, second) = observed.get(1).ok_or(ForecastError::InsufficientData {
            needed: 2,
            got: observed.len(),
        })?;
        (second - level) / (second_idx - first_idx) as f64
    } else {
        0.0
    };
    Ok((
        State {
            level,
            trend,
            season: vec![if method.is_multiplicative() { 1.0 } else { 0.0 }; period.max(1)],
        },
        first_idx + 1,
    ))
}

fn run(method: EsmMethod, values: &[f64], period: usize, w: Weights, init: &(State, usize)) -> Pass {
    let (mut state, start) = init.clone();
    let n = values.len();
    let m = state.season.len();
    let mut pass = Pass {
        fitted: vec![f64::NAN; n],
        levels: vec![f64::NAN; n],
        trends: vec![f64::NAN; n],
        seasons: vec![f64::NAN; n],
        state: state.clone(),
    };
    let multiplicative = method.is_multiplicative();
    let seasonal = method.is_seasonal() && period > 1;

    for t in start..n {
        let damped = w.phi * state.trend;
        let base = state.level + damped;
        let s = state.season[t % m];
        pass.fitted[t] = match (seasonal, multiplicative) {
            (false, _) => base,
            (true, false) => base + s,
            (true, true) => base * s,
        };

        let y = values[t];
        if y.is_finite() {
            let deseasoned = match (seasonal, multiplicative) {
                (false, _) => y,
                (true, false) => y - s,
                (true, true) => y / s,
            };
            let level = w.alpha * deseasoned + (1.0 - w.alpha) * base;
            if method.has_trend() {
                state.trend = w.beta * (level - state.level) + (1.0 - w.beta) * damped;
            }
            if seasonal {
                state.season[t % m] = if multiplicative {
                    w.gamma * (y / level) + (1.0 - w.gamma) * s
                } else {
                    w.gamma * (y - level) + (1.0 - w.gamma) * s
                };
            }
            state.level = level;
        } else {
            state.level = base;
            state.trend = damped;
        }

        pass.levels[t] = state.level;
        pass.trends[t] = state.trend;
        pass.seasons[t] = state.season[t % m];
    }

    pass.state = state;
    pass
}

fn sse(values: &[f64], fitted: &[f64]) -> f64 {
    values
        .iter()
        .zip(fitted)
        .filter(|(y, f)| y.is_finite() && !f.is_nan())
        .map(|(y, f)| (y - f).powi(2))
        .sum()
}

/// Exponential smoothing forecaster for one [`EsmMethod`].
///
/// # Example
/// ```
/// use anofox_autoforecast::core::{GroupKey, Interval, TimeSeries};
/// use anofox_autoforecast::models::exponential::{EsmMethod, ExponentialSmoothing};
/// use anofox_autoforecast::models::Forecaster;
/// use chrono::{TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
/// let values = vec![10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0];
/// let ts = TimeSeries::from_start(GroupKey::empty(), Interval::Month, start, values).unwrap();
///
/// let mut model = ExponentialSmoothing::new(EsmMethod::Simple);
/// model.fit(&ts).unwrap();
///
/// let forecast = model.predict(3).unwrap();
/// assert_eq!(forecast.horizon(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    method: EsmMethod,
    name: String,
    params: Option<Vec<f64>>,
    period: usize,
    state: Option<State>,
    nobs: usize,
    sigma2: f64,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    components: Vec<Component>,
    estimates: Vec<ParameterEstimate>,
}

impl ExponentialSmoothing {
    pub fn new(method: EsmMethod) -> Self {
        Self {
            method,
            name: format!("ESM({})", method.label()),
            params: None,
            period: 1,
            state: None,
            nobs: 0,
            sigma2: f64::NAN,
            fitted: None,
            residuals: None,
            components: Vec::new(),
            estimates: Vec::new(),
        }
    }

    /// Use fixed smoothing weights instead of estimating them.
    ///
    /// Weights are given in the method's parameter order: level, then
    /// trend, damping and season where present.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        let expected = self.method.weight_names().len();
        if weights.len() != expected {
            return Err(ForecastError::DimensionMismatch {
                expected,
                got: weights.len(),
            });
        }
        self.params = Some(weights);
        Ok(self)
    }

    pub fn method(&self) -> EsmMethod {
        self.method
    }

    /// Smoothing weights after fitting, in parameter order.
    pub fn weights(&self) -> Option<&[f64]> {
        self.params.as_deref()
    }

    fn estimate(&self, values: &[f64], init: &(State, usize)) -> Vec<f64> {
        let method = self.method;
        let period = self.period;
        let bounds = method.bounds();
        let objective = |p: &[f64]| {
            let pass = run(method, values, period, Weights::from_params(method, p), init);
            sse(values, &pass.fitted)
        };
        let result = nelder_mead(
            objective,
            &method.initial_weights(),
            Some(&bounds),
            NelderMeadConfig {
                max_iter: 500,
                restarts: 2,
                ..Default::default()
            },
        );
        result.optimal_point
    }

    /// Coefficients of past errors in the h-step forecast error.
    fn error_weights(&self, horizon: usize) -> Vec<f64> {
        let params = self.params.as_deref().unwrap_or_default();
        let w = Weights::from_params(self.method, params);
        let m = self.period.max(1);
        let mut damp_sum = 0.0;
        (1..horizon)
            .map(|j| {
                damp_sum += w.phi.powi(j as i32);
                let mut c = w.alpha;
                if self.method.has_trend() {
                    c += w.alpha * w.beta * damp_sum;
                }
                if self.method.is_seasonal() && j % m == 0 {
                    c += w.gamma * (1.0 - w.alpha);
                }
                c
            })
            .collect()
    }
}

impl Forecaster for ExponentialSmoothing {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = series.values();
        if values.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        self.period = if self.method.is_seasonal() {
            let period = series.season_length();
            if period < 2 {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} needs a season length of at least 2",
                    self.method.label()
                )));
            }
            period
        } else {
            1
        };
        if self.method.is_multiplicative() && values.iter().any(|v| v.is_finite() && *v <= 0.0) {
            return Err(ForecastError::InvalidParameter(
                "multiplicative seasonality requires positive values".to_string(),
            ));
        }

        let init = initial_state(self.method, values, self.period)?;
        let params = match &self.params {
            Some(p) => p.clone(),
            None => self.estimate(values, &init),
        };
        let weights = Weights::from_params(self.method, &params);
        let pass = run(self.method, values, self.period, weights, &init);
        if !pass.state.level.is_finite() {
            return Err(ForecastError::ComputationError(
                "smoothing recursion diverged".to_string(),
            ));
        }

        let k = params.len();
        let residuals = residuals_of(values, &pass.fitted);
        self.sigma2 = residual_variance(&residuals, k);
        self.nobs = residuals.iter().filter(|r| r.is_finite()).count();

        let names: Vec<String> = self
            .method
            .weight_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (method, period) = (self.method, self.period);
        self.estimates = least_squares_estimates(&names, &params, self.sigma2, |p| {
            let pass = run(method, values, period, Weights::from_params(method, p), &init);
            residuals_of(values, &pass.fitted)
        });

        let mut components = vec![Component::new("LEVEL", pass.levels)];
        if self.method.has_trend() {
            components.push(Component::new("TREND", pass.trends));
        }
        if self.method.is_seasonal() {
            components.push(Component::new("SEASON", pass.seasons));
        }
        self.components = components;

        self.params = Some(params);
        self.state = Some(pass.state);
        self.fitted = Some(pass.fitted);
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let state = self.state.as_ref().ok_or(ForecastError::FitRequired)?;
        let params = self.params.as_deref().ok_or(ForecastError::FitRequired)?;
        let w = Weights::from_params(self.method, params);
        let n = self.fitted.as_ref().map_or(0, |f| f.len());
        let m = state.season.len();

        let mut damp_sum = 0.0;
        let point: Vec<f64> = (1..=horizon)
            .map(|h| {
                damp_sum += w.phi.powi(h as i32);
                let base = state.level + damp_sum * state.trend;
                if !self.method.is_seasonal() {
                    base
                } else {
                    let s = state.season[(n + h - 1) % m];
                    if self.method.is_multiplicative() {
                        base * s
                    } else {
                        base + s
                    }
                }
            })
            .collect();

        let c = self.error_weights(horizon);
        let mut cumulative = 1.0;
        let std: Vec<f64> = (0..horizon)
            .map(|h| {
                if h > 0 {
                    cumulative += c[h - 1] * c[h - 1];
                }
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
        self.method.weight_names().len()
    }

    fn parameters(&self) -> Vec<ParameterEstimate> {
        self.estimates.clone()
    }

    fn components(&self) -> Vec<Component> {
        self.components.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GroupKey, Interval};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn monthly(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(GroupKey::empty(), Interval::Month, start, values).unwrap()
    }

    fn seasonal_values(cycles: usize) -> Vec<f64> {
        (0..12 * cycles)
            .map(|i| {
                50.0 + 0.5 * i as f64
                    + 8.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin()
            })
            .collect()
    }

    #[test]
    fn fixed_weight_simple_smoothing_matches_hand_computation() {
        let ts = monthly(vec![10.0, 12.0, 11.0]);
        let mut model = ExponentialSmoothing::new(EsmMethod::Simple)
            .with_weights(vec![0.5])
            .unwrap();
        model.fit(&ts).unwrap();

        // level: 10 -> 11 -> 11
        let fitted = model.fitted_values().unwrap();
        assert!(fitted[0].is_nan());
        assert_relative_eq!(fitted[1], 10.0);
        assert_relative_eq!(fitted[2], 11.0);

        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.point(), &[11.0, 11.0, 11.0]);

        // residuals 2 and 0, sigma2 = 4 / (2 - 1)
        let std = forecast.std().unwrap();
        assert_relative_eq!(std[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(std[1], (4.0f64 * 1.25).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(std[2], (4.0f64 * 1.5).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn linear_trend_is_extrapolated() {
        let values: Vec<f64> = (0..20).map(|i| 5.0 + 2.0 * i as f64).collect();
        let mut model = ExponentialSmoothing::new(EsmMethod::Linear);
        model.fit(&monthly(values)).unwrap();
        let forecast = model.predict(2).unwrap();
        assert_relative_eq!(forecast.point()[0], 45.0, epsilon = 1e-6);
        assert_relative_eq!(forecast.point()[1], 47.0, epsilon = 1e-6);
    }

    #[test]
    fn winters_tracks_seasonal_pattern() {
        let values = seasonal_values(4);
        let ts = monthly(values.clone());
        let mut winters = ExponentialSmoothing::new(EsmMethod::Winters);
        winters.fit(&ts).unwrap();
        let mut simple = ExponentialSmoothing::new(EsmMethod::Simple);
        simple.fit(&ts).unwrap();

        let rmse = |m: &ExponentialSmoothing| {
            let r: Vec<f64> = m.residuals().unwrap()[24..].to_vec();
            (r.iter().map(|e| e * e).sum::<f64>() / r.len() as f64).sqrt()
        };
        assert!(rmse(&winters) < rmse(&simple));

        let forecast = winters.predict(12).unwrap();
        assert!(forecast.point().iter().all(|v| v.is_finite()));
        let std = forecast.std().unwrap();
        assert!(std.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(winters.components().len(), 3);
    }

    #[test]
    fn seasonal_methods_need_two_cycles_and_a_period() {
        let mut model = ExponentialSmoothing::new(EsmMethod::Seasonal);
        assert!(matches!(
            model.fit(&monthly(seasonal_values(1))),
            Err(ForecastError::InsufficientData { needed: 24, .. })
        ));

        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let yearly =
            TimeSeries::from_start(GroupKey::empty(), Interval::Year, start, vec![1.0; 10])
                .unwrap();
        assert!(model.fit(&yearly).is_err());
    }

    #[test]
    fn multiplicative_winters_rejects_non_positive_values() {
        let mut values = seasonal_values(3);
        values[5] = -1.0;
        let mut model = ExponentialSmoothing::new(EsmMethod::MultiplicativeWinters);
        assert!(matches!(
            model.fit(&monthly(values)),
            Err(ForecastError::InvalidParameter(_))
        ));
    }

    #[test]
    fn missing_values_are_skipped_by_the_recursion() {
        let mut values: Vec<f64> = (0..15).map(|i| 10.0 + (i % 3) as f64).collect();
        values[6] = f64::NAN;
        let mut model = ExponentialSmoothing::new(EsmMethod::Damped);
        model.fit(&monthly(values)).unwrap();
        assert!(model.residuals().unwrap()[6].is_nan());
        assert!(model.predict(4).unwrap().point().iter().all(|v| v.is_finite()));
        assert_eq!(model.parameters().len(), 3);
    }
}
