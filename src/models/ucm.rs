//! Unobserved components model estimated with the Kalman filter.
//!
//! The observation is the sum of a random-walk level, an optional random
//! walk slope and an optional dummy seasonal, plus irregular noise. The
//! disturbance variances are estimated by maximising the prediction error
//! likelihood over their logarithms.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{residual_variance, residuals_of};
use crate::models::{Component, Forecaster};
use crate::utils::estimates::likelihood_estimates;
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use crate::utils::stats::variance;
use crate::utils::ParameterEstimate;
use serde::{Deserialize, Serialize};

/// Components included in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UcmSpec {
    pub trend: bool,
    /// Seasonal period, `None` for no seasonal component.
    pub season: Option<usize>,
}

impl UcmSpec {
    pub fn level() -> Self {
        Self {
            trend: false,
            season: None,
        }
    }

    pub fn with_trend(mut self) -> Self {
        self.trend = true;
        self
    }

    pub fn with_season(mut self, period: usize) -> Self {
        self.season = (period > 1).then_some(period);
        self
    }

    fn state_dim(&self) -> usize {
        1 + usize::from(self.trend) + self.season.map_or(0, |s| s - 1)
    }

    fn season_index(&self) -> usize {
        1 + usize::from(self.trend)
    }

    fn variance_names(&self) -> Vec<String> {
        let mut names = vec!["ERROR_VARIANCE".to_string(), "LEVEL_VARIANCE".to_string()];
        if self.trend {
            names.push("SLOPE_VARIANCE".to_string());
        }
        if self.season.is_some() {
            names.push("SEASON_VARIANCE".to_string());
        }
        names
    }

    pub fn label(&self) -> String {
        let mut label = "UCM(LEVEL".to_string();
        if self.trend {
            label.push_str("+SLOPE");
        }
        if self.season.is_some() {
            label.push_str("+SEASON");
        }
        label.push(')');
        label
    }
}

type Matrix = Vec<Vec<f64>>;

/// State space system of a [`UcmSpec`].
struct System {
    spec: UcmSpec,
    transition: Matrix,
    /// Disturbance variance per state, zero for deterministic states.
    state_noise: Vec<f64>,
    irregular: f64,
}

impl System {
    fn new(spec: UcmSpec, variances: &[f64]) -> Self {
        let m = spec.state_dim();
        let mut transition = vec![vec![0.0; m]; m];
        let mut state_noise = vec![0.0; m];
        transition[0][0] = 1.0;
        state_noise[0] = variances[1];
        let mut next = 2;
        if spec.trend {
            transition[0][1] = 1.0;
            transition[1][1] = 1.0;
            state_noise[1] = variances[next];
            next += 1;
        }
        if spec.season.is_some() {
            let first = spec.season_index();
            for j in first..m {
                transition[first][j] = -1.0;
            }
            for j in first + 1..m {
                transition[j][j - 1] = 1.0;
            }
            state_noise[first] = variances[next];
        }
        Self {
            spec,
            transition,
            state_noise,
            irregular: variances[0],
        }
    }

    /// `Z·a`: level plus current seasonal.
    fn observe(&self, a: &[f64]) -> f64 {
        a[0] + self
            .spec
            .season
            .map_or(0.0, |_| a[self.spec.season_index()])
    }

    fn observation_vector(&self) -> Vec<f64> {
        let mut z = vec![0.0; self.spec.state_dim()];
        z[0] = 1.0;
        if self.spec.season.is_some() {
            z[self.spec.season_index()] = 1.0;
        }
        z
    }

    fn advance(&self, a: &[f64], p: &Matrix) -> (Vec<f64>, Matrix) {
        let t = &self.transition;
        let m = a.len();
        let a_next: Vec<f64> = (0..m)
            .map(|i| (0..m).map(|j| t[i][j] * a[j]).sum())
            .collect();
        let tp: Matrix = (0..m)
            .map(|i| (0..m).map(|j| (0..m).map(|k| t[i][k] * p[k][j]).sum()).collect())
            .collect();
        let mut p_next: Matrix = (0..m)
            .map(|i| (0..m).map(|j| (0..m).map(|k| tp[i][k] * t[j][k]).sum()).collect())
            .collect();
        for (i, q) in self.state_noise.iter().enumerate() {
            p_next[i][i] += q;
        }
        (a_next, p_next)
    }
}

/// Output of one filtering pass.
struct Filtered {
    predictions: Vec<f64>,
    filtered_states: Vec<Vec<f64>>,
    neg_loglik: f64,
    state: Vec<f64>,
    covariance: Matrix,
}

fn filter(system: &System, values: &[f64], diffuse: f64) -> Filtered {
    let m = system.spec.state_dim();
    let z = system.observation_vector();
    let first = values.iter().copied().find(|v| v.is_finite()).unwrap_or(0.0);

    let mut a = vec![0.0; m];
    a[0] = first;
    let mut p: Matrix = (0..m)
        .map(|i| (0..m).map(|j| if i == j { diffuse } else { 0.0 }).collect())
        .collect();

    let mut predictions = Vec::with_capacity(values.len());
    let mut filtered_states = Vec::with_capacity(values.len());
    let mut neg_loglik = 0.0;
    let mut observed = 0;

    for &y in values {
        let prediction = system.observe(&a);
        predictions.push(prediction);

        if y.is_finite() {
            let pz: Vec<f64> = (0..m).map(|i| (0..m).map(|j| p[i][j] * z[j]).sum()).collect();
            let f = z.iter().zip(&pz).map(|(a, b)| a * b).sum::<f64>() + system.irregular;
            let v = y - prediction;
            for i in 0..m {
                a[i] += pz[i] * v / f;
            }
            for i in 0..m {
                for j in 0..m {
                    p[i][j] -= pz[i] * pz[j] / f;
                }
            }
            // The first observations only resolve the diffuse initial state.
            if observed >= m {
                neg_loglik += 0.5 * (f.ln() + v * v / f);
            }
            observed += 1;
        }
        filtered_states.push(a.clone());
        let (a_next, p_next) = system.advance(&a, &p);
        a = a_next;
        p = p_next;
    }

    Filtered {
        predictions,
        filtered_states,
        neg_loglik: if neg_loglik.is_finite() {
            neg_loglik
        } else {
            f64::INFINITY
        },
        state: a,
        covariance: p,
    }
}

/// Unobserved components forecaster.
#[derive(Debug, Clone)]
pub struct Ucm {
    spec: UcmSpec,
    name: String,
    variances: Option<Vec<f64>>,
    state: Vec<f64>,
    covariance: Matrix,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    components: Vec<Component>,
    estimates: Vec<ParameterEstimate>,
}

impl Ucm {
    pub fn new(spec: UcmSpec) -> Self {
        Self {
            spec,
            name: spec.label(),
            variances: None,
            state: Vec::new(),
            covariance: Vec::new(),
            fitted: None,
            residuals: None,
            components: Vec::new(),
            estimates: Vec::new(),
        }
    }

    pub fn spec(&self) -> UcmSpec {
        self.spec
    }

    /// Estimated disturbance variances: irregular, level, then slope and
    /// season when present.
    pub fn variances(&self) -> Option<&[f64]> {
        self.variances.as_deref()
    }
}

impl Forecaster for Ucm {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = series.values();
        if let Some(season) = self.spec.season {
            if season != series.season_length() {
                return Err(ForecastError::InvalidParameter(format!(
                    "seasonal period {season} does not match season length {}",
                    series.season_length()
                )));
            }
        }
        let observed: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let needed = self.spec.state_dim() + 2;
        if observed.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: observed.len(),
            });
        }

        let diffs: Vec<f64> = observed.windows(2).map(|w| w[1] - w[0]).collect();
        let scale = variance(&diffs).max(variance(&observed) * 1e-4).max(1e-8);
        let diffuse = 1e6 * variance(&observed).max(1.0);
        let k = self.spec.variance_names().len();
        let spec = self.spec;

        let neg_loglik = |log_var: &[f64]| {
            let variances: Vec<f64> = log_var.iter().map(|v| v.exp()).collect();
            filter(&System::new(spec, &variances), values, diffuse).neg_loglik
        };
        let bounds = vec![(scale.ln() - 20.0, scale.ln() + 3.0); k];
        let result = nelder_mead(
            neg_loglik,
            &vec![(scale / 2.0).ln(); k],
            Some(&bounds),
            NelderMeadConfig {
                max_iter: 1000,
                initial_step: 0.5,
                restarts: 2,
                ..Default::default()
            },
        );
        if !result.optimal_value.is_finite() {
            return Err(ForecastError::ComputationError(
                "Kalman filter likelihood is not finite".to_string(),
            ));
        }

        let log_var = result.optimal_point;
        let variances: Vec<f64> = log_var.iter().map(|v| v.exp()).collect();
        let run = filter(&System::new(spec, &variances), values, diffuse);

        // Standard errors on the variance scale by the delta method.
        let names = self.spec.variance_names();
        self.estimates = likelihood_estimates(&names, &log_var, observed.len(), neg_loglik)
            .into_iter()
            .zip(&variances)
            .map(|(est, &var)| {
                ParameterEstimate::with_std_err(
                    est.name,
                    var,
                    var * est.std_err,
                    observed.len().saturating_sub(k),
                )
            })
            .collect();

        // Predictions before the state is identified carry no information.
        let mut fitted = run.predictions;
        let mut seen = 0;
        for (f, y) in fitted.iter_mut().zip(values) {
            if seen < self.spec.state_dim() {
                *f = f64::NAN;
            }
            if y.is_finite() {
                seen += 1;
            }
        }

        let state_series = |idx: usize| -> Vec<f64> {
            run.filtered_states.iter().map(|a| a[idx]).collect()
        };
        let mut components = vec![Component::new("LEVEL", state_series(0))];
        if self.spec.trend {
            components.push(Component::new("SLOPE", state_series(1)));
        }
        if self.spec.season.is_some() {
            components.push(Component::new("SEASON", state_series(self.spec.season_index())));
        }

        let residuals = residuals_of(values, &fitted);
        if !residual_variance(&residuals, 0).is_finite() {
            return Err(ForecastError::ComputationError(
                "no identified one-step predictions".to_string(),
            ));
        }

        self.components = components;
        self.state = run.state;
        self.covariance = run.covariance;
        self.fitted = Some(fitted);
        self.residuals = Some(residuals);
        self.variances = Some(variances);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let variances = self.variances.as_deref().ok_or(ForecastError::FitRequired)?;
        let system = System::new(self.spec, variances);
        let z = system.observation_vector();
        let mut a = self.state.clone();
        let mut p = self.covariance.clone();
        let mut point = Vec::with_capacity(horizon);
        let mut std = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            point.push(system.observe(&a));
            let m = a.len();
            let var: f64 = (0..m)
                .map(|i| (0..m).map(|j| z[i] * p[i][j] * z[j]).sum::<f64>())
                .sum::<f64>()
                + system.irregular;
            std.push(var.max(0.0).sqrt());
            let (a_next, p_next) = system.advance(&a, &p);
            a = a_next;
            p = p_next;
        }

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
        self.spec.variance_names().len()
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

    fn quarterly(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::from_start(GroupKey::empty(), Interval::Quarter, start, values).unwrap()
    }

    #[test]
    fn labels_and_dimensions() {
        let spec = UcmSpec::level().with_trend().with_season(4);
        assert_eq!(spec.label(), "UCM(LEVEL+SLOPE+SEASON)");
        assert_eq!(spec.state_dim(), 5);
        assert_eq!(UcmSpec::level().with_season(1).season, None);
    }

    #[test]
    fn seasonal_transition_sums_to_zero_over_a_cycle() {
        let system = System::new(UcmSpec::level().with_season(4), &[1.0, 0.0, 0.0]);
        // seasonal states s_t, s_{t-1}, s_{t-2} = 1, 2, 3 -> next s = -6
        let (a, _) = system.advance(&[0.0, 1.0, 2.0, 3.0], &vec![vec![0.0; 4]; 4]);
        assert_eq!(a, vec![0.0, -6.0, 1.0, 2.0]);
    }

    #[test]
    fn local_level_forecast_is_flat_with_growing_uncertainty() {
        let values: Vec<f64> = (0..40).map(|i| 20.0 + ((i * 17) % 7) as f64 * 0.5).collect();
        let mut model = Ucm::new(UcmSpec::level());
        model.fit(&quarterly(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        let point = forecast.point();
        assert_relative_eq!(point[0], point[3], epsilon = 1e-9);
        let std = forecast.std().unwrap();
        assert!(std.windows(2).all(|w| w[1] >= w[0] - 1e-9));
        assert_eq!(model.parameters().len(), 2);
    }

    #[test]
    fn trend_and_season_are_extrapolated() {
        let pattern = [4.0, -2.0, 1.0, -3.0];
        let values: Vec<f64> = (0..32)
            .map(|i| 50.0 + 1.5 * i as f64 + pattern[i % 4] + ((i * 5) % 3) as f64 * 0.1)
            .collect();
        let mut model = Ucm::new(UcmSpec::level().with_trend().with_season(4));
        model.fit(&quarterly(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        // next period is i = 32, season index 0
        let expected = 50.0 + 1.5 * 32.0 + 4.0;
        assert_relative_eq!(forecast.point()[0], expected, epsilon = 1.0);
        assert_eq!(model.components().len(), 3);
    }

    #[test]
    fn missing_values_are_skipped() {
        let mut values: Vec<f64> = (0..20).map(|i| 5.0 + (i % 2) as f64).collect();
        values[10] = f64::NAN;
        let mut model = Ucm::new(UcmSpec::level());
        model.fit(&quarterly(values)).unwrap();
        assert!(model.residuals().unwrap()[10].is_nan());
        assert!(model.fitted_values().unwrap()[10].is_finite());
    }

    #[test]
    fn season_must_match_the_series() {
        let mut model = Ucm::new(UcmSpec::level().with_season(12));
        assert!(matches!(
            model.fit(&quarterly(vec![1.0; 30])),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
