//! Automatic identification of ARIMA orders.
//!
//! The differencing order comes from repeated KPSS tests, the seasonal
//! differencing order from the variance reduction of the seasonal
//! difference. Non-seasonal orders are searched stepwise by AIC, starting
//! from a small set of common models and moving to neighbouring orders while
//! the criterion improves. Seasonal orders are then searched around the best
//! non-seasonal order.

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::arima::diff::{difference, seasonal_difference};
use crate::models::arima::{ArimaOrder, Arimax};
use crate::models::Forecaster;
use crate::utils::stats::{kpss_statistic, variance, KPSS_CRITICAL_5PCT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

fn default_max_p() -> usize {
    3
}

fn default_max_q() -> usize {
    3
}

fn default_max_d() -> usize {
    2
}

fn default_max_seasonal() -> usize {
    1
}

/// Bounds of the order search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyConfig {
    #[serde(default = "default_max_p")]
    pub max_p: usize,
    #[serde(default = "default_max_q")]
    pub max_q: usize,
    #[serde(default = "default_max_d")]
    pub max_d: usize,
    #[serde(default = "default_max_seasonal")]
    pub max_seasonal_p: usize,
    #[serde(default = "default_max_seasonal")]
    pub max_seasonal_q: usize,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            max_p: default_max_p(),
            max_q: default_max_q(),
            max_d: default_max_d(),
            max_seasonal_p: default_max_seasonal(),
            max_seasonal_q: default_max_seasonal(),
        }
    }
}

/// A fitted model together with its identification score.
#[derive(Debug, Clone)]
pub struct IdentifiedModel {
    pub order: ArimaOrder,
    pub aic: f64,
    pub model: Arimax,
}

/// Best non-seasonal and best seasonal models found.
#[derive(Debug, Clone, Default)]
pub struct Identification {
    pub non_seasonal: Option<IdentifiedModel>,
    pub seasonal: Option<IdentifiedModel>,
}

/// Smallest `d <= max_d` whose differences pass the KPSS test.
pub fn choose_differencing(values: &[f64], max_d: usize) -> usize {
    for d in 0..max_d {
        let diffed = difference(values, d);
        if diffed.len() < 6 || kpss_statistic(&diffed) < KPSS_CRITICAL_5PCT {
            return d;
        }
    }
    max_d
}

/// Seasonal differencing order, 1 when the seasonal difference removes at
/// least 30% of the variance.
pub fn choose_seasonal_differencing(values: &[f64], period: usize) -> usize {
    if period < 2 || values.len() < 3 * period {
        return 0;
    }
    let diffed = seasonal_difference(values, 1, period);
    if variance(&diffed) < 0.7 * variance(values) {
        1
    } else {
        0
    }
}

/// Searches ARIMA orders for one series.
#[derive(Debug, Clone, Default)]
pub struct ArimaIdentifier {
    config: IdentifyConfig,
}

impl ArimaIdentifier {
    pub fn new(config: IdentifyConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, series: &TimeSeries, order: ArimaOrder) -> Option<IdentifiedModel> {
        let mut model = Arimax::new(order);
        match model.fit(series) {
            Ok(()) => {
                let aic = model.aic().filter(|a| a.is_finite())?;
                debug!(order = %order.label(), aic, "ARIMA order evaluated");
                Some(IdentifiedModel { order, aic, model })
            }
            Err(err) => {
                debug!(order = %order.label(), error = %err, "ARIMA order rejected");
                None
            }
        }
    }

    /// Stepwise search over `(p, q)` for fixed differencing.
    fn stepwise<F>(&self, build: F, series: &TimeSeries, max: (usize, usize)) -> Option<IdentifiedModel>
    where
        F: Fn(usize, usize) -> ArimaOrder,
    {
        let mut tried: HashSet<(usize, usize)> = HashSet::new();
        let mut best: Option<IdentifiedModel> = None;

        let mut consider = |p: usize, q: usize, best: &mut Option<IdentifiedModel>| -> bool {
            if p > max.0 || q > max.1 || !tried.insert((p, q)) {
                return false;
            }
            match self.evaluate(series, build(p, q)) {
                Some(found) if best.as_ref().is_none_or(|b| found.aic < b.aic) => {
                    *best = Some(found);
                    true
                }
                _ => false,
            }
        };

        for (p, q) in [(2, 2), (0, 0), (1, 0), (0, 1)] {
            consider(p, q, &mut best);
        }

        loop {
            let Some((p, q)) = best.as_ref().map(|b| Self::orders(&b.order, &build)) else {
                break;
            };
            let neighbours = [
                (p.wrapping_sub(1), q),
                (p + 1, q),
                (p, q.wrapping_sub(1)),
                (p, q + 1),
                (p.wrapping_sub(1), q.wrapping_sub(1)),
                (p + 1, q + 1),
            ];
            let improved = neighbours
                .iter()
                .fold(false, |acc, &(np, nq)| consider(np, nq, &mut best) || acc);
            if !improved {
                break;
            }
        }
        best
    }

    /// The searched `(p, q)` pair of an order built by `build`.
    fn orders<F>(order: &ArimaOrder, build: &F) -> (usize, usize)
    where
        F: Fn(usize, usize) -> ArimaOrder,
    {
        if build(0, 0).is_seasonal() {
            (order.seasonal_p, order.seasonal_q)
        } else {
            (order.p, order.q)
        }
    }

    /// Identify the best non-seasonal and, when `seasonal` is set, the best
    /// seasonal model of the series.
    pub fn identify(&self, series: &TimeSeries, seasonal: bool) -> Result<Identification> {
        if series.has_missing_values() {
            return Err(ForecastError::MissingValues);
        }
        let values = series.values();
        let d = choose_differencing(values, self.config.max_d);

        let non_seasonal = self.stepwise(
            |p, q| ArimaOrder::new(p, d, q),
            series,
            (self.config.max_p, self.config.max_q),
        );

        let period = series.season_length();
        let seasonal = match (&non_seasonal, seasonal && period > 1) {
            (Some(base), true) => {
                let diffed = difference(values, d);
                let big_d = choose_seasonal_differencing(&diffed, period);
                let (p, q) = (base.order.p, base.order.q);
                self.stepwise(
                    |sp, sq| {
                        let order = ArimaOrder::new(p, d, q).with_seasonal(sp, big_d, sq, period);
                        // Keep the search seasonal even at (0, 0) without seasonal differencing.
                        if order.is_seasonal() {
                            order
                        } else {
                            ArimaOrder::new(p, d, q).with_seasonal(1, 0, 0, period)
                        }
                    },
                    series,
                    (self.config.max_seasonal_p, self.config.max_seasonal_q),
                )
            }
            _ => None,
        };

        Ok(Identification {
            non_seasonal,
            seasonal,
        })
    }
}
