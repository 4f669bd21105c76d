//! Statistical utility functions.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Quantile function of the standard normal distribution.
///
/// # Example
/// ```
/// use anofox_autoforecast::utils::quantile_normal;
///
/// let z = quantile_normal(0.975);
/// assert!((z - 1.96).abs() < 0.01);
/// ```
pub fn quantile_normal(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    Normal::standard().inverse_cdf(p)
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
///
/// Falls back to the normal distribution when `df` is zero.
pub fn two_sided_p_value(t: f64, df: usize) -> f64 {
    if !t.is_finite() {
        return f64::NAN;
    }
    let tail = if df == 0 {
        1.0 - Normal::standard().cdf(t.abs())
    } else {
        match StudentsT::new(0.0, 1.0, df as f64) {
            Ok(dist) => 1.0 - dist.cdf(t.abs()),
            Err(_) => return f64::NAN,
        }
    };
    (2.0 * tail).clamp(0.0, 1.0)
}

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the variance of a slice (sample variance with n-1 denominator).
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    sum_sq / (values.len() - 1) as f64
}

/// Mean of the finite values in `values`, ignoring `NaN` gaps.
pub fn finite_mean(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    mean(&finite)
}

/// Calculate the median of a slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n.is_multiple_of(2) {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Calculate the autocorrelation at a given lag.
///
/// Non-finite values are gaps: they are left out of the mean and the
/// variance, and every lagged pair touching one is skipped.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if values.len() <= lag {
        return f64::NAN;
    }
    let m = finite_mean(values);
    if m.is_nan() {
        return f64::NAN;
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for (i, value) in values.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        denominator += (value - m).powi(2);
        if i >= lag && values[i - lag].is_finite() {
            numerator += (value - m) * (values[i - lag] - m);
        }
    }

    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

/// Test whether the autocorrelation at the seasonal lag is significant.
///
/// The test runs on first differences so that a trend is not mistaken for
/// seasonality, against the white-noise standard error `1/sqrt(n)`. A gap
/// removes the two differences next to it.
pub fn is_seasonal(values: &[f64], period: usize, alpha: f64) -> bool {
    if period < 2 || values.len() < 2 * period + 2 {
        return false;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let observed = diffs.iter().filter(|d| d.is_finite()).count();
    if observed < 2 * period {
        return false;
    }
    let r = autocorrelation(&diffs, period);
    let se = 1.0 / (observed as f64).sqrt();
    r > quantile_normal(1.0 - alpha / 2.0) * se
}

/// Average number of periods between non-zero observations.
///
/// The first interval counts from the start of the series; a series without
/// any demand returns `+inf`.
pub fn average_demand_interval(values: &[f64]) -> f64 {
    let demand_points: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && **v != 0.0)
        .map(|(i, _)| i)
        .collect();

    if demand_points.is_empty() {
        return f64::INFINITY;
    }

    let mut total = (demand_points[0] + 1) as f64;
    for w in demand_points.windows(2) {
        total += (w[1] - w[0]) as f64;
    }
    total / demand_points.len() as f64
}

/// KPSS level-stationarity statistic with a Bartlett long-run variance.
pub fn kpss_statistic(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let resid: Vec<f64> = values.iter().map(|v| v - m).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for r in &resid {
        partial += r;
        eta += partial * partial;
    }
    eta /= (n * n) as f64;

    let lags = ((4.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize).min(n - 1);
    let mut s2 = resid.iter().map(|r| r * r).sum::<f64>() / n as f64;
    for lag in 1..=lags {
        let weight = 1.0 - lag as f64 / (lags + 1) as f64;
        let cov: f64 = (lag..n).map(|t| resid[t] * resid[t - lag]).sum::<f64>() / n as f64;
        s2 += 2.0 * weight * cov;
    }

    if s2 <= 0.0 {
        return 0.0;
    }
    eta / s2
}

/// 5% critical value of the KPSS level-stationarity test.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;
