//! Differencing and lag-polynomial utilities for ARIMA models.
//!
//! Polynomials are coefficient vectors in the backshift operator, starting
//! at lag 0: `[1.0, -0.5]` is `1 - 0.5B`.

/// Apply differencing to a time series.
///
/// # Arguments
/// * `series` - The input series
/// * `d` - Differencing order (number of times to difference)
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Apply seasonal differencing to a time series.
///
/// # Arguments
/// * `series` - The input series
/// * `d` - Seasonal differencing order
/// * `period` - Seasonal period
pub fn seasonal_difference(series: &[f64], d: usize, period: usize) -> Vec<f64> {
    if period == 0 {
        return series.to_vec();
    }
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= period {
            return Vec::new();
        }
        result = result
            .iter()
            .skip(period)
            .zip(result.iter())
            .map(|(curr, prev)| curr - prev)
            .collect();
    }
    result
}

/// Product of two lag polynomials.
pub fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 - c_1·B^s - c_2·B^{2s} - ...` for AR-style coefficients `c`.
pub fn ar_polynomial(coefficients: &[f64], step: usize) -> Vec<f64> {
    let mut poly = vec![0.0; coefficients.len() * step + 1];
    poly[0] = 1.0;
    for (i, c) in coefficients.iter().enumerate() {
        poly[(i + 1) * step] = -c;
    }
    poly
}

/// `1 + c_1·B^s + c_2·B^{2s} + ...` for MA-style coefficients `c`.
pub fn ma_polynomial(coefficients: &[f64], step: usize) -> Vec<f64> {
    let mut poly = vec![0.0; coefficients.len() * step + 1];
    poly[0] = 1.0;
    for (i, c) in coefficients.iter().enumerate() {
        poly[(i + 1) * step] = *c;
    }
    poly
}

/// Differencing operator `(1 - B)^d (1 - B^s)^D`.
pub fn differencing_polynomial(d: usize, seasonal_d: usize, period: usize) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..d {
        poly = multiply(&poly, &[1.0, -1.0]);
    }
    if period > 0 {
        for _ in 0..seasonal_d {
            poly = multiply(&poly, &ar_polynomial(&[1.0], period));
        }
    }
    poly
}

/// Whether the AR coefficients `φ` of `1 - Σ φ_i B^i` describe a stationary
/// process, by the step-down (reverse Durbin-Levinson) recursion: every
/// partial autocorrelation must lie strictly inside the unit interval.
pub fn is_stationary(coefficients: &[f64]) -> bool {
    let mut phi: Vec<f64> = coefficients.to_vec();
    while phi.last().is_some_and(|c| *c == 0.0) {
        phi.pop();
    }
    while let Some(&last) = phi.last() {
        if !last.is_finite() || last.abs() >= 1.0 {
            return false;
        }
        let k = phi.len();
        let denom = 1.0 - last * last;
        phi = (0..k - 1)
            .map(|i| (phi[i] + last * phi[k - 2 - i]) / denom)
            .collect();
    }
    true
}

/// Whether the MA coefficients `θ` of `1 + Σ θ_i B^i` are invertible.
pub fn is_invertible(coefficients: &[f64]) -> bool {
    let negated: Vec<f64> = coefficients.iter().map(|c| -c).collect();
    is_stationary(&negated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_orders() {
        let series = vec![1.0, 3.0, 6.0, 10.0, 15.0];
        assert_eq!(difference(&series, 0), series);
        assert_eq!(difference(&series, 1), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(difference(&series, 2), vec![1.0, 1.0, 1.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn seasonal_difference_basic() {
        // Quarterly data: each quarter increases by 10 each year
        let series = vec![100.0, 120.0, 80.0, 90.0, 110.0, 130.0, 90.0, 100.0];
        assert_eq!(seasonal_difference(&series, 1, 4), vec![10.0; 4]);
        assert_eq!(seasonal_difference(&series, 0, 4), series);
    }

    #[test]
    fn differencing_polynomial_expands_operators() {
        assert_eq!(differencing_polynomial(1, 0, 0), vec![1.0, -1.0]);
        assert_eq!(differencing_polynomial(2, 0, 0), vec![1.0, -2.0, 1.0]);
        // (1 - B)(1 - B^4) = 1 - B - B^4 + B^5
        assert_eq!(
            differencing_polynomial(1, 1, 4),
            vec![1.0, -1.0, 0.0, 0.0, -1.0, 1.0]
        );
    }

    #[test]
    fn polynomial_product_of_ar_terms() {
        // (1 - 0.5B)(1 - 0.2B^2)
        let p = multiply(&ar_polynomial(&[0.5], 1), &ar_polynomial(&[0.2], 2));
        assert_eq!(p, vec![1.0, -0.5, -0.2, 0.1]);
        assert_eq!(ma_polynomial(&[0.3], 2), vec![1.0, 0.0, 0.3]);
    }

    #[test]
    fn stationarity_region() {
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(is_stationary(&[0.5, 0.3]));
        assert!(!is_stationary(&[0.5, 0.6]));
        assert!(!is_stationary(&[1.2, -0.1]));
        assert!(is_stationary(&[]));
        assert!(is_invertible(&[-0.9]));
        assert!(!is_invertible(&[1.5]));
    }
}
