//! Derivative-free minimisation used for parameter estimation.

use std::cmp::Ordering;

/// Result of Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// The optimal point found.
    pub optimal_point: Vec<f64>,
    /// The objective function value at the optimal point.
    pub optimal_value: f64,
    /// Number of iterations performed, over all restarts.
    pub iterations: usize,
    /// Whether the final simplex met the tolerance.
    pub converged: bool,
}

/// Configuration for Nelder-Mead optimization.
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations per restart.
    pub max_iter: usize,
    /// Convergence tolerance on objective spread and simplex size.
    pub tolerance: f64,
    /// Reflection coefficient.
    pub alpha: f64,
    /// Expansion coefficient.
    pub gamma: f64,
    /// Contraction coefficient.
    pub rho: f64,
    /// Shrinkage coefficient.
    pub sigma: f64,
    /// Initial simplex step size, relative for non-zero coordinates.
    pub initial_step: f64,
    /// Number of restarts from the best point found.
    pub restarts: usize,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.05,
            restarts: 1,
        }
    }
}

/// Minimise `objective` with the Nelder-Mead simplex method.
///
/// Points are clamped into `bounds` before evaluation and non-finite
/// objective values are treated as `+inf`, so models can reject
/// parameter regions by returning `NaN` or infinity.
///
/// # Example
/// ```
/// use anofox_autoforecast::utils::optimization::{nelder_mead, NelderMeadConfig};
///
/// let result = nelder_mead(
///     |x| (x[0] - 2.0).powi(2) + (x[1] - 3.0).powi(2),
///     &[0.0, 0.0],
///     None,
///     NelderMeadConfig::default(),
/// );
///
/// assert!(result.converged);
/// assert!((result.optimal_point[0] - 2.0).abs() < 0.01);
/// assert!((result.optimal_point[1] - 3.0).abs() < 0.01);
/// ```
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    if initial.is_empty() {
        return NelderMeadResult {
            optimal_point: vec![],
            optimal_value: objective(&[]),
            iterations: 0,
            converged: true,
        };
    }

    let mut start = clamp(initial, bounds);
    let mut total_iterations = 0;
    let mut best = (start.clone(), eval(&start));
    let mut converged = false;

    for _ in 0..config.restarts.max(1) {
        let (point, value, iterations, done) = run_simplex(&eval, &start, bounds, &config);
        total_iterations += iterations;
        converged = done;
        if value <= best.1 {
            best = (point, value);
        }
        start = best.0.clone();
    }

    NelderMeadResult {
        optimal_point: best.0,
        optimal_value: best.1,
        iterations: total_iterations,
        converged,
    }
}

fn run_simplex<F>(
    eval: &F,
    start: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> (Vec<f64>, f64, usize, bool)
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.to_vec());
    for i in 0..n {
        let mut vertex = start.to_vec();
        let step = if start[i].abs() > 1e-10 {
            config.initial_step * start[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        // Step inwards when the bound would collapse the vertex onto the start.
        let mut vertex = clamp(&vertex, bounds);
        if vertex[i] == start[i] {
            vertex[i] -= step;
            vertex = clamp(&vertex, bounds);
        }
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));
        let (best, worst, second_worst) = (order[0], order[n], order[n - 1]);

        let spread = values[worst] - values[best];
        let centroid = centroid_without(&simplex, worst);
        let size = simplex
            .iter()
            .map(|v| distance(v, &centroid))
            .fold(0.0, f64::max);
        if (spread.is_finite() && spread < config.tolerance) || size < config.tolerance {
            converged = true;
            break;
        }

        let reflected = clamp(&along(&centroid, &simplex[worst], -config.alpha), bounds);
        let reflected_value = eval(&reflected);

        if reflected_value < values[best] {
            let expanded = clamp(&along(&centroid, &reflected, config.gamma), bounds);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        let (toward, bound_value) = if reflected_value < values[worst] {
            (reflected.clone(), reflected_value)
        } else {
            (simplex[worst].clone(), values[worst])
        };
        let contracted = clamp(&along(&centroid, &toward, config.rho), bounds);
        let contracted_value = eval(&contracted);
        if contracted_value < bound_value {
            simplex[worst] = contracted;
            values[worst] = contracted_value;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let shrunk: Vec<f64> = anchor
                .iter()
                .zip(&simplex[i])
                .map(|(a, x)| a + config.sigma * (x - a))
                .collect();
            simplex[i] = clamp(&shrunk, bounds);
            values[i] = eval(&simplex[i]);
        }
    }

    let best = values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);

    (simplex[best].clone(), values[best], iterations, converged)
}

/// Centroid of all vertices except `exclude`.
fn centroid_without(simplex: &[Vec<f64>], exclude: usize) -> Vec<f64> {
    let dims = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; dims];
    for (i, vertex) in simplex.iter().enumerate() {
        if i != exclude {
            for (c, x) in centroid.iter_mut().zip(vertex) {
                *c += x;
            }
        }
    }
    centroid.iter_mut().for_each(|c| *c /= count);
    centroid
}

/// Point `centroid + t * (point - centroid)`.
fn along(centroid: &[f64], point: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(c, p)| c + t * (p - c))
        .collect()
}

fn clamp(point: &[f64], bounds: Option<&[(f64, f64)]>) -> Vec<f64> {
    match bounds {
        None => point.to_vec(),
        Some(b) => point
            .iter()
            .enumerate()
            .map(|(i, &x)| b.get(i).map_or(x, |&(lo, hi)| x.clamp(lo, hi)))
            .collect(),
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn minimises_rosenbrock() {
        let result = nelder_mead(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
            None,
            NelderMeadConfig {
                max_iter: 5000,
                tolerance: 1e-12,
                restarts: 2,
                ..Default::default()
            },
        );
        assert_relative_eq!(result.optimal_point[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.optimal_point[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let result = nelder_mead(
            |x| (x[0] - 5.0).powi(2),
            &[0.5],
            Some(&[(0.0, 1.0)]),
            NelderMeadConfig::default(),
        );
        assert!(result.optimal_point[0] <= 1.0);
        assert_relative_eq!(result.optimal_point[0], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn non_finite_objective_regions_are_avoided() {
        let result = nelder_mead(
            |x| {
                if x[0] < 0.0 {
                    f64::NAN
                } else {
                    (x[0] - 0.2).powi(2)
                }
            },
            &[0.5],
            None,
            NelderMeadConfig::default(),
        );
        assert!(result.optimal_value.is_finite());
        assert_relative_eq!(result.optimal_point[0], 0.2, epsilon = 1e-3);
    }

    #[test]
    fn empty_problem_evaluates_once() {
        let result = nelder_mead(|_| 3.0, &[], None, NelderMeadConfig::default());
        assert_eq!(result.optimal_value, 3.0);
        assert!(result.optimal_point.is_empty());
    }
}
