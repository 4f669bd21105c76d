//! Utility functions for forecasting models.

pub mod estimates;
pub mod metrics;
pub mod ols;
pub mod optimization;
pub mod stats;

pub use estimates::ParameterEstimate;
pub use metrics::FitStatistics;
pub use ols::{ols_fit, OLSResult};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};
pub use stats::quantile_normal;
