//! ARIMA models with regressors and automatic order identification.

pub mod diff;
mod identify;
mod model;

pub use identify::{
    choose_differencing, choose_seasonal_differencing, ArimaIdentifier, Identification,
    IdentifiedModel, IdentifyConfig,
};
pub use model::{ArimaOrder, Arimax};
