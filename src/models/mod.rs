//! Forecasting models.
//!
//! Every family implements [`Forecaster`]. A [`ModelStructure`] describes a
//! model without its estimated parameters, so the same model can be refitted
//! on a holdout split and again on the full series.

mod mean;
mod traits;

pub mod arima;
pub mod ensemble;
pub mod exponential;
pub mod intermittent;
pub mod ucm;

pub use mean::MeanModel;
pub use traits::{BoxedForecaster, Component, Forecaster};

use crate::error::Result;
use arima::{ArimaOrder, Arimax};
use ensemble::Ensemble;
use exponential::{EsmMethod, ExponentialSmoothing};
use intermittent::IdmMethod;
use serde::{Deserialize, Serialize};
use ucm::{Ucm, UcmSpec};

/// Model family. The declaration order is the selection tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelFamily {
    Esm,
    Idm,
    Ucm,
    Arimax,
    Combined,
}

impl ModelFamily {
    pub fn label(self) -> &'static str {
        match self {
            ModelFamily::Esm => "ESM",
            ModelFamily::Idm => "IDM",
            ModelFamily::Ucm => "UCM",
            ModelFamily::Arimax => "ARIMAX",
            ModelFamily::Combined => "COMBINED",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Structure of a candidate model: family variant and orders, without
/// estimated parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "spec", rename_all = "lowercase")]
pub enum ModelStructure {
    Mean,
    Esm(EsmMethod),
    Idm(IdmMethod),
    Ucm(UcmSpec),
    Arimax(ArimaOrder),
    Combined(Vec<ModelStructure>),
}

impl ModelStructure {
    /// Unfitted model with this structure.
    pub fn build(&self) -> Result<BoxedForecaster> {
        Ok(match self {
            ModelStructure::Mean => Box::new(MeanModel::new()),
            ModelStructure::Esm(method) => Box::new(ExponentialSmoothing::new(*method)),
            ModelStructure::Idm(method) => method.build()?,
            ModelStructure::Ucm(spec) => Box::new(Ucm::new(*spec)),
            ModelStructure::Arimax(order) => Box::new(Arimax::new(*order)),
            ModelStructure::Combined(members) => Box::new(Ensemble::new(
                members
                    .iter()
                    .map(|m| m.build())
                    .collect::<Result<Vec<_>>>()?,
            )),
        })
    }

    /// Label used in the output tables.
    pub fn label(&self) -> String {
        match self {
            ModelStructure::Mean => "MEAN".to_string(),
            ModelStructure::Esm(method) => format!("ESM({})", method.label()),
            ModelStructure::Idm(method) => format!("IDM({})", method.label()),
            ModelStructure::Ucm(spec) => spec.label(),
            ModelStructure::Arimax(order) => order.label(),
            ModelStructure::Combined(members) => format!(
                "COMBINED({})",
                members
                    .iter()
                    .map(|m| m.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    pub fn is_seasonal(&self) -> bool {
        match self {
            ModelStructure::Mean | ModelStructure::Idm(_) => false,
            ModelStructure::Esm(method) => method.is_seasonal(),
            ModelStructure::Ucm(spec) => spec.season.is_some(),
            ModelStructure::Arimax(order) => order.is_seasonal(),
            ModelStructure::Combined(members) => members.iter().any(|m| m.is_seasonal()),
        }
    }

    /// Whether the model uses the series' regressors.
    pub fn uses_regressors(&self) -> bool {
        match self {
            ModelStructure::Arimax(_) => true,
            ModelStructure::Combined(members) => members.iter().any(|m| m.uses_regressors()),
            _ => false,
        }
    }

    pub fn has_trend(&self) -> bool {
        match self {
            ModelStructure::Mean | ModelStructure::Idm(_) => false,
            ModelStructure::Esm(method) => method.has_trend(),
            ModelStructure::Ucm(spec) => spec.trend,
            ModelStructure::Arimax(order) => order.d + order.seasonal_d > 0,
            ModelStructure::Combined(members) => members.iter().any(|m| m.has_trend()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_order_for_tie_breaks() {
        assert!(ModelFamily::Esm < ModelFamily::Idm);
        assert!(ModelFamily::Ucm < ModelFamily::Arimax);
        assert!(ModelFamily::Arimax < ModelFamily::Combined);
    }

    #[test]
    fn structures_build_named_models() {
        let structure = ModelStructure::Combined(vec![
            ModelStructure::Esm(EsmMethod::Winters),
            ModelStructure::Arimax(ArimaOrder::new(1, 1, 1)),
        ]);
        assert_eq!(
            structure.label(),
            "COMBINED(ESM(ADDWINTERS), ARIMA(1,1,1))"
        );
        assert!(structure.is_seasonal());
        assert!(structure.has_trend());
        assert!(structure.uses_regressors());
        assert!(!ModelStructure::Mean.uses_regressors());
        assert_eq!(structure.build().unwrap().name(), "COMBINED");
        assert!(ModelStructure::Idm(IdmMethod::Best).build().is_err());
    }
}
