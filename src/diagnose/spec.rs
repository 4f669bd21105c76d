//! Diagnosis settings.

use crate::error::{ForecastError, Result};
use crate::models::arima::{ArimaOrder, IdentifyConfig};
use crate::models::exponential::EsmMethod;
use crate::models::intermittent::IdmMethod;
use crate::models::ModelFamily;
use serde::{Deserialize, Serialize};

/// Intermittency threshold that disables intermittent routing.
pub const INTERMITTENCY_DISABLED: f64 = 1_000_000.0;

fn default_min_obs() -> usize {
    5
}

fn default_min_season_cycles() -> usize {
    2
}

fn default_intermittency() -> f64 {
    2.0
}

/// Observation requirements of the model classes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Minimum observations for any model other than the mean.
    #[serde(default = "default_min_obs")]
    pub min_obs_non_mean: usize,
    /// Minimum observations for trend models.
    #[serde(default = "default_min_obs")]
    pub min_obs_trend: usize,
    /// Minimum number of seasonal cycles for seasonal models.
    #[serde(default = "default_min_season_cycles")]
    pub min_season_cycles: usize,
    /// Average demand interval above which a series is intermittent.
    #[serde(default = "default_intermittency")]
    pub intermittency: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_obs_non_mean: default_min_obs(),
            min_obs_trend: default_min_obs(),
            min_season_cycles: default_min_season_cycles(),
            intermittency: default_intermittency(),
        }
    }
}

fn default_esm_methods() -> Vec<EsmMethod> {
    EsmMethod::ALL.to_vec()
}

/// Exponential smoothing settings. The best of `methods` is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsmSpec {
    #[serde(default = "default_esm_methods")]
    pub methods: Vec<EsmMethod>,
}

impl Default for EsmSpec {
    fn default() -> Self {
        Self {
            methods: default_esm_methods(),
        }
    }
}

/// Intermittent demand settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IdmSpec {
    #[serde(default)]
    pub method: IdmMethod,
}

/// ARIMAX settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArimaxSpec {
    /// Fixed order; when absent the order is identified.
    #[serde(default)]
    pub order: Option<ArimaOrder>,
    #[serde(default)]
    pub identify: IdentifyConfig,
}

fn default_families() -> Vec<ModelFamily> {
    vec![
        ModelFamily::Esm,
        ModelFamily::Idm,
        ModelFamily::Ucm,
        ModelFamily::Arimax,
    ]
}

/// Enabled families and their settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnoseSpec {
    #[serde(default = "default_families")]
    pub families: Vec<ModelFamily>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub esm: EsmSpec,
    #[serde(default)]
    pub idm: IdmSpec,
    #[serde(default)]
    pub arimax: ArimaxSpec,
}

impl Default for DiagnoseSpec {
    fn default() -> Self {
        Self {
            families: default_families(),
            constraints: Constraints::default(),
            esm: EsmSpec::default(),
            idm: IdmSpec::default(),
            arimax: ArimaxSpec::default(),
        }
    }
}

impl DiagnoseSpec {
    /// Spec with only the given families enabled.
    pub fn with_families(families: &[ModelFamily]) -> Self {
        Self {
            families: families.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_arima_order(mut self, order: ArimaOrder) -> Self {
        self.arimax.order = Some(order);
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn is_enabled(&self, family: ModelFamily) -> bool {
        self.families.contains(&family)
    }

    /// Intermittency threshold in effect, the sentinel when IDM is disabled.
    pub fn intermittency_threshold(&self) -> f64 {
        if self.is_enabled(ModelFamily::Idm) {
            self.constraints.intermittency
        } else {
            INTERMITTENCY_DISABLED
        }
    }

    /// First enabled family in tie-break order.
    pub fn first_family(&self) -> Option<ModelFamily> {
        self.families.iter().copied().min()
    }

    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() {
            return Err(ForecastError::Configuration(
                "no model family is enabled".to_string(),
            ));
        }
        if self.is_enabled(ModelFamily::Combined) {
            return Err(ForecastError::Configuration(
                "COMBINED is not a diagnosed family, enable combining in the selection".to_string(),
            ));
        }
        if !(self.constraints.intermittency > 0.0) {
            return Err(ForecastError::Configuration(format!(
                "intermittency threshold must be positive, got {}",
                self.constraints.intermittency
            )));
        }
        if self.constraints.min_season_cycles == 0 {
            return Err(ForecastError::Configuration(
                "at least one seasonal cycle is required for seasonal models".to_string(),
            ));
        }
        if self.is_enabled(ModelFamily::Esm) && self.esm.methods.is_empty() {
            return Err(ForecastError::Configuration(
                "ESM is enabled without smoothing methods".to_string(),
            ));
        }
        Ok(())
    }
}
