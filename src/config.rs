//! Run configuration.
//!
//! Every field has a default so a configuration can be as small as the
//! dependent variable:
//!
//! ```
//! use anofox_autoforecast::ForecastConfig;
//!
//! let config = ForecastConfig::from_json_str(r#"{"variables": {"dependent": "revenue"}}"#).unwrap();
//! assert_eq!(config.forecast.horizon, 12);
//! assert!(!config.error_stop);
//! ```

use crate::collect::OptionalOutputs;
use crate::diagnose::DiagnoseSpec;
use crate::engine::EngineSpec;
use crate::error::{ForecastError, Result};
use crate::select::SelectSpec;
use crate::store::{TimeAxis, VariableSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

/// Complete configuration of one forecasting run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default)]
    pub time_axis: TimeAxis,
    #[serde(default)]
    pub variables: VariableSpec,
    #[serde(default)]
    pub forecast: EngineSpec,
    #[serde(default)]
    pub diagnose: DiagnoseSpec,
    #[serde(default)]
    pub select: SelectSpec,
    /// Optional tables to produce.
    #[serde(default)]
    pub outputs: OptionalOutputs,
    /// Stop the run at the first group that cannot be forecast.
    #[serde(default)]
    pub error_stop: bool,
    /// Worker threads; the global rayon pool when unset.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl ForecastConfig {
    pub fn new(time_axis: TimeAxis, variables: VariableSpec) -> Self {
        Self {
            time_axis,
            variables,
            ..Self::default()
        }
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.forecast.horizon = horizon;
        self
    }

    pub fn with_diagnose(mut self, diagnose: DiagnoseSpec) -> Self {
        self.diagnose = diagnose;
        self
    }

    pub fn with_select(mut self, select: SelectSpec) -> Self {
        self.select = select;
        self
    }

    pub fn with_outputs(mut self, outputs: OptionalOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_error_stop(mut self, error_stop: bool) -> Self {
        self.error_stop = error_stop;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ForecastConfig = serde_json::from_str(text)
            .map_err(|e| ForecastError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForecastError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Check every setting; nothing is processed when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.variables.dependent.is_empty() {
            return Err(ForecastError::Configuration(
                "no dependent variable given".to_string(),
            ));
        }
        if self.time_axis.id.is_empty() {
            return Err(ForecastError::Configuration("no time id given".to_string()));
        }
        if self.threads == Some(0) {
            return Err(ForecastError::Configuration(
                "threads must be at least 1".to_string(),
            ));
        }
        self.forecast.validate()?;
        self.diagnose.validate()?;
        self.select.validate()?;
        Ok(())
    }

    /// Model selection graph: the families, selection rule and forecast
    /// settings of the run as a JSON document.
    pub fn selection_graph(&self) -> Value {
        let families: Vec<&str> = self.diagnose.families.iter().map(|f| f.label()).collect();
        json!({
            "name": "AUTOFORECAST",
            "diagnose": {
                "families": families,
                "constraints": self.diagnose.constraints,
                "esm": self.diagnose.esm,
                "idm": self.diagnose.idm,
                "arimax": self.diagnose.arimax,
            },
            "select": {
                "criterion": self.select.criterion.name(),
                "holdout": self.select.holdout_size,
                "holdoutpct": self.select.holdout_percent,
                "seasontest": self.select.season_test,
                "combine": self.select.combine,
            },
            "forecast": {
                "lead": self.forecast.horizon,
                "alpha": 1.0 - self.forecast.confidence_level,
            },
        })
    }
}
