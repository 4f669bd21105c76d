//! # anofox-autoforecast
//!
//! Automatic time series forecasting over many series at once.
//!
//! A run loads a columnar frame into one series per BY group, proposes
//! candidate models from the enabled families (exponential smoothing,
//! intermittent demand, unobserved components, ARIMA with regressors),
//! selects the best candidate per group by a fit criterion with an optional
//! holdout, forecasts it with prediction intervals and assembles the result
//! tables. Groups are processed in parallel.
//!
//! ```
//! use anofox_autoforecast::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! let dates = (1990..=2000)
//!     .map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap())
//!     .collect();
//! let frame = SeriesFrame::new()
//!     .with_time_column("date", dates)
//!     .unwrap()
//!     .with_column("revenues", vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5])
//!     .unwrap();
//!
//! let config = ForecastConfig::from_json_str(
//!     r#"{
//!         "time_axis": {"id": "date", "interval": "year"},
//!         "variables": {"dependent": "revenues"},
//!         "forecast": {"horizon": 12},
//!         "diagnose": {"families": ["ARIMAX"], "arimax": {"order": {"p": 1, "d": 1, "q": 1}}}
//!     }"#,
//! )
//! .unwrap();
//! let outcome = AutoForecast::new(config).unwrap().run(&frame).unwrap();
//! assert!(outcome.fatal.is_none());
//! assert_eq!(outcome.tables.outfor.len(), 11 + 12);
//! ```

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod collect;
pub mod config;
pub mod core;
pub mod diagnose;
pub mod engine;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod select;
pub mod store;
pub mod utils;

pub use config::ForecastConfig;
pub use error::{ForecastError, Result};
pub use pipeline::{AutoForecast, RunOutcome};

pub mod prelude {
    pub use crate::collect::{
        JsonDirSink, MemorySink, OptionalOutputs, OptionalTable, ResultTables, TableSink,
    };
    pub use crate::config::ForecastConfig;
    pub use crate::core::{GroupKey, Interval, TimeSeries};
    pub use crate::diagnose::DiagnoseSpec;
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{Forecaster, ModelFamily};
    pub use crate::pipeline::{AutoForecast, RunOutcome};
    pub use crate::select::{SelectSpec, SelectionCriterion};
    pub use crate::store::{EventDefinition, SeriesFrame, TimeAxis, VariableSpec};
}
