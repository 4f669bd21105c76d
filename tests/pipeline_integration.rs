//! End-to-end runs of the automatic forecasting pipeline.

use anofox_autoforecast::collect::{GroupStatus, JsonDirSink, Region, Severity};
use anofox_autoforecast::core::Interval;
use anofox_autoforecast::diagnose::DiagnoseSpec;
use anofox_autoforecast::models::arima::ArimaOrder;
use anofox_autoforecast::models::ModelFamily;
use anofox_autoforecast::prelude::*;
use anofox_autoforecast::store::EventKind;
use chrono::{DateTime, TimeZone, Utc};

fn years(from: i32, to: i32) -> Vec<DateTime<Utc>> {
    (from..=to)
        .map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap())
        .collect()
}

fn months(start_year: i32, n: usize) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|i| {
            let year = start_year + (i / 12) as i32;
            let month = (i % 12) as u32 + 1;
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
        })
        .collect()
}

fn revenue_frame() -> SeriesFrame {
    SeriesFrame::new()
        .with_time_column("date", years(1990, 2000))
        .unwrap()
        .with_column("revenues", vec![4.0, 5.0, 7.0, 6.0, 8.0, 9.0, 5.0, 2.0, 3.5, 5.5, 6.5])
        .unwrap()
}

fn revenue_config() -> ForecastConfig {
    ForecastConfig::new(TimeAxis::new("date", Interval::Year), VariableSpec::new("revenues"))
        .with_horizon(12)
        .with_diagnose(
            DiagnoseSpec::with_families(&[ModelFamily::Arimax]).with_arima_order(ArimaOrder::new(1, 1, 1)),
        )
}

/// Two stores, three years of monthly sales with a price input and a
/// promotion event.
fn store_frame() -> SeriesFrame {
    let n = 36;
    let mut dates = months(2019, n);
    dates.extend(months(2019, n));
    let stores: Vec<String> = (0..2 * n)
        .map(|i| if i < n { "B" } else { "A" }.to_string())
        .collect();
    let price: Vec<f64> = (0..2 * n).map(|i| 10.0 + ((i * 3) % 7) as f64 * 0.5).collect();
    let sales: Vec<f64> = (0..2 * n)
        .map(|i| {
            let t = (i % n) as f64;
            let level = if i < n { 120.0 } else { 80.0 };
            level + 0.8 * t - 2.0 * price[i] + ((i * 5) % 11) as f64
        })
        .collect();
    let promo = EventDefinition::pulse("promo", Utc.with_ymd_and_hms(2020, 11, 1, 0, 0, 0).unwrap());

    SeriesFrame::new()
        .with_time_column("date", dates)
        .unwrap()
        .with_by_column("store", stores)
        .unwrap()
        .with_column("sales", sales)
        .unwrap()
        .with_column("price", price)
        .unwrap()
        .with_event(promo)
}

fn store_config() -> ForecastConfig {
    ForecastConfig::new(
        TimeAxis::new("date", Interval::Month),
        VariableSpec::new("sales")
            .with_by("store")
            .with_input("price")
            .with_event("promo"),
    )
    .with_horizon(6)
}

#[test]
fn revenue_scenario_forecasts_2001_to_2012() {
    let outcome = AutoForecast::new(revenue_config())
        .unwrap()
        .run(&revenue_frame())
        .unwrap();
    assert!(outcome.fatal.is_none());

    let tables = outcome.tables;
    let future: Vec<_> = tables.outfor.iter().filter(|r| r.is_future()).collect();
    assert_eq!(future.len(), 12);
    for (record, time) in future.iter().zip(years(2001, 2012)) {
        assert_eq!(record.time, time);
        assert!(!record.error);
        for value in [record.predict, record.std, record.lower, record.upper] {
            assert!(value.is_some_and(f64::is_finite));
        }
    }
    assert_eq!(tables.errors().count(), 0);
    assert_eq!(tables.outmodelinfo.len(), 1);
    assert_eq!(tables.outmodelinfo[0].status, GroupStatus::Forecast);
}

#[test]
fn tables_are_written_as_json_files() {
    let tables = AutoForecast::new(revenue_config())
        .unwrap()
        .run(&revenue_frame())
        .unwrap()
        .into_result()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut sink = JsonDirSink::new(dir.path()).unwrap();
    tables.write_to(&mut sink).unwrap();

    for name in tables.table_names() {
        assert!(sink.path_for(name).exists(), "{name} was not written");
    }
    let text = std::fs::read_to_string(sink.path_for("outfor")).unwrap();
    let rows: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(rows.len(), 11 + 12);
    assert_eq!(rows[0]["ACTUAL"], 4.0);
    assert!(rows[22]["PREDICT"].is_number());
}

#[test]
fn groups_with_inputs_and_events_fill_every_optional_table() {
    let config = store_config().with_outputs(OptionalOutputs::all());
    let tables = AutoForecast::new(config)
        .unwrap()
        .run(&store_frame())
        .unwrap()
        .into_result()
        .unwrap();

    let keys: Vec<&str> = tables
        .outmodelinfo
        .iter()
        .map(|r| r.key.get("store").unwrap())
        .collect();
    assert_eq!(keys, vec!["A", "B"]);
    assert_eq!(tables.outfor.iter().filter(|r| r.is_future()).count(), 2 * 6);

    assert_eq!(tables.outevent.as_ref().unwrap().len(), 1);
    let dummies = tables.outeventdummy.as_ref().unwrap();
    assert_eq!(dummies.len(), 2 * (36 + 6));
    let pulse: Vec<_> = dummies.iter().filter(|r| r.value == Some(1.0)).collect();
    assert_eq!(pulse.len(), 2);
    assert_eq!(tables.outindep.as_ref().unwrap().len(), 2 * (36 + 6));
    assert!(!tables.outest.as_ref().unwrap().is_empty());
    assert_eq!(tables.outfmsg.as_ref().unwrap().len(), 1);
}

#[test]
fn requesting_events_without_events_logs_one_warning() {
    let config = revenue_config().with_outputs(
        OptionalOutputs::none()
            .with(OptionalTable::OutEvent)
            .with(OptionalTable::OutEventDummy),
    );
    let tables = AutoForecast::new(config)
        .unwrap()
        .run(&revenue_frame())
        .unwrap()
        .tables;
    assert!(tables.outevent.is_none());
    assert!(tables.outeventdummy.is_none());
    let warnings = tables
        .outlog
        .iter()
        .filter(|e| e.severity == Severity::Warning && e.message.starts_with("OUTEVENT "))
        .count();
    assert_eq!(warnings, 1);
}

#[test]
fn intermittent_demand_is_forecast_by_idm() {
    let demand = vec![
        0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 0.0, 6.0, 0.0, 0.0, 2.0,
        0.0, 0.0, 0.0, 4.0, 0.0, 0.0,
    ];
    let frame = SeriesFrame::new()
        .with_time_column("date", months(2020, demand.len()))
        .unwrap()
        .with_column("units", demand)
        .unwrap();
    let config = ForecastConfig::new(TimeAxis::new("date", Interval::Month), VariableSpec::new("units"))
        .with_horizon(4);

    let tables = AutoForecast::new(config).unwrap().run(&frame).unwrap().tables;
    assert_eq!(tables.outmodelinfo[0].family, Some(ModelFamily::Idm));
    let future: Vec<f64> = tables
        .outfor
        .iter()
        .filter(|r| r.is_future())
        .map(|r| r.predict.unwrap())
        .collect();
    assert_eq!(future.len(), 4);
    assert!(future.iter().all(|p| *p > 0.0 && *p < 6.0));
}

#[test]
fn holdout_and_combining_show_in_the_selection_table() {
    let config = store_config().with_select(
        SelectSpec::default()
            .with_criterion(SelectionCriterion::Rmse)
            .with_holdout(6)
            .with_combine(true),
    );
    let tables = AutoForecast::new(config).unwrap().run(&store_frame()).unwrap().tables;

    assert!(tables.outmodelinfo.iter().all(|r| r.holdout == 6));
    assert!(tables.outselect.iter().any(|r| r.region == Region::Forecast));
    assert!(tables
        .outselect
        .iter()
        .any(|r| r.score.family == ModelFamily::Combined));
    assert_eq!(tables.outselect.iter().filter(|r| r.selected && r.region == Region::Fit).count(), 2);
}

#[test]
fn event_kinds_parse_from_configuration_names() {
    let kind: EventKind = serde_json::from_str("\"LEVELSHIFT\"").unwrap();
    assert_eq!(kind, EventKind::LevelShift);
}
