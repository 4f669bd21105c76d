//! Benchmarks for the forecasting run over many groups.

use anofox_autoforecast::core::Interval;
use anofox_autoforecast::prelude::*;
use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn monthly_frame(groups: usize, n: usize) -> SeriesFrame {
    let mut dates: Vec<DateTime<Utc>> = Vec::with_capacity(groups * n);
    let mut keys = Vec::with_capacity(groups * n);
    let mut values = Vec::with_capacity(groups * n);
    for g in 0..groups {
        for i in 0..n {
            let year = 2015 + (i / 12) as i32;
            let month = (i % 12) as u32 + 1;
            dates.push(Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap());
            keys.push(format!("G{g:03}"));
            let season = 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin();
            values.push(100.0 + g as f64 + 0.5 * i as f64 + season + ((i * 7 + g) % 5) as f64);
        }
    }
    SeriesFrame::new()
        .with_time_column("date", dates)
        .unwrap()
        .with_by_column("group", keys)
        .unwrap()
        .with_column("sales", values)
        .unwrap()
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("autoforecast_run");
    group.sample_size(10);

    for groups in [1, 8, 32].iter() {
        let frame = monthly_frame(*groups, 48);
        let config = ForecastConfig::new(
            TimeAxis::new("date", Interval::Month),
            VariableSpec::new("sales").with_by("group"),
        )
        .with_horizon(12);
        let forecaster = AutoForecast::new(config).unwrap();

        group.bench_with_input(BenchmarkId::new("all_families", groups), groups, |b, _| {
            b.iter(|| forecaster.run(black_box(&frame)).unwrap())
        });
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let frame = monthly_frame(8, 48);
    let config = ForecastConfig::new(
        TimeAxis::new("date", Interval::Month),
        VariableSpec::new("sales").with_by("group"),
    )
    .with_horizon(12)
    .with_select(SelectSpec::default().with_holdout(12).with_combine(true));
    let forecaster = AutoForecast::new(config).unwrap();

    let mut group = c.benchmark_group("selection");
    group.sample_size(10);
    group.bench_function("holdout_combined", |b| {
        b.iter(|| forecaster.run(black_box(&frame)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_run, bench_selection);
criterion_main!(benches);
