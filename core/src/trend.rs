//! Trend engine: daily buckets and moving averages.
//!
//! Buckets are keyed by the country-local calendar date. Days with no
//! orders are absent from the series; a moving average spans the most
//! recent N days that are present, not N calendar days.

use crate::{
    metrics::{compute_metrics, CurrencyRate, MetricSet, MetricSummary},
    record::OrderRecord,
};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyTrendPoint {
    pub date: NaiveDate,
    pub metrics: MetricSet,
}

impl DailyTrendPoint {
    pub fn summary(&self) -> DailyPointSummary {
        DailyPointSummary {
            date: self.date,
            metrics: self.metrics.summary(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPointSummary {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: MetricSummary,
}

/// One point per local date that has at least one record, ascending.
pub fn daily_series(
    records: &[OrderRecord],
    rate: CurrencyRate,
    offset: FixedOffset,
) -> Vec<DailyTrendPoint> {
    let mut by_day: BTreeMap<NaiveDate, Vec<OrderRecord>> = BTreeMap::new();
    for record in records {
        by_day
            .entry(record.local_date(offset))
            .or_default()
            .push(record.clone());
    }
    by_day
        .into_iter()
        .map(|(date, day)| DailyTrendPoint {
            date,
            metrics: compute_metrics(&day, rate),
        })
        .collect()
}

/// A moving average plus how many days actually went into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverage {
    pub metrics: MetricSet,
    pub window_days: usize,
    pub days_used: usize,
}

impl MovingAverage {
    pub fn is_clamped(&self) -> bool {
        self.days_used < self.window_days
    }
}

pub fn moving_average_with_coverage(
    series: &[DailyTrendPoint],
    window_days: usize,
) -> MovingAverage {
    let days_used = window_days.min(series.len());
    if days_used < window_days {
        log::warn!(
            "only {} days available for a {window_days}-day moving average",
            series.len()
        );
    }
    let recent: Vec<MetricSet> = series[series.len() - days_used..]
        .iter()
        .map(|p| p.metrics)
        .collect();
    MovingAverage {
        metrics: MetricSet::mean_of(&recent),
        window_days,
        days_used,
    }
}

/// Mean of the last `window_days` points, clamped to what the series has.
pub fn moving_average(series: &[DailyTrendPoint], window_days: usize) -> MetricSet {
    moving_average_with_coverage(series, window_days).metrics
}

/// Replace the point for `date` with `metrics`, inserting it in order if
/// missing. Used to make the series agree with the hour-limited headline.
pub fn overwrite_day(series: &mut Vec<DailyTrendPoint>, date: NaiveDate, metrics: MetricSet) {
    match series.binary_search_by_key(&date, |p| p.date) {
        Ok(idx) => series[idx].metrics = metrics,
        Err(idx) if metrics.order_count > 0.0 => {
            series.insert(idx, DailyTrendPoint { date, metrics })
        }
        Err(_) => {}
    }
}
