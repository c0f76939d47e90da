//! Snapshot document: the per-country artifact the dashboard reads.
//!
//! A snapshot is composed once per country per run from unrounded engine
//! output, rounded at composition, and never edited afterwards.

use crate::{
    channel::{ChannelBreakdown, ChannelBreakdownSummary},
    clock::DateRange,
    metrics::{MetricSet, MetricSummary},
    trend::{DailyPointSummary, DailyTrendPoint},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Unrounded metrics for one reporting period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodMetrics {
    pub range: DateRange,
    pub metrics: MetricSet,
    pub channels: Option<ChannelBreakdown>,
}

/// Everything the engines produced for one country.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotParts {
    pub generated_at: DateTime<Utc>,
    pub today: PeriodMetrics,
    pub same_day_last_week: PeriodMetrics,
    pub month_to_date: PeriodMetrics,
    pub month_to_date_last_month: PeriodMetrics,
    pub daily_history: Vec<DailyTrendPoint>,
    pub ma_short: MetricSet,
    pub ma_long: MetricSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayMetrics {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: MetricSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeMetrics {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(flatten)]
    pub metrics: MetricSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovingAverages {
    pub ma_short: MetricSummary,
    pub ma_long: MetricSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub today: DayMetrics,
    pub same_day_last_week: DayMetrics,
    pub mtd: RangeMetrics,
    pub mtd_last_month: RangeMetrics,
    pub daily_history: Vec<DailyPointSummary>,
    pub moving_averages: MovingAverages,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_breakdown_today: Option<ChannelBreakdownSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_breakdown_last_week: Option<ChannelBreakdownSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_breakdown_mtd: Option<ChannelBreakdownSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_breakdown_mtd_last_month: Option<ChannelBreakdownSummary>,
}

impl Snapshot {
    pub fn compose(parts: &SnapshotParts) -> Self {
        let channels = |p: &PeriodMetrics| p.channels.as_ref().map(ChannelBreakdown::summary);
        Self {
            last_updated: parts.generated_at,
            today: day(&parts.today),
            same_day_last_week: day(&parts.same_day_last_week),
            mtd: range(&parts.month_to_date),
            mtd_last_month: range(&parts.month_to_date_last_month),
            daily_history: parts.daily_history.iter().map(DailyTrendPoint::summary).collect(),
            moving_averages: MovingAverages {
                ma_short: parts.ma_short.summary(),
                ma_long: parts.ma_long.summary(),
            },
            channel_breakdown_today: channels(&parts.today),
            channel_breakdown_last_week: channels(&parts.same_day_last_week),
            channel_breakdown_mtd: channels(&parts.month_to_date),
            channel_breakdown_mtd_last_month: channels(&parts.month_to_date_last_month),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn day(period: &PeriodMetrics) -> DayMetrics {
    DayMetrics {
        date: period.range.end,
        metrics: period.metrics.summary(),
    }
}

fn range(period: &PeriodMetrics) -> RangeMetrics {
    RangeMetrics {
        start_date: period.range.start,
        end_date: period.range.end,
        metrics: period.metrics.summary(),
    }
}
