//! The extraction engine: one batch pass over every configured country.
//!
//! PER-COUNTRY DATA FLOW (fixed):
//!   1. recent tier, history window (trend series, MTD fallback, today's rows)
//!   2. recent tier, today and same day last week, both cut at the current
//!      local hour (headline comparisons)
//!   3. historical tier, month start through yesterday (MTD)
//!   4. historical tier, today and same day last week, hour-cut
//!      (channel attribution only)
//!   5. historical tier, MTD-last-month range
//!
//! RULES:
//!   - One source handle for the whole run, reused for every query.
//!   - Engines below are pure functions of their inputs.
//!   - A country's failure never blocks the others, except `SourceUnavailable`,
//!     which ends the run after the manifest is updated for countries that
//!     already completed.
//!   - The manifest is read-modify-written once, after all countries.

use crate::{
    channel::compute_channel_breakdown,
    clock::{DateRange, RunClock},
    config::{CountryContext, PulseConfig},
    error::{PulseError, PulseResult},
    metrics::compute_metrics,
    reconciliation::reconcile_month_to_date,
    record::OrderRecord,
    snapshot::{PeriodMetrics, Snapshot, SnapshotParts},
    source::OrderSource,
    trend::{daily_series, moving_average_with_coverage, overwrite_day},
    types::{Country, RunId},
    writer::{Manifest, SnapshotWriter},
};
use chrono::Duration;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct RunReport {
    pub run_id: RunId,
    /// Country → versioned artifact written this run.
    pub written: BTreeMap<Country, String>,
    pub failed: Vec<(Country, String)>,
    pub manifest: Option<Manifest>,
    pub pruned: usize,
}

pub struct ExtractionEngine<S> {
    pub run_id: RunId,
    pub clock: RunClock,
    config: PulseConfig,
    source: S,
    writer: SnapshotWriter,
}

impl<S: OrderSource> ExtractionEngine<S> {
    pub fn new(config: PulseConfig, clock: RunClock, source: S, writer: SnapshotWriter) -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            clock,
            config,
            source,
            writer,
        }
    }

    /// Process every configured country.
    pub fn run(&self) -> PulseResult<RunReport> {
        let countries: Vec<Country> = self.config.countries.iter().map(|p| p.country).collect();
        self.run_countries(&countries)
    }

    pub fn run_countries(&self, countries: &[Country]) -> PulseResult<RunReport> {
        log::info!(
            "{}: starting extraction for {} countries as of {}",
            self.run_id,
            countries.len(),
            self.clock.now
        );
        let mut report = RunReport {
            run_id: self.run_id.clone(),
            ..RunReport::default()
        };
        let mut fatal: Option<PulseError> = None;

        for &country in countries {
            log::info!("{}: processing country={country}", self.run_id);
            match self.process_country(country) {
                Ok(artifact_id) => {
                    report.written.insert(country, artifact_id);
                }
                Err(e @ PulseError::SourceUnavailable { .. }) => {
                    log::error!("{}: country={country} aborted run: {e}", self.run_id);
                    report.failed.push((country, e.to_string()));
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    log::error!("{}: country={country} failed: {e}", self.run_id);
                    report.failed.push((country, e.to_string()));
                }
            }
        }

        if report.written.is_empty() {
            log::warn!("{}: no snapshot written, manifest left unchanged", self.run_id);
        } else {
            match self.writer.write_manifest(&report.written, self.clock.now) {
                Ok(manifest) => report.manifest = Some(manifest),
                Err(e) => log::error!("{}: manifest write failed: {e}", self.run_id),
            }
        }

        let current = match &report.manifest {
            Some(m) => m.files.clone(),
            None => self
                .writer
                .read_manifest()
                .ok()
                .flatten()
                .map(|m| m.files)
                .unwrap_or_default(),
        };
        for &country in countries {
            let protected = current.get(&country.file_stem()).map(String::as_str);
            report.pruned += self.writer.prune(country, protected).deleted.len();
        }

        match fatal {
            Some(e) => Err(e),
            None => {
                log::info!(
                    "{}: extraction completed, {} written, {} failed",
                    self.run_id,
                    report.written.len(),
                    report.failed.len()
                );
                Ok(report)
            }
        }
    }

    fn process_country(&self, country: Country) -> PulseResult<String> {
        let parts = self.build_snapshot(country)?;
        let snapshot = Snapshot::compose(&parts);
        let artifact_id = self.writer.write(country, &snapshot, self.clock.now)?;
        log::info!(
            "country={country} today GMV: {}, orders: {}",
            snapshot.today.metrics.total_gmv,
            snapshot.today.metrics.order_count
        );
        log::info!(
            "country={country} last week (same time) GMV: {}, orders: {}",
            snapshot.same_day_last_week.metrics.total_gmv,
            snapshot.same_day_last_week.metrics.order_count
        );
        Ok(artifact_id)
    }

    /// Fetch, reconcile and compute everything for one country.
    pub fn build_snapshot(&self, country: Country) -> PulseResult<SnapshotParts> {
        let ctx = self.config.context_for(country)?;
        let offset = ctx.offset;
        let today = self.clock.today(offset);
        let cutoff = self.clock.hour_cutoff(offset);
        let last_week = self.clock.same_day_last_week(offset);
        let mtd = self.clock.month_to_date(offset);
        let mtd_last_month = self.clock.month_to_date_last_month(offset);
        let history = self.clock.history(offset, self.config.history_days.max(1));
        let window = DateRange::new(history.start.min(mtd.start), today);

        log::info!(
            "country={country} local now {} (cutoff hour {cutoff})",
            self.clock.local_now(offset).format("%Y-%m-%d %H:%M:%S")
        );

        let recent_window = self.source.fetch_recent(country, window, None)?;
        let today_cut = self
            .source
            .fetch_recent(country, DateRange::single(today), Some(cutoff))?;
        let last_week_cut = self
            .source
            .fetch_recent(country, DateRange::single(last_week), Some(cutoff))?;

        let yesterday = today - Duration::days(1);
        let historical_mtd = if mtd.start <= yesterday {
            self.source
                .fetch_historical(country, DateRange::new(mtd.start, yesterday))?
        } else {
            Vec::new()
        };
        let historical_today = self.hour_cut_historical(&ctx, today, cutoff)?;
        let historical_last_week = self.hour_cut_historical(&ctx, last_week, cutoff)?;
        let historical_last_month = self.source.fetch_historical(country, mtd_last_month)?;
        if historical_last_month.is_empty() {
            log::warn!(
                "country={country} no historical rows for {}..{}",
                mtd_last_month.start,
                mtd_last_month.end
            );
        }

        let mtd_records =
            reconcile_month_to_date(&historical_mtd, &recent_window, mtd, today, offset);

        let today_metrics = compute_metrics(&today_cut, ctx.rate);
        let last_week_metrics = compute_metrics(&last_week_cut, ctx.rate);

        let history_records: Vec<OrderRecord> = recent_window
            .iter()
            .filter(|r| history.contains(r.local_date(offset)))
            .cloned()
            .collect();
        let mut daily_history = daily_series(&history_records, ctx.rate, offset);
        overwrite_day(&mut daily_history, today, today_metrics);

        let windows = self.config.moving_average_windows;
        let ma_short = moving_average_with_coverage(&daily_history, windows.short);
        let ma_long = moving_average_with_coverage(&daily_history, windows.long);
        log::debug!(
            "country={country} moving averages over {}/{} and {}/{} days",
            ma_short.days_used,
            ma_short.window_days,
            ma_long.days_used,
            ma_long.window_days
        );

        let growth = self.config.growth_channel.as_str();
        let breakdown = |records: &[OrderRecord]| {
            Some(compute_channel_breakdown(records, ctx.rate, growth))
        };

        Ok(SnapshotParts {
            generated_at: self.clock.now,
            today: PeriodMetrics {
                range: DateRange::single(today),
                metrics: today_metrics,
                channels: breakdown(prefer(&historical_today, &today_cut)),
            },
            same_day_last_week: PeriodMetrics {
                range: DateRange::single(last_week),
                metrics: last_week_metrics,
                channels: breakdown(prefer(&historical_last_week, &last_week_cut)),
            },
            month_to_date: PeriodMetrics {
                range: mtd,
                metrics: compute_metrics(&mtd_records, ctx.rate),
                channels: breakdown(&mtd_records),
            },
            month_to_date_last_month: PeriodMetrics {
                range: mtd_last_month,
                metrics: compute_metrics(&historical_last_month, ctx.rate),
                channels: breakdown(&historical_last_month),
            },
            daily_history,
            ma_short: ma_short.metrics,
            ma_long: ma_long.metrics,
        })
    }

    /// Historical rows for one day, limited to the same local hour cutoff
    /// as the headline figures. Channel attribution comes from here rather
    /// than from the recent tier, whose channel column lags.
    fn hour_cut_historical(
        &self,
        ctx: &CountryContext,
        day: chrono::NaiveDate,
        cutoff: u32,
    ) -> PulseResult<Vec<OrderRecord>> {
        let rows = self
            .source
            .fetch_historical(ctx.country, DateRange::single(day))?;
        Ok(rows
            .into_iter()
            .filter(|r| r.local_hour(ctx.offset) <= cutoff)
            .collect())
    }
}

/// The attributed slice when it has data, otherwise the fallback.
fn prefer<'a>(attributed: &'a [OrderRecord], fallback: &'a [OrderRecord]) -> &'a [OrderRecord] {
    if attributed.is_empty() {
        fallback
    } else {
        attributed
    }
}
