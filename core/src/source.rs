//! Source contract: how the core asks for orders.
//!
//! Two tiers sit behind one trait:
//!   - recent:     fast, append-only, channel/status may lag. The adapter
//!                 returns at most one row per order (latest arrival).
//!   - historical: deduplicated and fully attributed, complete only
//!                 through yesterday. Status, channel and vendor
//!                 exclusions are applied source-side.
//!
//! The core only ever sees `Ok(records)` or a terminal `SourceUnavailable`.
//! Retrying is the job of `RetryingSource`, never of the callers.

use crate::{
    clock::DateRange,
    config::PulseConfig,
    error::{PulseError, PulseResult},
    record::OrderRecord,
    types::{Country, SourceTier},
};
use chrono::FixedOffset;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub trait OrderSource {
    /// Recent-tier rows whose local placement date is in `range` and, when
    /// `hour_cutoff` is set, whose local placement hour is `<= hour_cutoff`.
    fn fetch_recent(
        &self,
        country: Country,
        range: DateRange,
        hour_cutoff: Option<u32>,
    ) -> PulseResult<Vec<OrderRecord>>;

    /// Historical-tier rows whose local placement date is in `range`.
    fn fetch_historical(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<OrderRecord>>;
}

impl<S: OrderSource + ?Sized> OrderSource for Box<S> {
    fn fetch_recent(
        &self,
        country: Country,
        range: DateRange,
        hour_cutoff: Option<u32>,
    ) -> PulseResult<Vec<OrderRecord>> {
        (**self).fetch_recent(country, range, hour_cutoff)
    }

    fn fetch_historical(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<OrderRecord>> {
        (**self).fetch_historical(country, range)
    }
}

// ── Source-side filtering ──────────────────────────────────────────

/// The exclusion rules a source adapter applies before handing rows over.
#[derive(Debug, Clone)]
pub struct SourceRules {
    offsets: HashMap<Country, FixedOffset>,
    excluded_statuses: HashSet<String>,
    allowed_channels: HashSet<String>,
    excluded_vendor_ids: HashSet<String>,
}

impl SourceRules {
    pub fn from_config(config: &PulseConfig) -> PulseResult<Self> {
        let mut offsets = HashMap::new();
        for profile in &config.countries {
            offsets.insert(profile.country, profile.offset()?);
        }
        Ok(Self {
            offsets,
            excluded_statuses: upper_set(&config.excluded_statuses),
            allowed_channels: upper_set(&config.allowed_channels),
            excluded_vendor_ids: config.excluded_vendor_ids.iter().cloned().collect(),
        })
    }

    pub fn offset(&self, country: Country) -> PulseResult<FixedOffset> {
        self.offsets
            .get(&country)
            .copied()
            .ok_or_else(|| PulseError::InvalidConfig(format!("{country} has no utc offset")))
    }

    /// Recent rows may not be attributed yet, so only a known, disallowed
    /// channel excludes them.
    pub fn admits_recent(&self, record: &OrderRecord) -> bool {
        !record.channel.is_known() || self.channel_allowed(record)
    }

    pub fn admits_historical(&self, record: &OrderRecord) -> bool {
        record.channel.is_known()
            && self.channel_allowed(record)
            && !self.excluded_statuses.contains(record.status.tag())
            && !self.excluded_vendor_ids.contains(&record.vendor_id)
    }

    fn channel_allowed(&self, record: &OrderRecord) -> bool {
        self.allowed_channels.is_empty()
            || self
                .allowed_channels
                .contains(&record.channel.tag().to_ascii_uppercase())
    }
}

fn upper_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.trim().to_ascii_uppercase()).collect()
}

/// Local date window plus optional inclusive local-hour cutoff.
pub fn in_window(
    record: &OrderRecord,
    offset: FixedOffset,
    range: DateRange,
    hour_cutoff: Option<u32>,
) -> bool {
    range.contains(record.local_date(offset))
        && hour_cutoff.map_or(true, |cutoff| record.local_hour(offset) <= cutoff)
}

// ── Bounded retry ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `i` (0-based). The last entry repeats.
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff
            .get(attempt as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// the attempt budget is spent. Exhaustion becomes `SourceUnavailable`.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> PulseResult<T>) -> PulseResult<T> {
        let mut last_reason = String::new();
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.delay_before(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    log::warn!(
                        "{what}: attempt {}/{} failed: {e}",
                        attempt + 1,
                        self.max_attempts
                    );
                    last_reason = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        log::error!("{what}: all {} attempts failed", self.max_attempts);
        Err(PulseError::SourceUnavailable {
            what: what.to_string(),
            attempts: self.max_attempts,
            reason: last_reason,
        })
    }
}

/// Wraps any source with a retry policy.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: OrderSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: OrderSource> OrderSource for RetryingSource<S> {
    fn fetch_recent(
        &self,
        country: Country,
        range: DateRange,
        hour_cutoff: Option<u32>,
    ) -> PulseResult<Vec<OrderRecord>> {
        let what = format!("{} source for {country}", SourceTier::Recent);
        self.policy
            .run(&what, || self.inner.fetch_recent(country, range, hour_cutoff))
    }

    fn fetch_historical(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<OrderRecord>> {
        let what = format!("{} source for {country}", SourceTier::Historical);
        self.policy
            .run(&what, || self.inner.fetch_historical(country, range))
    }
}
