//! Source adapter and retry tests.
//!
//! 1. The recent tier yields the latest arrival per order
//! 2. Date windows and hour cutoffs use local time
//! 3. Historical exclusions happen source-side
//! 4. Malformed rows never reach the engines
//! 5. Retries are bounded and end in SourceUnavailable

mod common;

use common::*;
use orderpulse_core::{
    clock::DateRange,
    error::{PulseError, PulseResult},
    record::OrderRecord,
    source::{OrderSource, RetryPolicy, RetryingSource},
    types::{Channel, Country},
};
use std::cell::Cell;
use std::time::Duration;

fn march_15() -> DateRange {
    DateRange::single(date(2024, 3, 15))
}

fn ids(records: &[OrderRecord]) -> Vec<&str> {
    records.iter().map(|r| r.order_id.as_str()).collect()
}

#[test]
fn recent_tier_keeps_latest_arrival() {
    let store = test_store();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "95", "b-1", None))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-2", "2024-03-15 02:10:00", "40", "b-2", Some("WEB")))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "100", "b-1", Some("APP")))
        .unwrap();
    assert_eq!(store.recent_row_count(Country::Ph).unwrap(), 3);

    let records = store.fetch_recent(Country::Ph, march_15(), None).unwrap();

    assert_eq!(ids(&records), vec!["o-2", "o-1"]);
    let o1 = &records[1];
    assert_eq!(o1.gross_value, 100.0);
    assert_eq!(o1.channel, Channel::App);
}

#[test]
fn moved_order_leaves_its_old_day() {
    let store = test_store();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "100", "b-1", Some("APP")))
        .unwrap();
    // A later change-log row moves the order four days out.
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-19 02:00:00", "120", "b-1", Some("APP")))
        .unwrap();

    let old_day = store.fetch_recent(Country::Ph, march_15(), None).unwrap();
    assert!(old_day.is_empty(), "superseded row returned: {old_day:?}");
    let old_day_cut = store.fetch_recent(Country::Ph, march_15(), Some(23)).unwrap();
    assert!(old_day_cut.is_empty());

    let new_day = store
        .fetch_recent(Country::Ph, DateRange::single(date(2024, 3, 19)), None)
        .unwrap();
    assert_eq!(ids(&new_day), vec!["o-1"]);
    assert_eq!(new_day[0].gross_value, 120.0);
}

#[test]
fn local_date_window_crosses_utc_midnight() {
    let store = test_store();
    // 17:00 UTC on the 14th is 01:00 on the 15th in Manila.
    store
        .insert_recent(Country::Ph, &raw("o-early", "2024-03-14 17:00:00", "10", "b-1", None))
        .unwrap();
    // 16:30 UTC on the 15th is 00:30 on the 16th.
    store
        .insert_recent(Country::Ph, &raw("o-late", "2024-03-15 16:30:00", "10", "b-1", None))
        .unwrap();

    let records = store.fetch_recent(Country::Ph, march_15(), None).unwrap();
    assert_eq!(ids(&records), vec!["o-early"]);
}

#[test]
fn hour_cutoff_is_inclusive_local_hour() {
    let store = test_store();
    for (id, at) in [
        ("o-09", "2024-03-15 01:15:00"),
        ("o-10", "2024-03-15 02:59:00"),
        ("o-11", "2024-03-15 03:00:00"),
    ] {
        store
            .insert_recent(Country::Ph, &raw(id, at, "10", "b-1", Some("APP")))
            .unwrap();
    }

    let records = store.fetch_recent(Country::Ph, march_15(), Some(10)).unwrap();
    assert_eq!(ids(&records), vec!["o-09", "o-10"]);
}

#[test]
fn recent_tier_excludes_only_disallowed_known_channels() {
    let store = test_store();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "10", "b-1", None))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-2", "2024-03-15 02:00:00", "10", "b-1", Some("KIOSK")))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-3", "2024-03-15 02:00:00", "10", "b-1", Some("cx_tlp")))
        .unwrap();

    let records = store.fetch_recent(Country::Ph, march_15(), None).unwrap();
    assert_eq!(ids(&records), vec!["o-1", "o-3"]);
    assert_eq!(records[1].channel, Channel::Assisted);
}

#[test]
fn historical_tier_applies_exclusions() {
    let store = test_store();
    let ok = raw("o-ok", "2024-03-15 02:00:00", "10", "b-1", Some("APP"));

    let mut cancelled = raw("o-cancelled", "2024-03-15 02:00:00", "10", "b-1", Some("APP"));
    cancelled.status = Some("CANCELLED".into());
    let mut test_vendor = raw("o-test", "2024-03-15 02:00:00", "10", "b-1", Some("APP"));
    test_vendor.vendor_id = Some("test-vendor".into());
    let unattributed = raw("o-none", "2024-03-15 02:00:00", "10", "b-1", None);
    let disallowed = raw("o-kiosk", "2024-03-15 02:00:00", "10", "b-1", Some("KIOSK"));

    for row in [&ok, &cancelled, &test_vendor, &unattributed, &disallowed] {
        store.insert_historical(Country::Ph, row).unwrap();
    }

    let records = store.fetch_historical(Country::Ph, march_15()).unwrap();
    assert_eq!(ids(&records), vec!["o-ok"]);
}

#[test]
fn countries_do_not_leak_into_each_other() {
    let store = test_store();
    let ph = raw("o-1", "2024-03-15 02:00:00", "10", "b-1", Some("APP"));
    let vn = raw("o-2", "2024-03-15 02:00:00", "10", "b-1", Some("APP"));
    store.insert_historical(Country::Ph, &ph).unwrap();
    store.insert_historical(Country::Vn, &vn).unwrap();

    let vn = store.fetch_historical(Country::Vn, march_15()).unwrap();
    assert_eq!(ids(&vn), vec!["o-2"]);
    assert_eq!(vn[0].country, Country::Vn);
}

#[test]
fn malformed_rows_are_excluded() {
    let store = test_store();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "100", "b-1", None))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-2", "2024-03-15 02:00:00", "n/a", "b-2", None))
        .unwrap();
    store
        .insert_recent(Country::Ph, &raw("o-3", "yesterday-ish", "100", "b-3", None))
        .unwrap();

    let records = store.fetch_recent(Country::Ph, march_15(), None).unwrap();
    assert_eq!(ids(&records), vec!["o-1"]);
}

#[test]
fn empty_historical_range_is_not_queried() {
    let store = test_store();
    let empty = DateRange::new(date(2024, 3, 2), date(2024, 3, 1));
    assert!(store.fetch_historical(Country::Ph, empty).unwrap().is_empty());
}

// ── Retry ──────────────────────────────────────────────────────────

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, vec![Duration::ZERO; attempts as usize])
}

fn transient() -> PulseError {
    PulseError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"))
}

#[test]
fn retry_exhaustion_is_source_unavailable() {
    let calls = Cell::new(0);
    let result: PulseResult<()> = fast_policy(3).run("recent source for PH", || {
        calls.set(calls.get() + 1);
        Err(transient())
    });

    assert_eq!(calls.get(), 3);
    match result {
        Err(PulseError::SourceUnavailable { what, attempts, .. }) => {
            assert_eq!(what, "recent source for PH");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[test]
fn non_transient_errors_are_not_retried() {
    let calls = Cell::new(0);
    let result: PulseResult<()> = fast_policy(3).run("op", || {
        calls.set(calls.get() + 1);
        Err(PulseError::InvalidConfig("bad".into()))
    });

    assert_eq!(calls.get(), 1);
    assert!(matches!(result, Err(PulseError::InvalidConfig(_))));
}

/// Fails a fixed number of times, then delegates.
struct Flaky<S> {
    inner: S,
    failures_left: Cell<u32>,
}

impl<S: OrderSource> OrderSource for Flaky<S> {
    fn fetch_recent(
        &self,
        country: Country,
        range: DateRange,
        hour_cutoff: Option<u32>,
    ) -> PulseResult<Vec<OrderRecord>> {
        if self.failures_left.get() > 0 {
            self.failures_left.set(self.failures_left.get() - 1);
            return Err(transient());
        }
        self.inner.fetch_recent(country, range, hour_cutoff)
    }

    fn fetch_historical(
        &self,
        country: Country,
        range: DateRange,
    ) -> PulseResult<Vec<OrderRecord>> {
        self.inner.fetch_historical(country, range)
    }
}

#[test]
fn retrying_source_recovers_within_budget() {
    let store = test_store();
    store
        .insert_recent(Country::Ph, &raw("o-1", "2024-03-15 02:00:00", "10", "b-1", None))
        .unwrap();
    let source = RetryingSource::new(
        Flaky {
            inner: store,
            failures_left: Cell::new(2),
        },
        fast_policy(3),
    );

    let records = source.fetch_recent(Country::Ph, march_15(), None).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(source.inner().failures_left.get(), 0);
}

#[test]
fn retrying_source_gives_up_after_budget() {
    let source = RetryingSource::new(
        Flaky {
            inner: test_store(),
            failures_left: Cell::new(5),
        },
        fast_policy(3),
    );

    let result = source.fetch_recent(Country::Ph, march_15(), None);
    assert!(matches!(result, Err(PulseError::SourceUnavailable { attempts: 3, .. })));
    assert_eq!(source.inner().failures_left.get(), 2);
}
