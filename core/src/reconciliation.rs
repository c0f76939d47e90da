//! Reconciliation: merge the authoritative-but-late historical tier with
//! the fresh-but-incomplete recent tier into one record set per order.
//!
//! Precedence is explicit: records are ordered by source tier priority
//! (historical first) with a stable sort before deduplication, so the
//! historical copy of an order always wins regardless of how the input
//! slices were assembled. Within one tier the first occurrence wins.

use crate::{
    clock::DateRange,
    record::OrderRecord,
};
use chrono::{FixedOffset, NaiveDate};
use std::collections::HashSet;

/// Concatenate both slices and keep one record per `order_id`,
/// preferring the historical tier.
pub fn reconcile(historical: &[OrderRecord], today_recent: &[OrderRecord]) -> Vec<OrderRecord> {
    let mut candidates: Vec<&OrderRecord> = historical.iter().chain(today_recent).collect();
    candidates.sort_by_key(|r| r.tier.priority());

    let mut seen: HashSet<&str> = HashSet::with_capacity(candidates.len());
    let mut merged = Vec::with_capacity(candidates.len());
    for record in candidates {
        if seen.insert(record.order_id.as_str()) {
            merged.push(record.clone());
        }
    }
    merged
}

/// Month-to-date record set.
///
/// With historical data available, history (month start through yesterday)
/// is merged with today's recent rows. When the historical slice is empty
/// (first day of the month, or the historical load has not landed) the
/// recent tier covers the whole window on its own.
pub fn reconcile_month_to_date(
    historical: &[OrderRecord],
    recent_window: &[OrderRecord],
    mtd: DateRange,
    today: NaiveDate,
    offset: FixedOffset,
) -> Vec<OrderRecord> {
    if historical.is_empty() {
        log::info!(
            "no historical rows for {}..{}, month-to-date uses the recent tier only",
            mtd.start,
            mtd.end
        );
        let recent_mtd: Vec<OrderRecord> = recent_window
            .iter()
            .filter(|r| mtd.contains(r.local_date(offset)))
            .cloned()
            .collect();
        return reconcile(&[], &recent_mtd);
    }

    let today_recent: Vec<OrderRecord> = recent_window
        .iter()
        .filter(|r| r.local_date(offset) == today)
        .cloned()
        .collect();
    reconcile(historical, &today_recent)
}
