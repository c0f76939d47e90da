//! Order records and the ingestion boundary.
//!
//! Sources hand over loosely typed `RawOrderRow`s. Everything past
//! `normalize()` works on `OrderRecord`, whose timestamp is UTC and whose
//! gross value is a finite number. Rows that cannot be coerced are
//! rejected here, logged, and never reach a sum or a count.

use crate::types::{Channel, Country, OrderId, OrderStatus, SourceTier};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row as the warehouse returns it. All columns are text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOrderRow {
    pub order_id: String,
    pub placed_at: Option<String>,
    pub gross_value: Option<String>,
    pub buyer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub status: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub country: Country,
    pub placed_at: DateTime<Utc>,
    pub order_id: OrderId,
    pub gross_value: f64,
    pub buyer_id: String,
    pub vendor_id: String,
    pub status: OrderStatus,
    pub channel: Channel,
    pub tier: SourceTier,
}

impl OrderRecord {
    pub fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        self.placed_at.with_timezone(&offset).date_naive()
    }

    pub fn local_hour(&self, offset: FixedOffset) -> u32 {
        self.placed_at.with_timezone(&offset).hour()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedRecord {
    #[error("order {order_id}: missing order id")]
    MissingOrderId { order_id: String },

    #[error("order {order_id}: unparseable timestamp {raw:?}")]
    BadTimestamp { order_id: String, raw: Option<String> },

    #[error("order {order_id}: non-numeric gross value {raw:?}")]
    BadGrossValue { order_id: String, raw: Option<String> },
}

/// Coerce one raw row into a typed record.
pub fn normalize(
    raw: &RawOrderRow,
    country: Country,
    tier: SourceTier,
) -> Result<OrderRecord, MalformedRecord> {
    let order_id = raw.order_id.trim();
    if order_id.is_empty() {
        return Err(MalformedRecord::MissingOrderId {
            order_id: raw.order_id.clone(),
        });
    }

    let placed_at = raw
        .placed_at
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| MalformedRecord::BadTimestamp {
            order_id: order_id.to_string(),
            raw: raw.placed_at.clone(),
        })?;

    let gross_value = raw
        .gross_value
        .as_deref()
        .and_then(parse_amount)
        .ok_or_else(|| MalformedRecord::BadGrossValue {
            order_id: order_id.to_string(),
            raw: raw.gross_value.clone(),
        })?;

    Ok(OrderRecord {
        country,
        placed_at,
        order_id: order_id.to_string(),
        gross_value,
        buyer_id: raw.buyer_id.as_deref().unwrap_or_default().trim().to_string(),
        vendor_id: raw.vendor_id.as_deref().unwrap_or_default().trim().to_string(),
        status: raw
            .status
            .as_deref()
            .map(OrderStatus::from_source)
            .unwrap_or(OrderStatus::Other),
        channel: Channel::from_source(raw.channel.as_deref()),
        tier,
    })
}

/// Result of normalizing a batch of rows.
#[derive(Debug, Default)]
pub struct Ingested {
    pub records: Vec<OrderRecord>,
    pub rejected: Vec<MalformedRecord>,
}

/// Normalize a batch, keeping row order. Rejections are logged, not raised.
pub fn ingest(rows: &[RawOrderRow], country: Country, tier: SourceTier) -> Ingested {
    let mut out = Ingested::default();
    for row in rows {
        match normalize(row, country, tier) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                log::warn!("country={country} {tier} row rejected: {e}");
                out.rejected.push(e);
            }
        }
    }
    if !out.rejected.is_empty() {
        log::warn!(
            "country={country} {tier}: {} of {} rows malformed and excluded",
            out.rejected.len(),
            rows.len()
        );
    }
    out
}

/// RFC 3339 with any offset, or naive ISO-ish timestamps taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
