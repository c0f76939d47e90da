//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use orderpulse_core::{
    config::PulseConfig,
    record::{OrderRecord, RawOrderRow},
    source::SourceRules,
    store::OrderStore,
    types::{Channel, Country, OrderStatus, SourceTier},
};

pub fn manila() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A UTC instant.
pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// A Manila wall-clock time expressed as a UTC instant.
pub fn ph_local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    manila()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn order(id: &str, value: f64, buyer: &str, vendor: &str) -> OrderRecord {
    OrderRecord {
        country: Country::Ph,
        placed_at: ph_local(2024, 3, 15, 10, 0),
        order_id: id.into(),
        gross_value: value,
        buyer_id: buyer.into(),
        vendor_id: vendor.into(),
        status: OrderStatus::Active,
        channel: Channel::App,
        tier: SourceTier::Recent,
    }
}

pub fn historical(mut record: OrderRecord) -> OrderRecord {
    record.tier = SourceTier::Historical;
    record
}

pub fn on_channel(mut record: OrderRecord, channel: Channel) -> OrderRecord {
    record.channel = channel;
    record
}

pub fn placed(mut record: OrderRecord, at: DateTime<Utc>) -> OrderRecord {
    record.placed_at = at;
    record
}

pub fn raw(id: &str, at: &str, value: &str, buyer: &str, channel: Option<&str>) -> RawOrderRow {
    RawOrderRow {
        order_id: id.into(),
        placed_at: Some(at.into()),
        gross_value: Some(value.into()),
        buyer_id: Some(buyer.into()),
        vendor_id: Some("v-1".into()),
        status: Some("PLACED".into()),
        channel: channel.map(str::to_string),
    }
}

pub fn test_store() -> OrderStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let rules = SourceRules::from_config(&PulseConfig::default_test()).expect("rules");
    let store = OrderStore::in_memory(rules).expect("in-memory store");
    store.migrate().expect("migration");
    store
}
