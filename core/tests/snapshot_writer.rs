//! Snapshot document and writer tests.
//!
//! 1. Retention keeps the newest K versions and the manifest follows
//! 2. A country that is not updated keeps its last-good manifest entry
//! 3. Manifest entries never name missing files
//! 4. Composed snapshots round to two decimals and survive a JSON trip

mod common;

use common::*;
use orderpulse_core::{
    channel::compute_channel_breakdown,
    clock::DateRange,
    metrics::{compute_metrics, CurrencyRate, MetricSet},
    snapshot::{PeriodMetrics, Snapshot, SnapshotParts},
    trend::daily_series,
    types::{Channel, Country},
    writer::{versioned_name, SnapshotWriter, MANIFEST_FILE},
};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn period(range: DateRange, metrics: MetricSet) -> PeriodMetrics {
    PeriodMetrics {
        range,
        metrics,
        channels: None,
    }
}

fn sample_snapshot() -> Snapshot {
    let rate = CurrencyRate::PerUsd(56.017);
    let records = vec![
        order("o-1", 100.004, "b-1", "v-1"),
        on_channel(order("o-2", 33.333, "b-2", "v-2"), Channel::Assisted),
    ];
    let today = date(2024, 3, 15);
    let metrics = compute_metrics(&records, rate);
    let mut today_period = period(DateRange::single(today), metrics);
    today_period.channels = Some(compute_channel_breakdown(&records, rate, "CX_TLP"));

    Snapshot::compose(&SnapshotParts {
        generated_at: utc(2024, 3, 15, 2, 0),
        today: today_period,
        same_day_last_week: period(DateRange::single(date(2024, 3, 8)), MetricSet::zero()),
        month_to_date: period(DateRange::new(date(2024, 3, 1), today), metrics),
        month_to_date_last_month: period(
            DateRange::new(date(2024, 2, 1), date(2024, 2, 15)),
            MetricSet::zero(),
        ),
        daily_history: daily_series(&records, rate, manila()),
        ma_short: metrics,
        ma_long: metrics,
    })
}

#[test]
fn composed_snapshot_is_rounded_and_round_trips() {
    let snapshot = sample_snapshot();

    assert_eq!(snapshot.today.date, date(2024, 3, 15));
    assert_eq!(snapshot.today.metrics.total_gmv, 133.34);
    assert_eq!(snapshot.mtd.start_date, date(2024, 3, 1));
    assert!(snapshot.channel_breakdown_today.is_some());
    assert!(snapshot.channel_breakdown_mtd.is_none());

    let json = snapshot.to_json().unwrap();
    assert!(!json.contains("channel_breakdown_mtd\""));
    let back = Snapshot::from_json(&json).unwrap();
    assert_eq!(back, snapshot);
    assert_eq!(back.to_json().unwrap(), json);
}

#[test]
fn retention_keeps_newest_versions() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 5);
    let snapshot = sample_snapshot();

    let mut latest = String::new();
    for i in 0..8 {
        let at = utc(2024, 3, 15, 0, 0) + chrono::Duration::hours(i);
        latest = writer.write(Country::Ph, &snapshot, at).unwrap();
        let mut updated = BTreeMap::new();
        updated.insert(Country::Ph, latest.clone());
        writer.write_manifest(&updated, at).unwrap();
    }

    let report = writer.prune(Country::Ph, Some(latest.as_str()));

    assert_eq!(report.deleted.len(), 3);
    assert_eq!(report.kept.len(), 5);
    assert_eq!(writer.versions(Country::Ph).unwrap().len(), 5);
    assert!(dir.path().join("ph.json").is_file());

    let manifest = writer.read_manifest().unwrap().unwrap();
    assert_eq!(manifest.files.get("ph"), Some(&latest));
    assert!(dir.path().join(&latest).is_file());
}

#[test]
fn protected_file_survives_pruning() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 1);
    let snapshot = sample_snapshot();

    let oldest = writer
        .write(Country::Vn, &snapshot, utc(2024, 3, 1, 0, 0))
        .unwrap();
    writer
        .write(Country::Vn, &snapshot, utc(2024, 3, 2, 0, 0))
        .unwrap();

    let report = writer.prune(Country::Vn, Some(oldest.as_str()));
    assert!(report.deleted.is_empty());
    assert!(dir.path().join(&oldest).is_file());
}

#[test]
fn same_second_writes_never_overwrite() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 5);
    let snapshot = sample_snapshot();
    let at = utc(2024, 3, 15, 2, 0);

    let first = writer.write(Country::Ph, &snapshot, at).unwrap();
    let second = writer.write(Country::Ph, &snapshot, at).unwrap();

    assert_eq!(first, versioned_name(Country::Ph, at.timestamp()));
    assert_ne!(first, second);
}

#[test]
fn unchanged_country_keeps_last_good_entry() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 5);
    let snapshot = sample_snapshot();

    let t1 = utc(2024, 3, 15, 1, 0);
    let ph_1 = writer.write(Country::Ph, &snapshot, t1).unwrap();
    let vn_1 = writer.write(Country::Vn, &snapshot, t1).unwrap();
    let both: BTreeMap<_, _> = [(Country::Ph, ph_1), (Country::Vn, vn_1.clone())].into();
    writer.write_manifest(&both, t1).unwrap();

    // Second run: only PH succeeds.
    let t2 = utc(2024, 3, 15, 2, 0);
    let ph_2 = writer.write(Country::Ph, &snapshot, t2).unwrap();
    let manifest = writer
        .write_manifest(&[(Country::Ph, ph_2.clone())].into(), t2)
        .unwrap();

    assert_eq!(manifest.timestamp, t2);
    assert_eq!(manifest.files.get("ph"), Some(&ph_2));
    assert_eq!(manifest.files.get("vn"), Some(&vn_1));
}

#[test]
fn manifest_drops_entries_for_missing_files() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 5);
    let snapshot = sample_snapshot();
    let t1 = utc(2024, 3, 15, 1, 0);

    let vn = writer.write(Country::Vn, &snapshot, t1).unwrap();
    writer
        .write_manifest(&[(Country::Vn, vn.clone())].into(), t1)
        .unwrap();
    std::fs::remove_file(dir.path().join(&vn)).unwrap();

    let ph = writer.write(Country::Ph, &snapshot, t1).unwrap();
    let manifest = writer
        .write_manifest(&[(Country::Ph, ph)].into(), t1)
        .unwrap();

    assert!(!manifest.files.contains_key("vn"));
    for file in manifest.files.values() {
        assert!(dir.path().join(file).is_file());
    }
}

#[test]
fn no_temp_files_left_behind() {
    let dir = TempDir::new().unwrap();
    let writer = SnapshotWriter::new(dir.path(), 5);
    let t = utc(2024, 3, 15, 1, 0);
    let ph = writer.write(Country::Ph, &sample_snapshot(), t).unwrap();
    writer.write_manifest(&[(Country::Ph, ph)].into(), t).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&MANIFEST_FILE.to_string()));
    assert!(names.iter().all(|n| !n.starts_with('.')));
}
