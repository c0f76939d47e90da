//! snapshot-runner: scheduled batch job that extracts order metrics and
//! writes per-country dashboard snapshots.
//!
//! Usage:
//!   snapshot-runner --config data/pulse_config.json --source warehouse.db
//!   snapshot-runner --config data/pulse_config.json --source warehouse.db \
//!       --out public/data --as-of 2024-03-15T04:00:00Z --countries PH

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use orderpulse_core::{
    clock::RunClock,
    config::PulseConfig,
    engine::ExtractionEngine,
    source::{RetryingSource, SourceRules},
    store::OrderStore,
    types::Country,
    writer::SnapshotWriter,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = flag(&args, "--config").unwrap_or("data/pulse_config.json");
    let source_path = flag(&args, "--source").context("--source <sqlite path> is required")?;

    let mut config = PulseConfig::load(config_path)?;
    log::info!(
        "loaded {config_path}: {} countries, retention {}",
        config.countries.len(),
        config.retention
    );
    if let Some(out) = flag(&args, "--out") {
        log::info!("output directory overridden: {out}");
        config.output_dir = out.to_string();
    }

    let clock = match flag(&args, "--as-of") {
        Some(raw) => RunClock::new(
            DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("--as-of {raw} is not RFC 3339"))?
                .with_timezone(&Utc),
        ),
        None => RunClock::wall(),
    };

    let countries: Vec<Country> = match flag(&args, "--countries") {
        Some(list) => list
            .split(',')
            .map(|c| Country::parse(c).with_context(|| format!("unknown country {c}")))
            .collect::<Result<_>>()?,
        None => config.countries.iter().map(|p| p.country).collect(),
    };

    println!("snapshot-runner");
    println!("  config:    {config_path}");
    println!("  source:    {source_path}");
    println!("  out:       {}", config.output_dir);
    println!("  as of:     {}", clock.now.to_rfc3339());
    println!();

    let rules = SourceRules::from_config(&config)?;
    let policy = config.retry_policy();
    let store = OrderStore::open_with_retry(source_path, rules, &policy)?;
    let source = RetryingSource::new(store, policy);
    let writer = SnapshotWriter::new(&config.output_dir, config.retention);

    let engine = ExtractionEngine::new(config, clock, source, writer);
    let report = engine
        .run_countries(&countries)
        .with_context(|| format!("{} failed", engine.run_id))?;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:    {}", report.run_id);
    for (country, artifact) in &report.written {
        println!("  {country}:        {artifact}");
    }
    for (country, reason) in &report.failed {
        println!("  {country}:        FAILED ({reason})");
    }
    println!("  pruned:    {}", report.pruned);
    if report.manifest.is_none() {
        println!("  manifest:  not updated");
    }
    Ok(())
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}
