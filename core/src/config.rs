//! Run configuration: the static lookup tables the pipeline consumes.
//!
//! Loaded once by the runner and passed down explicitly. Nothing in the
//! library reads configuration from globals or the environment.

use crate::{
    error::{PulseError, PulseResult},
    metrics::CurrencyRate,
    source::RetryPolicy,
    types::Country,
};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryProfile {
    pub country: Country,
    /// Fixed UTC offset, e.g. `+08:00`. Supported markets have no DST.
    pub utc_offset: String,
    /// Local-currency units per 1 USD. Absent means amounts are left unconverted.
    #[serde(default)]
    pub usd_rate: Option<f64>,
}

impl CountryProfile {
    pub fn offset(&self) -> PulseResult<FixedOffset> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| {
            PulseError::InvalidConfig(format!(
                "{}: bad utc_offset '{}'",
                self.country, self.utc_offset
            ))
        })
    }

    pub fn currency_rate(&self) -> CurrencyRate {
        match self.usd_rate {
            Some(rate) => CurrencyRate::PerUsd(rate),
            None => CurrencyRate::Unconverted,
        }
    }
}

/// Everything an engine needs to know about the country it is computing for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryContext {
    pub country: Country,
    pub offset: FixedOffset,
    pub rate: CurrencyRate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovingAverageWindows {
    pub short: usize,
    pub long: usize,
}

impl Default for MovingAverageWindows {
    fn default() -> Self {
        Self { short: 7, long: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_seconds: Vec<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: vec![0, 10, 20],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseConfig {
    pub countries: Vec<CountryProfile>,
    pub excluded_statuses: Vec<String>,
    pub allowed_channels: Vec<String>,
    pub growth_channel: String,
    #[serde(default)]
    pub excluded_vendor_ids: Vec<String>,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    #[serde(default)]
    pub moving_average_windows: MovingAverageWindows,
    #[serde(default = "default_retention")]
    pub retention: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_history_days() -> u32 {
    60
}

fn default_retention() -> usize {
    5
}

fn default_output_dir() -> String {
    "data".into()
}

impl PulseConfig {
    /// Load and validate from a JSON file.
    /// In tests, use PulseConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PulseConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PulseResult<()> {
        if self.countries.is_empty() {
            return Err(PulseError::InvalidConfig("no countries configured".into()));
        }
        let mut seen = HashSet::new();
        for profile in &self.countries {
            if !seen.insert(profile.country) {
                return Err(PulseError::InvalidConfig(format!(
                    "{} configured twice",
                    profile.country
                )));
            }
            profile.offset()?;
            if let Some(rate) = profile.usd_rate {
                if !(rate.is_finite() && rate > 0.0) {
                    return Err(PulseError::InvalidConfig(format!(
                        "{}: usd_rate must be positive, got {rate}",
                        profile.country
                    )));
                }
            }
        }
        if self.growth_channel.trim().is_empty() {
            return Err(PulseError::InvalidConfig("growth_channel is empty".into()));
        }
        if self.retention == 0 {
            return Err(PulseError::InvalidConfig("retention must be at least 1".into()));
        }
        if self.moving_average_windows.short == 0 || self.moving_average_windows.long == 0 {
            return Err(PulseError::InvalidConfig(
                "moving average windows must be at least 1 day".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PulseError::InvalidConfig("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn profile(&self, country: Country) -> Option<&CountryProfile> {
        self.countries.iter().find(|p| p.country == country)
    }

    pub fn context_for(&self, country: Country) -> PulseResult<CountryContext> {
        let profile = self.profile(country).ok_or_else(|| {
            PulseError::InvalidConfig(format!("{country} is not configured"))
        })?;
        Ok(CountryContext {
            country,
            offset: profile.offset()?,
            rate: profile.currency_rate(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            self.retry
                .backoff_seconds
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            countries: vec![
                CountryProfile {
                    country: Country::Ph,
                    utc_offset: "+08:00".into(),
                    usd_rate: Some(56.017),
                },
                CountryProfile {
                    country: Country::Vn,
                    utc_offset: "+07:00".into(),
                    usd_rate: Some(26416.0),
                },
            ],
            excluded_statuses: vec![
                "DENIED".into(),
                "CANCELLED".into(),
                "PENDING_CANCELLATION".into(),
            ],
            allowed_channels: vec![
                "APP".into(),
                "WEB".into(),
                "FORCE".into(),
                "CX_TLP".into(),
            ],
            growth_channel: "CX_TLP".into(),
            excluded_vendor_ids: vec!["test-vendor".into()],
            history_days: 60,
            moving_average_windows: MovingAverageWindows::default(),
            retention: 5,
            output_dir: "data".into(),
            retry: RetrySettings {
                max_attempts: 3,
                backoff_seconds: vec![0, 0, 0],
            },
        }
    }
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM` or `Z`.
fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
