//! Shared primitive types used across the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable order identifier. Unique per logical order within a country.
pub type OrderId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Supported markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Ph,
    Vn,
}

impl Country {
    pub fn code(&self) -> &'static str {
        match self {
            Country::Ph => "PH",
            Country::Vn => "VN",
        }
    }

    /// Lowercase code used in artifact file names.
    pub fn file_stem(&self) -> String {
        self.code().to_ascii_lowercase()
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "PH" => Some(Country::Ph),
            "VN" => Some(Country::Vn),
            _ => None,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    Denied,
    Cancelled,
    PendingCancellation,
    Other,
}

impl OrderStatus {
    /// Warehouse status strings are upper snake case; anything unrecognised is `Other`.
    pub fn from_source(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" | "PLACED" | "CONFIRMED" | "DELIVERED" => OrderStatus::Active,
            "DENIED" => OrderStatus::Denied,
            "CANCELLED" | "CANCELED" => OrderStatus::Cancelled,
            "PENDING_CANCELLATION" => OrderStatus::PendingCancellation,
            _ => OrderStatus::Other,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            OrderStatus::Active => "ACTIVE",
            OrderStatus::Denied => "DENIED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::PendingCancellation => "PENDING_CANCELLATION",
            OrderStatus::Other => "OTHER",
        }
    }
}

/// Acquisition pathway of an order.
///
/// `Unknown` means the source has not attributed a channel yet (the recent
/// source lags on this column). `Other` keeps the raw tag so configuration
/// can still allow or exclude it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    App,
    Web,
    Force,
    Assisted,
    Other(String),
    Unknown,
}

impl Channel {
    pub fn from_source(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Channel::Unknown;
        };
        match raw.to_ascii_uppercase().as_str() {
            "APP" | "B2B_APP" => Channel::App,
            "WEB" | "B2B_WEB" => Channel::Web,
            "FORCE" | "B2B_FORCE" => Channel::Force,
            "CX_TLP" => Channel::Assisted,
            "UNKNOWN" | "NULL" => Channel::Unknown,
            other => Channel::Other(other.to_string()),
        }
    }

    /// The tag configuration refers to (allowed channels, growth channel).
    pub fn tag(&self) -> &str {
        match self {
            Channel::App => "APP",
            Channel::Web => "WEB",
            Channel::Force => "FORCE",
            Channel::Assisted => "CX_TLP",
            Channel::Other(tag) => tag,
            Channel::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Channel::Unknown)
    }
}

/// Which source a record was read from. Lower rank wins during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Historical,
    Recent,
}

impl SourceTier {
    pub fn priority(&self) -> u8 {
        match self {
            SourceTier::Historical => 0,
            SourceTier::Recent => 1,
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTier::Historical => f.write_str("historical"),
            SourceTier::Recent => f.write_str("recent"),
        }
    }
}
