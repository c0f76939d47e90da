//! Metrics engine: the fixed KPI set computed over any record subset.
//!
//! Values are kept unrounded in `MetricSet` so window arithmetic never
//! compounds rounding error. Rounding happens exactly once, when a
//! `MetricSummary` is built for output.

use crate::record::OrderRecord;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;

/// Local-currency units per 1 USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyRate {
    PerUsd(f64),
    /// No rate configured. USD figures mirror the local ones.
    Unconverted,
}

impl CurrencyRate {
    pub fn to_usd(&self, amount: f64) -> f64 {
        match self {
            CurrencyRate::PerUsd(rate) if *rate > 0.0 => amount / rate,
            _ => amount,
        }
    }
}

/// The additive components a `MetricSet` is derived from.
///
/// `total_gmv` and `order_count` add across disjoint order sets; buyer
/// and vendor counts only add when the populations are disjoint too.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricTotals {
    pub total_gmv: f64,
    pub order_count: u64,
    pub unique_buyers: u64,
    pub unique_vendors: u64,
}

impl MetricTotals {
    pub fn from_records(records: &[OrderRecord]) -> Self {
        let mut orders: HashSet<&str> = HashSet::new();
        let mut buyers: HashSet<&str> = HashSet::new();
        let mut vendors: HashSet<&str> = HashSet::new();
        let mut total_gmv = 0.0;
        for record in records {
            total_gmv += record.gross_value;
            orders.insert(&record.order_id);
            if !record.buyer_id.is_empty() {
                buyers.insert(&record.buyer_id);
            }
            if !record.vendor_id.is_empty() {
                vendors.insert(&record.vendor_id);
            }
        }
        Self {
            total_gmv,
            order_count: orders.len() as u64,
            unique_buyers: buyers.len() as u64,
            unique_vendors: vendors.len() as u64,
        }
    }
}

/// USD-denominated figures, or an explicit marker that none were derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UsdFigures {
    Converted {
        total_gmv: f64,
        avg_order_value: f64,
        gmv_per_vendor: f64,
    },
    Unconverted,
}

/// Counts are `f64` so that averaged sets (moving averages) share the type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSet {
    pub total_gmv: f64,
    pub order_count: f64,
    pub unique_buyers: f64,
    pub unique_vendors: f64,
    pub avg_order_value: f64,
    pub purchase_frequency: f64,
    pub gmv_per_vendor: f64,
    pub usd: UsdFigures,
}

impl MetricSet {
    pub fn zero() -> Self {
        Self::from_totals(MetricTotals::default(), CurrencyRate::Unconverted)
    }

    /// Derive every ratio from the additive components. A zero
    /// denominator yields 0, never a division.
    pub fn from_totals(totals: MetricTotals, rate: CurrencyRate) -> Self {
        let orders = totals.order_count as f64;
        let buyers = totals.unique_buyers as f64;
        let vendors = totals.unique_vendors as f64;
        let avg_order_value = ratio(totals.total_gmv, orders);
        let gmv_per_vendor = ratio(totals.total_gmv, vendors);
        let usd = match rate {
            CurrencyRate::PerUsd(_) => UsdFigures::Converted {
                total_gmv: rate.to_usd(totals.total_gmv),
                avg_order_value: rate.to_usd(avg_order_value),
                gmv_per_vendor: rate.to_usd(gmv_per_vendor),
            },
            CurrencyRate::Unconverted => UsdFigures::Unconverted,
        };
        Self {
            total_gmv: totals.total_gmv,
            order_count: orders,
            unique_buyers: buyers,
            unique_vendors: vendors,
            avg_order_value,
            purchase_frequency: ratio(orders, buyers),
            gmv_per_vendor,
            usd,
        }
    }

    pub fn total_gmv_usd(&self) -> f64 {
        match self.usd {
            UsdFigures::Converted { total_gmv, .. } => total_gmv,
            UsdFigures::Unconverted => self.total_gmv,
        }
    }

    pub fn avg_order_value_usd(&self) -> f64 {
        match self.usd {
            UsdFigures::Converted { avg_order_value, .. } => avg_order_value,
            UsdFigures::Unconverted => self.avg_order_value,
        }
    }

    pub fn gmv_per_vendor_usd(&self) -> f64 {
        match self.usd {
            UsdFigures::Converted { gmv_per_vendor, .. } => gmv_per_vendor,
            UsdFigures::Unconverted => self.gmv_per_vendor,
        }
    }

    /// Field-wise arithmetic mean. An empty slice yields `zero()`.
    pub fn mean_of(sets: &[MetricSet]) -> Self {
        if sets.is_empty() {
            return Self::zero();
        }
        let n = sets.len() as f64;
        let mean = |f: fn(&MetricSet) -> f64| sets.iter().map(f).sum::<f64>() / n;
        let converted = sets
            .iter()
            .all(|s| matches!(s.usd, UsdFigures::Converted { .. }));
        Self {
            total_gmv: mean(|s| s.total_gmv),
            order_count: mean(|s| s.order_count),
            unique_buyers: mean(|s| s.unique_buyers),
            unique_vendors: mean(|s| s.unique_vendors),
            avg_order_value: mean(|s| s.avg_order_value),
            purchase_frequency: mean(|s| s.purchase_frequency),
            gmv_per_vendor: mean(|s| s.gmv_per_vendor),
            usd: if converted {
                UsdFigures::Converted {
                    total_gmv: mean(|s| s.total_gmv_usd()),
                    avg_order_value: mean(|s| s.avg_order_value_usd()),
                    gmv_per_vendor: mean(|s| s.gmv_per_vendor_usd()),
                }
            } else {
                UsdFigures::Unconverted
            },
        }
    }

    /// Round once for output.
    pub fn summary(&self) -> MetricSummary {
        MetricSummary {
            total_gmv: round2(self.total_gmv),
            total_gmv_usd: round2(self.total_gmv_usd()),
            order_count: round2(self.order_count),
            unique_buyers: round2(self.unique_buyers),
            unique_vendors: round2(self.unique_vendors),
            avg_order_value: round2(self.avg_order_value),
            avg_order_value_usd: round2(self.avg_order_value_usd()),
            purchase_frequency: round2(self.purchase_frequency),
            gmv_per_vendor: round2(self.gmv_per_vendor),
            gmv_per_vendor_usd: round2(self.gmv_per_vendor_usd()),
        }
    }
}

/// Compute the KPI set for `records`. Empty input yields all zeros.
pub fn compute_metrics(records: &[OrderRecord], rate: CurrencyRate) -> MetricSet {
    MetricSet::from_totals(MetricTotals::from_records(records), rate)
}

/// Output form of a `MetricSet`: two-decimal precision throughout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub total_gmv: f64,
    pub total_gmv_usd: f64,
    #[serde(serialize_with = "serialize_count")]
    pub order_count: f64,
    #[serde(serialize_with = "serialize_count")]
    pub unique_buyers: f64,
    #[serde(serialize_with = "serialize_count")]
    pub unique_vendors: f64,
    pub avg_order_value: f64,
    pub avg_order_value_usd: f64,
    pub purchase_frequency: f64,
    pub gmv_per_vendor: f64,
    pub gmv_per_vendor_usd: f64,
}

/// Whole counts are written as integers; averaged counts keep their fraction.
fn serialize_count<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && *value >= 0.0 && *value <= u64::MAX as f64 {
        serializer.serialize_u64(*value as u64)
    } else {
        serializer.serialize_f64(*value)
    }
}

pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // Avoid emitting -0.0.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
