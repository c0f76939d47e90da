//! Channel breakdown: customer channels vs the growth channel.
//!
//! An order is "growth" iff its channel tag equals the configured growth
//! tag; every other attributed channel is "customer". Orders without a
//! channel (`Unknown`) are in neither group and not in the denominator.

use crate::{
    metrics::{compute_metrics, ratio, round1, CurrencyRate, MetricSet, MetricSummary},
    record::OrderRecord,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelShare {
    pub metrics: MetricSet,
    pub gmv_percent: f64,
    pub orders_percent: f64,
    pub buyers_percent: f64,
}

impl ChannelShare {
    pub fn summary(&self) -> ChannelShareSummary {
        ChannelShareSummary {
            metrics: self.metrics.summary(),
            gmv_percent: round1(self.gmv_percent),
            orders_percent: round1(self.orders_percent),
            buyers_percent: round1(self.buyers_percent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelBreakdown {
    pub customer: ChannelShare,
    pub growth: ChannelShare,
}

impl ChannelBreakdown {
    pub fn summary(&self) -> ChannelBreakdownSummary {
        ChannelBreakdownSummary {
            customer: self.customer.summary(),
            growth: self.growth.summary(),
        }
    }
}

pub fn compute_channel_breakdown(
    records: &[OrderRecord],
    rate: CurrencyRate,
    growth_channel: &str,
) -> ChannelBreakdown {
    let (growth, customer): (Vec<OrderRecord>, Vec<OrderRecord>) = records
        .iter()
        .filter(|r| r.channel.is_known())
        .cloned()
        .partition(|r| r.channel.tag().eq_ignore_ascii_case(growth_channel));

    let customer = compute_metrics(&customer, rate);
    let growth = compute_metrics(&growth, rate);

    let total_gmv = customer.total_gmv + growth.total_gmv;
    let total_orders = customer.order_count + growth.order_count;
    // A buyer can order through both groups; shares are taken over the
    // per-group counts so the two sides partition 100%.
    let total_buyers = customer.unique_buyers + growth.unique_buyers;

    let share = |m: MetricSet| ChannelShare {
        metrics: m,
        gmv_percent: ratio(m.total_gmv, total_gmv) * 100.0,
        orders_percent: ratio(m.order_count, total_orders) * 100.0,
        buyers_percent: ratio(m.unique_buyers, total_buyers) * 100.0,
    };

    ChannelBreakdown {
        customer: share(customer),
        growth: share(growth),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelShareSummary {
    #[serde(flatten)]
    pub metrics: MetricSummary,
    pub gmv_percent: f64,
    pub orders_percent: f64,
    pub buyers_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelBreakdownSummary {
    pub customer: ChannelShareSummary,
    pub growth: ChannelShareSummary,
}
