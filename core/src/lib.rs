//! Order metrics extraction: reconcile two order sources of differing
//! freshness, compute windowed KPIs per country, and persist versioned
//! snapshot artifacts for the dashboard.

pub mod channel;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod reconciliation;
pub mod record;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod trend;
pub mod types;
pub mod writer;
