//! quota-metrics — Prometheus exposition for produced metric records.
//!
//! Each job's producer is wrapped in a [`QuotaCollector`]. The
//! [`ExporterRegistry`] pulls every collector on each scrape of
//! `/metrics`, turns the records into gauges, and encodes the result in
//! the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ExporterRegistry
//!   ├── register() → QuotaCollector::describe()   (rejects broken jobs)
//!   └── gather()
//!         ├── QuotaCollector::collect() per job, concurrently
//!         │     ├── ProduceFn() → [MetricRecord]
//!         │     ├── remove_duplicated()
//!         │     └── Sample::Gauge / Sample::Invalid
//!         └── per-pull prometheus::Registry → TextEncoder
//! ```

pub mod collector;
pub mod error;
pub mod registry;

pub use collector::{QuotaCollector, Sample, remove_duplicated};
pub use error::{CollectError, GatherError};
pub use registry::ExporterRegistry;
