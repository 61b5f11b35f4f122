//! Wraps a producer as a Prometheus gauge source.
//!
//! Both `describe` and `collect` invoke the producer. `collect` is
//! serialized by a lock so concurrent scrapes of one job never overlap.

use std::collections::{HashMap, HashSet};

use prometheus::core::Desc;
use prometheus::{Gauge, Opts};
use quota_core::{MetricRecord, ProduceFn};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CollectError;

/// Name reported for a sample that carries a producer error.
pub const PLACEHOLDER_NAME: &str = "place_holder_prometheus_collector";
pub const PLACEHOLDER_HELP: &str = "Help is not implemented yet";

/// One collected sample.
#[derive(Debug, Clone)]
pub enum Sample {
    Gauge(Gauge),
    /// The producer failed or a record could not become a gauge.
    Invalid { name: &'static str, error: String },
}

/// Drop records whose name and label set were already seen, keeping the
/// first occurrence.
pub fn remove_duplicated(records: Vec<MetricRecord>) -> Vec<MetricRecord> {
    let mut seen = HashSet::new();
    let total = records.len();
    let unique: Vec<MetricRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect();
    if unique.len() < total {
        debug!(dropped = total - unique.len(), "duplicate records removed");
    }
    unique
}

fn help_for(record: &MetricRecord) -> &str {
    if record.desc.is_empty() {
        &record.name
    } else {
        &record.desc
    }
}

fn const_labels(record: &MetricRecord) -> HashMap<String, String> {
    record
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub struct QuotaCollector {
    name: String,
    produce: ProduceFn,
    lock: Mutex<()>,
}

impl QuotaCollector {
    /// `name` identifies the collector in errors and logs.
    pub fn new(name: impl Into<String>, produce: ProduceFn) -> Self {
        Self {
            name: name.into(),
            produce,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One descriptor per distinct record.
    pub async fn describe(&self) -> Result<Vec<Desc>, CollectError> {
        let records = (self.produce)().await.map_err(|e| CollectError::Produce {
            collector: self.name.clone(),
            message: format!("{e:#}"),
        })?;
        remove_duplicated(records)
            .iter()
            .map(|r| {
                Desc::new(r.name.clone(), help_for(r).to_string(), vec![], const_labels(r)).map_err(
                    |e| CollectError::InvalidDesc {
                        collector: self.name.clone(),
                        name: r.name.clone(),
                        message: e.to_string(),
                    },
                )
            })
            .collect()
    }

    /// One gauge per distinct record, or a single invalid sample when the
    /// producer fails.
    pub async fn collect(&self) -> Vec<Sample> {
        let _guard = self.lock.lock().await;
        let records = match (self.produce)().await {
            Ok(records) => records,
            Err(e) => {
                return vec![Sample::Invalid {
                    name: PLACEHOLDER_NAME,
                    error: format!("collector {}: {e:#}", self.name),
                }];
            }
        };
        remove_duplicated(records)
            .iter()
            .map(|r| match gauge(r) {
                Ok(g) => Sample::Gauge(g),
                Err(e) => Sample::Invalid {
                    name: PLACEHOLDER_NAME,
                    error: format!("collector {}: {}: {e}", self.name, r.name),
                },
            })
            .collect()
    }
}

fn gauge(record: &MetricRecord) -> prometheus::Result<Gauge> {
    let opts = Opts::new(record.name.clone(), help_for(record).to_string())
        .const_labels(const_labels(record));
    let g = Gauge::with_opts(opts)?;
    g.set(record.value);
    Ok(g)
}
