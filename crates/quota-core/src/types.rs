//! Shared types used across the quota exporter crates.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label key/value pairs. Keys are unique and iteration is sorted, so two
/// label sets with the same pairs always compare and serialize identically.
pub type Labels = BTreeMap<String, String>;

/// Future returned by a [`ProduceFn`].
pub type ProduceFuture =
    Pin<Box<dyn Future<Output = anyhow::Result<Vec<MetricRecord>>> + Send>>;

/// A zero-argument producer of the current metric records.
///
/// Each job's scraper is exposed as one of these, and the pull adapter
/// invokes it on every describe/collect.
pub type ProduceFn = Arc<dyn Fn() -> ProduceFuture + Send + Sync>;

/// Statistic used to read a quota's usage time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Minimum,
    Average,
    Sum,
    SampleCount,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::Average => "Average",
            Statistic::Sum => "Sum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown statistic: {0}")]
pub struct UnknownStatistic(pub String);

impl FromStr for Statistic {
    type Err = UnknownStatistic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Maximum" => Ok(Statistic::Maximum),
            "Minimum" => Ok(Statistic::Minimum),
            "Average" => Ok(Statistic::Average),
            "Sum" => Ok(Statistic::Sum),
            "SampleCount" => Ok(Statistic::SampleCount),
            other => Err(UnknownStatistic(other.to_string())),
        }
    }
}

/// Which monitoring time series represents consumption of a quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSpec {
    pub metric_name: String,
    pub metric_namespace: String,
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
}

/// A provider-declared limit, as returned by the quota listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    pub service_code: String,
    pub service_name: String,
    pub quota_code: String,
    pub quota_name: String,
    pub value: f64,
    pub unit: String,
    pub adjustable: bool,
    pub global_quota: bool,
    pub usage: Option<UsageSpec>,
}

/// A quota paired with its resolved usage for one scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaUsage {
    pub quota: Quota,
    /// Current consumption; `0.0` when usage collection is off or no data exists.
    pub usage: f64,
}

impl QuotaUsage {
    pub fn unmeasured(quota: Quota) -> Self {
        Self { quota, usage: 0.0 }
    }
}

/// One named gauge sample. The unit exchanged between reconciliation,
/// caching, and the pull adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
    pub desc: String,
}

impl MetricRecord {
    /// Identity key: the name plus every label pair in sorted order.
    ///
    /// Two records are identical iff their keys are equal; value and
    /// description do not participate.
    pub fn identity(&self) -> String {
        let mut key = String::with_capacity(self.name.len() + self.labels.len() * 16);
        key.push_str(&self.name);
        key.push('{');
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(k);
            key.push('=');
            key.push_str(&format!("{v:?}"));
        }
        key.push('}');
        key
    }

    /// Whether two records share the same identity.
    pub fn same_identity(&self, other: &MetricRecord) -> bool {
        self.name == other.name && self.labels == other.labels
    }
}
