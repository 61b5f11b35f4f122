//! Upstream API seam.
//!
//! The orchestrator only talks to these traits. Production wiring uses the
//! AWS SDK implementations in [`crate::aws`]; tests supply in-memory fakes.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use quota_core::{Quota, UsageSpec};

use crate::error::ApiError;

/// One page of a quota listing.
#[derive(Debug, Clone, Default)]
pub struct QuotaPage {
    pub quotas: Vec<Quota>,
    /// Token for the next page; `None` when the listing is exhausted.
    pub next_token: Option<String>,
}

/// One usage sample, already reduced to the requested statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub value: f64,
}

/// Quota and usage lookups for one account.
#[async_trait]
pub trait QuotaApi: Send + Sync {
    /// Account-specific (applied) quotas for a service.
    async fn list_service_quotas(
        &self,
        region: &str,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<QuotaPage, ApiError>;

    /// Provider default quotas for a service.
    async fn list_default_service_quotas(
        &self,
        region: &str,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<QuotaPage, ApiError>;

    /// Datapoints of a usage series between `start` and `end`.
    async fn usage_statistic(
        &self,
        region: &str,
        spec: &UsageSpec,
        start: SystemTime,
        end: SystemTime,
        period: Duration,
    ) -> Result<Vec<Datapoint>, ApiError>;
}

/// Caller identity lookup.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Account ID of the credentials in use.
    async fn caller_account(&self) -> Result<String, ApiError>;
}
