//! Usage resolution for quotas that declare a usage series.
//!
//! Each lookup reads one statistic over the last ten minutes. `Sum` is
//! divided by the window length to give a per-second rate; other
//! statistics are used as returned. A failed or empty lookup leaves the
//! quota's usage at zero.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use futures_util::future::join_all;
use quota_core::{Quota, QuotaUsage, Statistic};
use tracing::{debug, warn};

use crate::api::{Datapoint, QuotaApi};

/// Window (and statistic period) of every usage lookup.
pub const USAGE_WINDOW: Duration = Duration::from_secs(600);

/// Scale a raw statistic into the value exported as usage.
pub fn normalize(statistic: Statistic, raw: f64) -> f64 {
    match statistic {
        Statistic::Sum => raw / USAGE_WINDOW.as_secs_f64(),
        _ => raw,
    }
}

/// Value of the most recent datapoint.
pub fn latest(points: &[Datapoint]) -> Option<f64> {
    points.iter().max_by_key(|p| p.timestamp).map(|p| p.value)
}

/// Pair every quota with its current usage, looking up each distinct
/// quota code once.
pub async fn resolve(
    api: &dyn QuotaApi,
    region: &str,
    quotas: Vec<Quota>,
    timeout: Duration,
) -> Vec<QuotaUsage> {
    let end = SystemTime::now();
    let start = end - USAGE_WINDOW;

    let mut seen = HashMap::new();
    for q in &quotas {
        if let Some(spec) = &q.usage {
            seen.entry(q.quota_code.as_str()).or_insert(spec);
        }
    }

    let lookups = seen.into_iter().map(|(code, spec)| async move {
        let result = tokio::time::timeout(
            timeout,
            api.usage_statistic(region, spec, start, end, USAGE_WINDOW),
        )
        .await;
        let usage = match result {
            Ok(Ok(points)) => latest(&points).map_or(0.0, |raw| normalize(spec.statistic, raw)),
            Ok(Err(e)) => {
                warn!(%region, quota_code = %code, error = %e, "usage lookup failed");
                0.0
            }
            Err(_) => {
                warn!(%region, quota_code = %code, ?timeout, "usage lookup timed out");
                0.0
            }
        };
        (code.to_string(), usage)
    });
    let usage: HashMap<String, f64> = join_all(lookups).await.into_iter().collect();
    debug!(%region, lookups = usage.len(), "usage resolved");

    quotas
        .into_iter()
        .map(|quota| {
            let usage = usage.get(&quota.quota_code).copied().unwrap_or(0.0);
            QuotaUsage { quota, usage }
        })
        .collect()
}
