//! Registered collectors and text exposition.

use std::sync::Arc;

use futures_util::future::join_all;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collector::{QuotaCollector, Sample};
use crate::error::{CollectError, GatherError};

/// Content type of [`ExporterRegistry::gather`] output.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Shared handle to every registered collector.
#[derive(Clone, Default)]
pub struct ExporterRegistry {
    collectors: Arc<RwLock<Vec<Arc<QuotaCollector>>>>,
}

impl ExporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe `collector` and keep it if its descriptors are valid.
    pub async fn register(&self, collector: QuotaCollector) -> Result<(), CollectError> {
        let descs = collector.describe().await?;
        info!(collector = %collector.name(), descriptors = descs.len(), "collector registered");
        self.collectors.write().await.push(Arc::new(collector));
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.collectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.collectors.read().await.is_empty()
    }

    /// Collect every registered collector and encode the samples.
    ///
    /// Fails when any collector produced an invalid sample. Gauges that a
    /// fresh registry refuses (for example two records that share a name
    /// but not a label set) are skipped with a warning.
    pub async fn gather(&self) -> Result<String, GatherError> {
        let collectors: Vec<Arc<QuotaCollector>> = self.collectors.read().await.clone();
        let collected = join_all(collectors.iter().map(|c| c.collect())).await;

        let registry = Registry::new();
        let mut errors = Vec::new();
        let mut gauges = 0usize;
        for sample in collected.into_iter().flatten() {
            match sample {
                Sample::Gauge(g) => {
                    if let Err(e) = registry.register(Box::new(g)) {
                        warn!(error = %e, "skipping metric");
                    } else {
                        gauges += 1;
                    }
                }
                Sample::Invalid { error, .. } => errors.push(error),
            }
        }
        if !errors.is_empty() {
            return Err(GatherError::Collect(errors));
        }

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .map_err(|e| GatherError::Encode(e.to_string()))?;
        debug!(collectors = collectors.len(), gauges, bytes = buf.len(), "metrics gathered");
        String::from_utf8(buf).map_err(|e| GatherError::Encode(e.to_string()))
    }
}
