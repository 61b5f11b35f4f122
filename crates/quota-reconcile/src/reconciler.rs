//! Quota listings to metric records.

use std::sync::Arc;

use quota_core::naming::{description, metric_name};
use quota_core::{Labels, MetricRecord, QuotaUsage};
use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};
use crate::grouping::{Grouping, Member};
use crate::patterns::PatternRegistry;

/// Similarity threshold used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Where a batch of quotas was scraped. Copied into every record's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub region: String,
    pub account_id: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricType {
    Quota,
    Usage,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            MetricType::Quota => "quota",
            MetricType::Usage => "usage",
        }
    }
}

/// Pattern registry plus clustering, applied per scope.
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: Arc<PatternRegistry>,
    grouping: Grouping,
}

impl Reconciler {
    pub fn new(registry: Arc<PatternRegistry>, threshold: f64) -> ReconcileResult<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ReconcileError::InvalidThreshold(threshold));
        }
        Ok(Self {
            registry,
            grouping: Grouping::new(threshold),
        })
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Reconcile one region's quotas into metric records.
    ///
    /// Pattern matches are emitted first, then promoted cluster members,
    /// then singletons. A usage record follows each quota record when
    /// `collect_usage` is set and the quota declares a usage series.
    pub fn reconcile(
        &self,
        scope: &Scope,
        quotas: &[QuotaUsage],
        collect_usage: bool,
    ) -> Vec<MetricRecord> {
        let mut records = Vec::new();
        let mut unmatched = Vec::new();

        for q in quotas {
            match self
                .registry
                .match_quota(&q.quota.service_code, &q.quota.quota_name)
            {
                Some(m) => push_with_usage(&mut records, collect_usage, q, |ty| {
                    let mut labels = m.captures.clone();
                    labels.extend(base_labels(scope, q, ty));
                    record(q, m.name, labels, ty)
                }),
                None => unmatched.push(q.clone()),
            }
        }
        let matched = records.len();

        let (groups, promoted) = self.grouping.group(&unmatched);
        for (gi, mi) in promoted {
            let group = &groups[gi];
            let Member { quota: q, kind, .. } = &group.members[mi];
            push_with_usage(&mut records, collect_usage, q, |ty| {
                let mut labels = base_labels(scope, q, ty);
                labels.insert("kind".to_string(), kind.clone());
                record(q, &group.common, labels, ty)
            });
        }

        for group in groups.iter().filter(|g| g.is_singleton()) {
            let q = &group.members[0].quota;
            let name = q.quota.quota_name.as_str();
            push_with_usage(&mut records, collect_usage, q, |ty| {
                let mut labels = base_labels(scope, q, ty);
                labels.insert("kind".to_string(), name.to_string());
                record(q, name, labels, ty)
            });
        }

        debug!(
            region = %scope.region,
            quotas = quotas.len(),
            matched,
            groups = groups.len(),
            records = records.len(),
            "quotas reconciled"
        );
        records
    }
}

fn push_with_usage<F>(records: &mut Vec<MetricRecord>, collect_usage: bool, q: &QuotaUsage, build: F)
where
    F: Fn(MetricType) -> MetricRecord,
{
    records.push(build(MetricType::Quota));
    if collect_usage && q.quota.usage.is_some() {
        records.push(build(MetricType::Usage));
    }
}

fn record(q: &QuotaUsage, name: &str, labels: Labels, ty: MetricType) -> MetricRecord {
    let value = match ty {
        MetricType::Quota => q.quota.value,
        MetricType::Usage => q.usage,
    };
    MetricRecord {
        name: metric_name(&q.quota.service_code, name),
        labels,
        value,
        desc: description(&q.quota.service_name, &q.quota.service_code, name),
    }
}

fn base_labels(scope: &Scope, q: &QuotaUsage, ty: MetricType) -> Labels {
    let quota = &q.quota;
    Labels::from([
        ("type".to_string(), ty.as_str().to_string()),
        ("adjustable".to_string(), quota.adjustable.to_string()),
        ("global_quota".to_string(), quota.global_quota.to_string()),
        ("unit".to_string(), quota.unit.clone()),
        ("region".to_string(), scope.region.clone()),
        ("account".to_string(), scope.account_id.clone()),
        ("account_name".to_string(), scope.account_name.clone()),
        ("name".to_string(), quota.quota_name.clone()),
        ("quota_code".to_string(), quota.quota_code.clone()),
        ("service_code".to_string(), quota.service_code.clone()),
    ])
}
