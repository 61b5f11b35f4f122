//! AWS SDK implementations of the upstream traits.
//!
//! Clients are built per region from one shared [`SdkConfig`], so every
//! region of a job uses the same credentials (optionally an assumed role).

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::Dimension;
use aws_sdk_servicequotas::error::DisplayErrorContext;
use aws_sdk_servicequotas::types::{MetricInfo, ServiceQuota};
use quota_core::{Quota, Statistic, UsageSpec};
use tracing::debug;

use crate::api::{Datapoint, IdentityApi, QuotaApi, QuotaPage};
use crate::error::ApiError;

/// Page size requested from the quota listings.
const MAX_RESULTS: i32 = 100;

const SESSION_NAME: &str = "aws-quota-exporter";

fn api_err<E: std::error::Error>(e: E) -> ApiError {
    ApiError(DisplayErrorContext(e).to_string())
}

/// Load the default credential chain and region.
pub async fn load_default_config() -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest()).load().await
}

/// Configuration whose credentials come from assuming `role_arn` with the
/// credentials of `base`.
pub async fn assume_role_config(base: &SdkConfig, role_arn: &str) -> SdkConfig {
    let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
        .session_name(SESSION_NAME)
        .configure(base)
        .build()
        .await;
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).credentials_provider(provider);
    if let Some(region) = base.region() {
        loader = loader.region(region.clone());
    }
    loader.load().await
}

// ── Service Quotas + CloudWatch ────────────────────────────────────

/// [`QuotaApi`] backed by Service Quotas and CloudWatch.
#[derive(Debug, Clone)]
pub struct AwsQuotaApi {
    sdk: SdkConfig,
}

impl AwsQuotaApi {
    pub fn new(sdk: SdkConfig) -> Self {
        Self { sdk }
    }

    fn quotas_client(&self, region: &str) -> aws_sdk_servicequotas::Client {
        let conf = aws_sdk_servicequotas::config::Builder::from(&self.sdk)
            .region(aws_sdk_servicequotas::config::Region::new(region.to_string()))
            .build();
        aws_sdk_servicequotas::Client::from_conf(conf)
    }

    fn cloudwatch_client(&self, region: &str) -> aws_sdk_cloudwatch::Client {
        let conf = aws_sdk_cloudwatch::config::Builder::from(&self.sdk)
            .region(aws_sdk_cloudwatch::config::Region::new(region.to_string()))
            .build();
        aws_sdk_cloudwatch::Client::from_conf(conf)
    }
}

#[async_trait]
impl QuotaApi for AwsQuotaApi {
    async fn list_service_quotas(
        &self,
        region: &str,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<QuotaPage, ApiError> {
        let out = self
            .quotas_client(region)
            .list_service_quotas()
            .service_code(service_code)
            .max_results(MAX_RESULTS)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(api_err)?;
        debug!(%region, %service_code, quotas = out.quotas().len(), "applied quota page");
        Ok(QuotaPage {
            quotas: out.quotas().iter().map(convert_quota).collect(),
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn list_default_service_quotas(
        &self,
        region: &str,
        service_code: &str,
        next_token: Option<String>,
    ) -> Result<QuotaPage, ApiError> {
        let out = self
            .quotas_client(region)
            .list_aws_default_service_quotas()
            .service_code(service_code)
            .max_results(MAX_RESULTS)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(api_err)?;
        debug!(%region, %service_code, quotas = out.quotas().len(), "default quota page");
        Ok(QuotaPage {
            quotas: out.quotas().iter().map(convert_quota).collect(),
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn usage_statistic(
        &self,
        region: &str,
        spec: &UsageSpec,
        start: SystemTime,
        end: SystemTime,
        period: Duration,
    ) -> Result<Vec<Datapoint>, ApiError> {
        let dimensions = cloudwatch_dimensions(spec);

        let out = self
            .cloudwatch_client(region)
            .get_metric_statistics()
            .namespace(&spec.metric_namespace)
            .metric_name(&spec.metric_name)
            .set_dimensions(Some(dimensions))
            .start_time(DateTime::from(start))
            .end_time(DateTime::from(end))
            .period(i32::try_from(period.as_secs()).unwrap_or(i32::MAX))
            .statistics(aws_sdk_cloudwatch::types::Statistic::from(spec.statistic.as_str()))
            .send()
            .await
            .map_err(api_err)?;

        Ok(out
            .datapoints()
            .iter()
            .filter_map(|p| {
                Some(Datapoint {
                    timestamp: p.timestamp()?.secs(),
                    value: statistic_value(p, spec.statistic)?,
                })
            })
            .collect())
    }
}

fn statistic_value(p: &aws_sdk_cloudwatch::types::Datapoint, statistic: Statistic) -> Option<f64> {
    match statistic {
        Statistic::Maximum => p.maximum(),
        Statistic::Minimum => p.minimum(),
        Statistic::Average => p.average(),
        Statistic::Sum => p.sum(),
        Statistic::SampleCount => p.sample_count(),
    }
}

fn cloudwatch_dimensions(spec: &UsageSpec) -> Vec<Dimension> {
    spec.dimensions
        .iter()
        .map(|(name, value)| Dimension::builder().name(name).value(value).build())
        .collect()
}

fn convert_quota(q: &ServiceQuota) -> Quota {
    Quota {
        service_code: q.service_code().unwrap_or_default().to_string(),
        service_name: q.service_name().unwrap_or_default().to_string(),
        quota_code: q.quota_code().unwrap_or_default().to_string(),
        quota_name: q.quota_name().unwrap_or_default().to_string(),
        value: q.value().unwrap_or_default(),
        unit: q.unit().unwrap_or_default().to_string(),
        adjustable: q.adjustable(),
        global_quota: q.global_quota(),
        usage: q.usage_metric().and_then(convert_usage),
    }
}

/// A usage spec needs both a metric name and a namespace. A missing or
/// unknown statistic recommendation falls back to `Maximum`.
fn convert_usage(m: &MetricInfo) -> Option<UsageSpec> {
    let metric_name = m.metric_name().filter(|s| !s.is_empty())?;
    let metric_namespace = m.metric_namespace().filter(|s| !s.is_empty())?;
    let dimensions: BTreeMap<String, String> = m
        .metric_dimensions()
        .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let statistic = m
        .metric_statistic_recommendation()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Statistic::Maximum);
    Some(UsageSpec {
        metric_name: metric_name.to_string(),
        metric_namespace: metric_namespace.to_string(),
        dimensions,
        statistic,
    })
}

// ── STS ────────────────────────────────────────────────────────────

/// [`IdentityApi`] backed by STS `GetCallerIdentity`.
#[derive(Debug, Clone)]
pub struct AwsIdentity {
    client: aws_sdk_sts::Client,
}

impl AwsIdentity {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(sdk),
        }
    }
}

#[async_trait]
impl IdentityApi for AwsIdentity {
    async fn caller_account(&self) -> Result<String, ApiError> {
        let out = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(api_err)?;
        out.account()
            .map(str::to_string)
            .ok_or_else(|| ApiError::new("caller identity has no account"))
    }
}
