//! Cache-mediated, per-region collection for one job.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aws_config::SdkConfig;
use quota_cache::{Cache, CacheRead};
use quota_core::{Job, MetricRecord, ProduceFn, ProduceFuture, Quota, QuotaUsage};
use quota_reconcile::{Reconciler, Scope};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::{IdentityApi, QuotaApi, QuotaPage};
use crate::arn::validate_role_arn;
use crate::aws::{self, AwsIdentity, AwsQuotaApi};
use crate::error::{ApiError, ScrapeError, ScrapeResult};
use crate::usage;

/// Per-job scraping options shared by every job of one process.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// How long a snapshot stays fresh. Zero disables caching.
    pub cache_lifetime: Duration,
    /// Serve an expired snapshot while refreshing it in the background.
    pub serve_stale: bool,
    pub collect_usage: bool,
    pub cache_dir: PathBuf,
    /// Deadline for each upstream call.
    pub api_timeout: Duration,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            cache_lifetime: Duration::from_secs(300),
            serve_stale: false,
            collect_usage: false,
            cache_dir: std::env::temp_dir().join("aws_quota_exporter_cache"),
            api_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Applied,
    Default,
}

impl Listing {
    fn operation(self) -> &'static str {
        match self {
            Listing::Applied => "ListServiceQuotas",
            Listing::Default => "ListAWSDefaultServiceQuotas",
        }
    }
}

#[derive(Clone)]
struct Inner {
    job: Job,
    account_id: String,
    api: Arc<dyn QuotaApi>,
    reconciler: Reconciler,
    cache: Option<Cache>,
    options: ScrapeOptions,
}

/// Scrapes one job. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct JobScraper {
    inner: Arc<Inner>,
}

impl JobScraper {
    pub fn new(job: Job, api: Arc<dyn QuotaApi>, reconciler: Reconciler, options: ScrapeOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                job,
                account_id: String::new(),
                api,
                reconciler,
                cache: None,
                options,
            }),
        }
    }

    /// Set the account ID copied into every record.
    pub fn with_account(self, account_id: impl Into<String>) -> Self {
        self.map_inner(|inner| inner.account_id = account_id.into())
    }

    pub fn with_cache(self, cache: Cache) -> Self {
        self.map_inner(|inner| inner.cache = Some(cache))
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.inner);
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn job(&self) -> &Job {
        &self.inner.job
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.inner.cache.as_ref()
    }

    /// Adapt into the zero-argument producer used by the metrics adapter.
    pub fn into_fn(self) -> ProduceFn {
        Arc::new(move || -> ProduceFuture {
            let this = self.clone();
            Box::pin(async move { this.scrape().await.map_err(anyhow::Error::from) })
        })
    }

    /// Current records for this job, from cache when possible.
    pub async fn scrape(&self) -> ScrapeResult<Vec<MetricRecord>> {
        let service_code = &self.inner.job.service_code;
        let start = Instant::now();

        if let Some(cache) = &self.inner.cache {
            match cache.read() {
                Ok(CacheRead::Fresh(records)) => {
                    info!(%service_code, regions = ?self.inner.job.regions, duration = ?start.elapsed(), "metrics read from cache");
                    return Ok(records);
                }
                Ok(CacheRead::Expired(records)) if self.inner.options.serve_stale => {
                    let refreshing = cache.begin_stale_refresh(|| self.spawn_refresh());
                    info!(%service_code, refreshing, "serving stale metrics");
                    return Ok(records);
                }
                Ok(CacheRead::Expired(_)) => debug!(%service_code, "cache expired"),
                Ok(CacheRead::Empty) => debug!(%service_code, "cache empty"),
                Err(e) => debug!(%service_code, error = %e, "cache read error"),
            }
        }

        self.scrape_fresh().await
    }

    /// Refresh in the background. The stale flag is lowered here unless a
    /// write succeeded, so a failed refresh never pins the old snapshot.
    fn spawn_refresh(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            let stored = match this.collect_regions().await {
                Ok(records) => this.store(&records),
                Err(e) => {
                    error!(service_code = %this.inner.job.service_code, error = %e, "background refresh failed");
                    false
                }
            };
            if !stored {
                if let Some(cache) = &this.inner.cache {
                    cache.abandon_stale_refresh();
                }
            }
        });
    }

    /// Scrape every region upstream and refresh the cache.
    ///
    /// The first failing region aborts the others and fails the whole
    /// invocation; no partial record set is returned.
    pub async fn scrape_fresh(&self) -> ScrapeResult<Vec<MetricRecord>> {
        let records = self.collect_regions().await?;
        self.store(&records);
        Ok(records)
    }

    async fn collect_regions(&self) -> ScrapeResult<Vec<MetricRecord>> {
        let job = &self.inner.job;
        let start = Instant::now();
        info!(service_code = %job.service_code, regions = ?job.regions, "scraping metrics");

        let mut workers = JoinSet::new();
        for region in &job.regions {
            let this = self.clone();
            let region = region.clone();
            workers.spawn(async move { this.scrape_region(&region).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let result = joined.map_err(|e| ScrapeError::Worker(e.to_string())).and_then(|r| r);
            match result {
                Ok(mut region_records) => records.append(&mut region_records),
                Err(e) => {
                    workers.abort_all();
                    error!(service_code = %job.service_code, error = %e, "failed to get service quotas");
                    return Err(e);
                }
            }
        }

        info!(
            service_code = %job.service_code,
            records = records.len(),
            duration = ?start.elapsed(),
            "metrics scraped"
        );
        Ok(records)
    }

    /// Write `records` to the cache. Returns whether a write succeeded.
    fn store(&self, records: &[MetricRecord]) -> bool {
        let Some(cache) = &self.inner.cache else {
            return false;
        };
        match cache.write(records) {
            Ok(()) => true,
            Err(e) => {
                warn!(service_code = %self.inner.job.service_code, error = %e, "cache write failed");
                false
            }
        }
    }

    async fn scrape_region(&self, region: &str) -> ScrapeResult<Vec<MetricRecord>> {
        let (applied, defaults) = tokio::try_join!(
            self.list_all(region, Listing::Applied),
            self.list_all(region, Listing::Default),
        )?;
        let quotas = merge(applied, defaults);

        let options = &self.inner.options;
        let quotas: Vec<QuotaUsage> = if options.collect_usage {
            usage::resolve(self.inner.api.as_ref(), region, quotas, options.api_timeout).await
        } else {
            quotas.into_iter().map(QuotaUsage::unmeasured).collect()
        };

        let scope = Scope {
            region: region.to_string(),
            account_id: self.inner.account_id.clone(),
            account_name: self.inner.job.account_name().to_string(),
        };
        Ok(self
            .inner
            .reconciler
            .reconcile(&scope, &quotas, options.collect_usage))
    }

    /// Follow next-page tokens until the listing is exhausted.
    async fn list_all(&self, region: &str, listing: Listing) -> ScrapeResult<Vec<Quota>> {
        let api = &self.inner.api;
        let service_code = &self.inner.job.service_code;
        let mut quotas = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page: QuotaPage = with_deadline(
                listing.operation(),
                region,
                self.inner.options.api_timeout,
                async {
                    match listing {
                        Listing::Applied => {
                            api.list_service_quotas(region, service_code, token.clone()).await
                        }
                        Listing::Default => {
                            api.list_default_service_quotas(region, service_code, token.clone())
                                .await
                        }
                    }
                },
            )
            .await?;
            quotas.extend(page.quotas);
            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        debug!(%region, %service_code, operation = listing.operation(), quotas = quotas.len(), "listing complete");
        Ok(quotas)
    }
}

/// Applied quotas followed by the defaults whose code has no applied entry.
fn merge(applied: Vec<Quota>, defaults: Vec<Quota>) -> Vec<Quota> {
    let codes: HashSet<String> = applied.iter().map(|q| q.quota_code.clone()).collect();
    applied
        .into_iter()
        .chain(defaults.into_iter().filter(|q| !codes.contains(&q.quota_code)))
        .collect()
}

async fn with_deadline<T, F>(
    operation: &'static str,
    region: &str,
    timeout: Duration,
    call: F,
) -> ScrapeResult<T>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ScrapeError::Upstream {
            operation,
            region: region.to_string(),
            source,
        }),
        Err(_) => Err(ScrapeError::Timeout {
            operation,
            region: region.to_string(),
            timeout,
        }),
    }
}

/// Account ID of the credentials in use, or empty when the lookup fails.
pub async fn resolve_account(identity: &dyn IdentityApi, timeout: Duration) -> String {
    match tokio::time::timeout(timeout, identity.caller_account()).await {
        Ok(Ok(account)) => account,
        Ok(Err(e)) => {
            warn!(error = %e, "failed to get caller identity");
            String::new()
        }
        Err(_) => {
            warn!(?timeout, "caller identity lookup timed out");
            String::new()
        }
    }
}

/// Builds [`JobScraper`]s against AWS from one base configuration.
#[derive(Clone)]
pub struct Scraper {
    base: SdkConfig,
    reconciler: Reconciler,
}

impl Scraper {
    /// Load the default AWS configuration.
    pub async fn new(reconciler: Reconciler) -> Self {
        Self {
            base: aws::load_default_config().await,
            reconciler,
        }
    }

    pub fn with_config(base: SdkConfig, reconciler: Reconciler) -> Self {
        Self { base, reconciler }
    }

    /// Set up one job and return its producer.
    pub async fn create_scraper(&self, job: &Job, options: &ScrapeOptions) -> ScrapeResult<ProduceFn> {
        Ok(self.create_job(job, options).await?.into_fn())
    }

    /// Set up one job.
    ///
    /// A malformed role ARN is an error. Identity lookup and cache setup
    /// are best-effort.
    pub async fn create_job(&self, job: &Job, options: &ScrapeOptions) -> ScrapeResult<JobScraper> {
        let sdk = match job.role.as_deref().filter(|r| !r.is_empty()) {
            Some(role) => {
                if !validate_role_arn(role) {
                    return Err(ScrapeError::InvalidRoleArn(role.to_string()));
                }
                aws::assume_role_config(&self.base, role).await
            }
            None => self.base.clone(),
        };

        let account_id = resolve_account(&AwsIdentity::new(&sdk), options.api_timeout).await;
        let mut scraper = JobScraper::new(
            job.clone(),
            Arc::new(AwsQuotaApi::new(sdk)),
            self.reconciler.clone(),
            options.clone(),
        )
        .with_account(account_id.clone());

        if let Some(cache) = open_cache(job, options) {
            scraper = scraper.with_cache(cache);
        } else {
            warn!(service_code = %job.service_code, account = %account_id, "cache disabled");
        }
        Ok(scraper)
    }
}

/// Open the job's cache. `None` when caching is off or storage is unusable.
pub fn open_cache(job: &Job, options: &ScrapeOptions) -> Option<Cache> {
    if options.cache_lifetime.is_zero() {
        return None;
    }
    match Cache::open(&options.cache_dir, &job.service_code, options.cache_lifetime) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(service_code = %job.service_code, error = %e, "cache unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::SystemTime;

    use async_trait::async_trait;
    use quota_core::{Statistic, UsageSpec};
    use quota_reconcile::PatternRegistry;

    use crate::api::Datapoint;

    fn quota(code: &str, name: &str, value: f64) -> Quota {
        Quota {
            service_code: "test".to_string(),
            service_name: "Test Service".to_string(),
            quota_code: code.to_string(),
            quota_name: name.to_string(),
            value,
            unit: "None".to_string(),
            adjustable: true,
            global_quota: false,
            usage: None,
        }
    }

    fn usage_spec(statistic: Statistic) -> UsageSpec {
        UsageSpec {
            metric_name: "CallCount".to_string(),
            metric_namespace: "AWS/Usage".to_string(),
            dimensions: Default::default(),
            statistic,
        }
    }

    /// In-memory upstream. Listings are paged `page_size` quotas at a time.
    #[derive(Default)]
    struct FakeApi {
        applied: HashMap<String, Vec<Quota>>,
        defaults: HashMap<String, Vec<Quota>>,
        page_size: usize,
        /// Every call in this region fails.
        failing_region: Option<String>,
        /// Only the default listing fails.
        failing_default_region: Option<String>,
        /// Any listing page requested with this token fails.
        failing_token: Option<String>,
        /// Fail every listing while set.
        outage: AtomicBool,
        slow_region: Option<String>,
        usage: HashMap<String, Result<Vec<Datapoint>, String>>,
        list_calls: AtomicUsize,
        usage_calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn page(&self, all: Option<&Vec<Quota>>, token: Option<String>) -> QuotaPage {
            let all = all.cloned().unwrap_or_default();
            let size = self.page_size.max(1);
            let offset: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
            let end = (offset + size).min(all.len());
            QuotaPage {
                quotas: all[offset.min(end)..end].to_vec(),
                next_token: (end < all.len()).then(|| end.to_string()),
            }
        }

        async fn gate(&self, region: &str, listing: Listing, token: Option<&str>) -> Result<(), ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.slow_region.as_deref() == Some(region) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let default_fails = matches!(listing, Listing::Default)
                && self.failing_default_region.as_deref() == Some(region);
            let page_fails = token.is_some() && token == self.failing_token.as_deref();
            if self.failing_region.as_deref() == Some(region)
                || default_fails
                || page_fails
                || self.outage.load(Ordering::SeqCst)
            {
                return Err(ApiError::new("AccessDenied"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QuotaApi for FakeApi {
        async fn list_service_quotas(
            &self,
            region: &str,
            _service_code: &str,
            next_token: Option<String>,
        ) -> Result<QuotaPage, ApiError> {
            self.gate(region, Listing::Applied, next_token.as_deref()).await?;
            Ok(self.page(self.applied.get(region), next_token))
        }

        async fn list_default_service_quotas(
            &self,
            region: &str,
            _service_code: &str,
            next_token: Option<String>,
        ) -> Result<QuotaPage, ApiError> {
            self.gate(region, Listing::Default, next_token.as_deref()).await?;
            Ok(self.page(self.defaults.get(region), next_token))
        }

        async fn usage_statistic(
            &self,
            region: &str,
            spec: &UsageSpec,
            _start: SystemTime,
            _end: SystemTime,
            _period: Duration,
        ) -> Result<Vec<Datapoint>, ApiError> {
            self.usage_calls.lock().unwrap().push(region.to_string());
            match self.usage.get(&spec.metric_name) {
                Some(Ok(points)) => Ok(points.clone()),
                Some(Err(e)) => Err(ApiError::new(e.clone())),
                None => Ok(vec![]),
            }
        }
    }

    struct FakeIdentity(Result<String, String>);

    #[async_trait]
    impl IdentityApi for FakeIdentity {
        async fn caller_account(&self) -> Result<String, ApiError> {
            self.0.clone().map_err(ApiError::new)
        }
    }

    fn job(regions: &[&str]) -> Job {
        Job {
            service_code: "test".to_string(),
            regions: regions.iter().map(|r| r.to_string()).collect(),
            role: None,
            account_name: Some("prod".to_string()),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Arc::new(PatternRegistry::default()), 0.7).unwrap()
    }

    fn options() -> ScrapeOptions {
        ScrapeOptions {
            api_timeout: Duration::from_millis(200),
            ..ScrapeOptions::default()
        }
    }

    fn scraper(api: FakeApi, regions: &[&str], options: ScrapeOptions) -> (JobScraper, Arc<FakeApi>) {
        let api = Arc::new(api);
        let s = JobScraper::new(job(regions), api.clone(), reconciler(), options).with_account("123456789012");
        (s, api)
    }

    fn values_by_code(records: &[MetricRecord], ty: &str) -> HashMap<String, f64> {
        records
            .iter()
            .filter(|r| r.labels.get("type").map(String::as_str) == Some(ty))
            .map(|r| (r.labels["quota_code"].clone(), r.value))
            .collect()
    }

    // ── Listing and merge ──────────────────────────────────────────

    #[tokio::test]
    async fn test_applied_quota_wins_over_default() {
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 200.0)])]),
            defaults: HashMap::from([(
                "us-east-1".to_string(),
                vec![quota("L-1", "Buckets", 100.0), quota("L-2", "Access points", 10.0)],
            )]),
            page_size: 100,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], options());
        let records = s.scrape().await.unwrap();
        let values = values_by_code(&records, "quota");
        assert_eq!(values.len(), 2);
        assert_eq!(values["L-1"], 200.0);
        assert_eq!(values["L-2"], 10.0);
        assert!(records.iter().all(|r| r.labels["account"] == "123456789012"));
        assert!(records.iter().all(|r| r.labels["account_name"] == "prod"));
    }

    #[tokio::test]
    async fn test_pagination_is_followed() {
        let quotas: Vec<_> = (0..5)
            .map(|i| quota(&format!("L-{i}"), &format!("Distinct limit number {i} xyz{i}"), i as f64))
            .collect();
        let api = FakeApi {
            applied: HashMap::from([("eu-west-1".to_string(), quotas)]),
            page_size: 2,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["eu-west-1"], options());
        let records = s.scrape().await.unwrap();
        assert_eq!(values_by_code(&records, "quota").len(), 5);
        // Three applied pages plus one empty default page.
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_regions_are_labelled() {
        let api = FakeApi {
            applied: HashMap::from([
                ("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)]),
                ("us-west-2".to_string(), vec![quota("L-1", "Buckets", 2.0)]),
            ]),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1", "us-west-2"], options());
        let records = s.scrape().await.unwrap();
        let regions: HashSet<&str> = records.iter().map(|r| r.labels["region"].as_str()).collect();
        assert_eq!(regions, HashSet::from(["us-east-1", "us-west-2"]));
    }

    // ── Failures ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_one_failing_region_fails_the_job() {
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            failing_region: Some("eu-central-1".to_string()),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1", "eu-central-1"], options());
        let err = s.scrape().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Upstream { ref region, .. } if region == "eu-central-1"), "{err}");
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let api = FakeApi {
            slow_region: Some("ap-south-1".to_string()),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["ap-south-1"], options());
        let err = s.scrape().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Timeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_default_listing_failure_fails_the_job() {
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            failing_default_region: Some("us-east-1".to_string()),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], options());
        let err = s.scrape().await.unwrap_err();
        assert!(
            matches!(err, ScrapeError::Upstream { operation: "ListAWSDefaultServiceQuotas", .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_later_page_failure_fails_the_job() {
        let quotas: Vec<_> = (0..5)
            .map(|i| quota(&format!("L-{i}"), &format!("Limit {i}"), i as f64))
            .collect();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), quotas)]),
            page_size: 2,
            failing_token: Some("2".to_string()),
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], options());
        let err = s.scrape().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Upstream { operation: "ListServiceQuotas", .. }), "{err}");
        // First page, failing second page, and the single default page.
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 3);
    }

    // ── Usage ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_usage_sum_is_normalized() {
        let mut q = quota("L-1", "Rate of calls", 100.0);
        q.usage = Some(usage_spec(Statistic::Sum));
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![q])]),
            usage: HashMap::from([(
                "CallCount".to_string(),
                Ok(vec![Datapoint { timestamp: 1, value: 3000.0 }]),
            )]),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], ScrapeOptions { collect_usage: true, ..options() });
        let records = s.scrape().await.unwrap();
        assert_eq!(values_by_code(&records, "usage")["L-1"], 5.0);
        assert_eq!(values_by_code(&records, "quota")["L-1"], 100.0);
    }

    #[tokio::test]
    async fn test_usage_failure_is_not_fatal() {
        let mut q = quota("L-1", "Rate of calls", 100.0);
        q.usage = Some(usage_spec(Statistic::Average));
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![q])]),
            usage: HashMap::from([("CallCount".to_string(), Err("Throttling".to_string()))]),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], ScrapeOptions { collect_usage: true, ..options() });
        let records = s.scrape().await.unwrap();
        assert_eq!(values_by_code(&records, "usage")["L-1"], 0.0);
    }

    #[tokio::test]
    async fn test_usage_not_queried_when_disabled() {
        let mut q = quota("L-1", "Rate of calls", 100.0);
        q.usage = Some(usage_spec(Statistic::Maximum));
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![q])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], options());
        let records = s.scrape().await.unwrap();
        assert!(values_by_code(&records, "usage").is_empty());
        assert!(api.usage_calls.lock().unwrap().is_empty());
    }

    // ── Cache ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fresh_cache_skips_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], options());
        let s = s.with_cache(Cache::open(dir.path(), "test", Duration::from_secs(60)).unwrap());

        let first = s.scrape().await.unwrap();
        let calls = api.list_calls.load(Ordering::SeqCst);
        let second = s.scrape().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_expired_cache_without_stale_serving_rescrapes() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], options());
        let s = s.with_cache(Cache::open(dir.path(), "test", Duration::ZERO).unwrap());

        s.scrape().await.unwrap();
        let calls = api.list_calls.load(Ordering::SeqCst);
        s.scrape().await.unwrap();
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls * 2);
    }

    #[tokio::test]
    async fn test_stale_snapshot_served_while_refreshing() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], ScrapeOptions { serve_stale: true, ..options() });
        let cache = Cache::open(dir.path(), "test", Duration::ZERO).unwrap();
        let s = s.with_cache(cache.clone());

        let first = s.scrape().await.unwrap();
        let calls = api.list_calls.load(Ordering::SeqCst);

        let stale = s.scrape().await.unwrap();
        assert_eq!(stale, first);
        assert!(cache.serving_stale());

        // Let the background refresh run to completion.
        for _ in 0..50 {
            if !cache.serving_stale() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!cache.serving_stale());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls * 2);
    }

    #[tokio::test]
    async fn test_failed_scrape_does_not_touch_cache() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            failing_region: Some("us-east-1".to_string()),
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], options());
        let cache = Cache::open(dir.path(), "test", Duration::from_secs(60)).unwrap();
        let s = s.with_cache(cache.clone());
        assert!(s.scrape().await.is_err());
        assert_eq!(cache.read().unwrap(), CacheRead::Empty);
    }

    async fn wait_for_refresh(cache: &Cache) {
        for _ in 0..50 {
            if !cache.serving_stale() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_failed_background_refresh_is_rescheduled() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], ScrapeOptions { serve_stale: true, ..options() });
        let cache = Cache::open(dir.path(), "test", Duration::ZERO).unwrap();
        let s = s.with_cache(cache.clone());

        let first = s.scrape().await.unwrap();
        let calls = api.list_calls.load(Ordering::SeqCst);
        api.outage.store(true, Ordering::SeqCst);

        assert_eq!(s.scrape().await.unwrap(), first);
        wait_for_refresh(&cache).await;
        assert!(!cache.serving_stale());
        assert!(api.list_calls.load(Ordering::SeqCst) > calls);

        let before = api.list_calls.load(Ordering::SeqCst);
        assert_eq!(s.scrape().await.unwrap(), first);
        assert!(cache.serving_stale());
        wait_for_refresh(&cache).await;
        assert!(api.list_calls.load(Ordering::SeqCst) > before);
    }

    #[tokio::test]
    async fn test_failed_cache_write_does_not_pin_stale_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, api) = scraper(api, &["us-east-1"], ScrapeOptions { serve_stale: true, ..options() });
        let cache = Cache::open(dir.path(), "test", Duration::ZERO).unwrap();
        let s = s.with_cache(cache.clone());

        let first = s.scrape().await.unwrap();
        let calls = api.list_calls.load(Ordering::SeqCst);
        let snapshot = std::fs::read(cache.path()).unwrap();

        // Serve stale; the refresh is spawned but has not run yet.
        assert_eq!(s.scrape().await.unwrap(), first);
        assert!(cache.serving_stale());

        // A directory in place of the file makes the refresh's write fail.
        std::fs::remove_file(cache.path()).unwrap();
        std::fs::create_dir(cache.path()).unwrap();
        wait_for_refresh(&cache).await;
        assert!(!cache.serving_stale());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls * 2);

        // Readable again: the next pull serves stale and refreshes again.
        std::fs::remove_dir(cache.path()).unwrap();
        std::fs::write(cache.path(), &snapshot).unwrap();
        assert_eq!(s.scrape().await.unwrap(), first);
        wait_for_refresh(&cache).await;
        assert_eq!(api.list_calls.load(Ordering::SeqCst), calls * 3);
        assert!(!cache.serving_stale());
    }

    // ── Producer and setup ─────────────────────────────────────────

    #[tokio::test]
    async fn test_into_fn_produces_records() {
        let api = FakeApi {
            applied: HashMap::from([("us-east-1".to_string(), vec![quota("L-1", "Buckets", 1.0)])]),
            page_size: 10,
            ..Default::default()
        };
        let (s, _) = scraper(api, &["us-east-1"], options());
        let produce = s.into_fn();
        assert_eq!(produce().await.unwrap().len(), 1);
        assert_eq!(produce().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_identity_failure_yields_empty_account() {
        let identity = FakeIdentity(Err("ExpiredToken".to_string()));
        assert_eq!(resolve_account(&identity, Duration::from_secs(1)).await, "");
        let identity = FakeIdentity(Ok("123456789012".to_string()));
        assert_eq!(resolve_account(&identity, Duration::from_secs(1)).await, "123456789012");
    }

    #[test]
    fn test_open_cache_disabled_for_zero_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ScrapeOptions {
            cache_lifetime: Duration::ZERO,
            cache_dir: dir.path().to_path_buf(),
            ..options()
        };
        assert!(open_cache(&job(&["us-east-1"]), &opts).is_none());

        let opts = ScrapeOptions {
            cache_lifetime: Duration::from_secs(60),
            ..opts
        };
        assert!(open_cache(&job(&["us-east-1"]), &opts).is_some());
    }

    #[tokio::test]
    async fn test_invalid_role_is_rejected_at_setup() {
        let scraper = Scraper::with_config(SdkConfig::builder().build(), reconciler());
        let mut j = job(&["us-east-1"]);
        j.role = Some("arn:aws:iam::012345678901:user/x".to_string());
        let err = scraper.create_job(&j, &options()).await.err().unwrap();
        assert!(matches!(err, ScrapeError::InvalidRoleArn(_)));
        let err = scraper.create_scraper(&j, &options()).await.err().unwrap();
        assert!(matches!(err, ScrapeError::InvalidRoleArn(_)));
    }
}
