//! quotad — serve AWS service quotas as Prometheus metrics.
//!
//! # Usage
//!
//! ```text
//! quotad --config-file /etc/aqe/config.yml --prom-port 10100 --collect-usage
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use quota_core::JobList;
use quota_metrics::{ExporterRegistry, QuotaCollector};
use quota_reconcile::{PatternRegistry, Reconciler};
use quota_scraper::Scraper;
use quotad::build_info::{self, BuildInfo};
use quotad::cleanup::CacheCleanup;
use quotad::{AppState, Cli, build_router, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_format, cli.log_level, &cli.log_folder);

    let build = BuildInfo::current();
    info!(version = %build.version, platform = %build.platform, commit = %build.commit, "starting");

    let jobs = JobList::from_file(&cli.config_file)?;
    info!(jobs = jobs.jobs.len(), config = %cli.config_file.display(), "job list loaded");

    let patterns = Arc::new(PatternRegistry::aws_defaults()?);
    let reconciler = Reconciler::new(patterns, cli.grouping_threshold)?;
    let scraper = Scraper::new(reconciler).await;
    let options = cli.scrape_options();

    // ── Register collectors ────────────────────────────────────────
    let registry = ExporterRegistry::new();
    let mut cleanup = CacheCleanup::new(&options.cache_dir);
    for job in &jobs.jobs {
        let job_scraper = scraper
            .create_job(job, &options)
            .await
            .with_context(|| format!("setting up job {}", job.service_code))?;
        if let Some(cache) = job_scraper.cache() {
            cleanup.track(cache.path());
        }
        let name = format!("{}/{}", job.service_code, job.account_name());
        if let Err(e) = registry.register(QuotaCollector::new(name, job_scraper.into_fn())).await {
            error!(service_code = %job.service_code, error = %e, "collector registration failed");
        }
    }
    registry
        .register(QuotaCollector::new(build_info::METRIC_NAME, build.produce_fn()))
        .await?;

    // ── Serve ──────────────────────────────────────────────────────
    let router = build_router(AppState {
        registry,
        version: build.version.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.prom_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "metrics endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    cleanup.run();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
