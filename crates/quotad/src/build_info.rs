//! The `aqe_build_info` gauge.

use std::sync::Arc;

use quota_core::{Labels, MetricRecord, ProduceFn, ProduceFuture};

pub const METRIC_NAME: &str = "aqe_build_info";
const HELP: &str = "AQE Build information";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub app: String,
    pub version: String,
    pub platform: String,
    pub commit: String,
    pub build_date: String,
    pub rustc_version: String,
}

impl BuildInfo {
    /// Values of the running binary. The commit and build date come from
    /// `AQE_COMMIT` and `AQE_BUILD_DATE` at compile time; the compiler
    /// version is filled in by the build script.
    pub fn current() -> Self {
        Self {
            app: "AWS Quota Exporter (AQE)".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            commit: option_env!("AQE_COMMIT").unwrap_or("none").to_string(),
            build_date: option_env!("AQE_BUILD_DATE").unwrap_or("unknown").to_string(),
            rustc_version: option_env!("AQE_RUSTC_VERSION").unwrap_or("unknown").to_string(),
        }
    }

    pub fn record(&self) -> MetricRecord {
        let labels: Labels = [
            ("app", &self.app),
            ("version", &self.version),
            ("platform", &self.platform),
            ("commit", &self.commit),
            ("build_date", &self.build_date),
            ("rustc_version", &self.rustc_version),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
        MetricRecord {
            name: METRIC_NAME.to_string(),
            labels,
            value: 1.0,
            desc: HELP.to_string(),
        }
    }

    /// Producer that always yields the single build info record.
    pub fn produce_fn(&self) -> ProduceFn {
        let record = self.record();
        Arc::new(move || -> ProduceFuture {
            let record = record.clone();
            Box::pin(async move { Ok(vec![record]) })
        })
    }
}
