//! Command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use quota_reconcile::DEFAULT_THRESHOLD;
use quota_scraper::ScrapeOptions;

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "quotad", version, about = "Export AWS service quotas as Prometheus metrics")]
pub struct Cli {
    /// Job list (YAML, or TOML with a `.toml` extension).
    #[arg(long, default_value = "/etc/aqe/config.yml")]
    pub config_file: PathBuf,

    /// Port the metrics endpoint listens on.
    #[arg(long, default_value_t = 10100)]
    pub prom_port: u16,

    /// How long a scrape result is served from cache (`300s`, `5m`, `1h`).
    /// `0s` disables caching.
    #[arg(long, default_value = "300s", value_parser = parse_duration)]
    pub cache_duration: Duration,

    /// Serve an expired cache entry while it is refreshed in the background.
    #[arg(long)]
    pub cache_serve_stale: bool,

    /// Also export current usage for quotas that declare a usage metric.
    ///
    /// Usage is read per region: one CloudWatch query per quota code in
    /// every region the job lists, on each refresh.
    #[arg(long)]
    pub collect_usage: bool,

    /// Cache directory. Defaults to a folder under the system temp dir.
    #[arg(long)]
    pub cache_folder: Option<PathBuf>,

    /// Deadline for each upstream API call.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub api_timeout: Duration,

    /// Name similarity (0 to 1) above which quotas are grouped.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub grouping_threshold: f64,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[arg(long, value_enum, default_value = "info", ignore_case = true)]
    pub log_level: LogLevel,

    /// Directory for daily log files, or `stdout`.
    #[arg(long, default_value = "stdout")]
    pub log_folder: String,
}

impl Cli {
    pub fn scrape_options(&self) -> ScrapeOptions {
        let defaults = ScrapeOptions::default();
        ScrapeOptions {
            cache_lifetime: self.cache_duration,
            serve_stale: self.cache_serve_stale,
            collect_usage: self.collect_usage,
            cache_dir: self.cache_folder.clone().unwrap_or(defaults.cache_dir),
            api_timeout: self.api_timeout,
        }
    }
}

/// Parse `500ms`, `30s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("unknown duration unit '{other}' in '{s}'")),
    }
}
