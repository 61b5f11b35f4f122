//! Job-list configuration parser.
//!
//! ```yaml
//! jobs:
//!   - serviceCode: ec2
//!     regions: [us-east-1, eu-west-1]
//!     role: arn:aws:iam::123456789012:role/quota-reader
//!     accountName: production
//! ```

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// One exporter job: a service code scraped in one or more regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub service_code: String,
    pub regions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
}

impl JobList {
    /// Load a job list. `.toml` files are parsed as TOML, anything else as YAML.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading job list {}", path.display()))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let list = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
        .with_context(|| format!("parsing job list {}", path.display()))?;
        Ok(list)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let list: JobList = serde_yaml::from_str(content)?;
        list.validate()?;
        Ok(list)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let list: JobList = toml::from_str(content)?;
        list.validate()?;
        Ok(list)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (i, job) in self.jobs.iter().enumerate() {
            if job.service_code.trim().is_empty() {
                bail!("job #{i}: serviceCode must not be empty");
            }
            if job.regions.is_empty() {
                bail!("job #{i} ({}): at least one region is required", job.service_code);
            }
            if let Some(region) = job.regions.iter().find(|r| r.trim().is_empty()) {
                bail!(
                    "job #{i} ({}): invalid region {region:?}",
                    job.service_code
                );
            }
        }
        Ok(())
    }
}

impl Job {
    /// Account display name, empty when not configured.
    pub fn account_name(&self) -> &str {
        self.account_name.as_deref().unwrap_or_default()
    }
}
