//! Known quota-name shapes per service.
//!
//! A pattern pairs a generalized metric name with a regex whose named
//! capture groups become labels. For example `Running On-Demand G and VT
//! instances` matches the `ec2` pattern `Running On-Demand instances` and
//! yields `instance_class="G and VT"`.
//!
//! The registry is immutable once built and is shared by reference.

use std::collections::HashMap;

use quota_core::Labels;
use regex::Regex;

use crate::error::{ReconcileError, ReconcileResult};

#[derive(Debug, Clone)]
struct Pattern {
    name: String,
    regex: Regex,
}

/// A successful pattern match for one quota name.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch<'a> {
    /// Generalized name used in place of the raw quota name.
    pub name: &'a str,
    /// One entry per named capture group; groups that did not take part in
    /// the match map to an empty string.
    pub captures: Labels,
}

/// Service code → ordered list of patterns. The first match wins.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    services: HashMap<String, Vec<Pattern>>,
}

/// Built-in patterns: `(service code, generalized name, regex)`.
const AWS_PATTERNS: &[(&str, &str, &str)] = &[
    // EC2
    ("ec2", "Running Dedicated Hosts", r"^Running Dedicated (?P<instance_family>[\w\s,-]+) Hosts$"),
    ("ec2", "Running On-Demand instances", r"^Running On-Demand (?P<instance_class>[\(\w\s,\)-]+) instances$"),
    ("ec2", "All Spot Instance Requests", r"^All (?P<instance_class>[\(\w\s,\)-]+) Spot Instance Requests$"),
    // CloudTrail
    ("cloudtrail", "Transactions per second", r"^Transactions per second \(TPS\) for (the )?(?P<api>[\w\s,]+) API(s)?$"),
    // EBS
    ("ebs", "Concurrent snapshots per volume", r"^Concurrent snapshots per (?P<volume_type_name>[\w\s]+) \((?P<volume_type>\w+)\) volume$"),
    ("ebs", "IOPS for Provisioned IOPS SSD volumes", r"^IOPS for Provisioned IOPS SSD \((?P<volume_type>\w+)\) volumes$"),
    ("ebs", "IOPS modifications for Provisioned IOPS SSD volumes", r"^IOPS modifications for Provisioned IOPS SSD \((?P<volume_type>\w+)\) volumes$"),
    ("ebs", "Storage for volumes in TiB", r"^Storage for (?P<volume_type_name>[\w\s]+) \((?P<volume_type>\w+)\) volumes, in TiB$"),
    ("ebs", "Storage modifications for volumes in TiB", r"^Storage modifications for (?P<volume_type_name>[\w\s]+) \((?P<volume_type>\w+)\) volumes, in TiB$"),
    // ECR
    ("ecr", "Rate of requests", r"^Rate of (?P<request_type>\w+) requests$"),
    // ELB (`type` is reserved for the quota/usage discriminator)
    ("elasticloadbalancing", "Listeners per load balancer type", r"^Listeners per (?P<load_balancer_type>\w+) Load Balancer$"),
    // KMS
    ("kms", "Cryptographic operation request rate", r"^Cryptographic operations \((?P<key_type>\w+)\) request rate$"),
    ("kms", "GenerateDataKeyPair request rate", r"^GenerateDataKeyPair \((?P<key_spec>\w+)\) request rate$"),
    ("kms", "Request rate", r"^(?P<operation>\w+) request rate$"),
    // CloudWatch Logs
    ("logs", "Throttle limit in transactions per second", r"^(?P<operation>\w+) throttle limit in transactions per second$"),
    // SageMaker
    ("sagemaker", "Endpoint usage", r"^(?P<instance_type>[\w\.]+) for endpoint usage$"),
    ("sagemaker", "Notebook instance usage", r"^(?P<instance_type>[\w\.]+) for notebook instance usage$"),
    ("sagemaker", "Processing job usage", r"^(?P<instance_type>[\w\.]+) for processing job usage$"),
    ("sagemaker", "Spot training job usage", r"^(?P<instance_type>[\w\.]+) for spot training job usage$"),
    ("sagemaker", "Training job usage", r"^(?P<instance_type>[\w\.]+) for training job usage$"),
    ("sagemaker", "Training warm pool usage", r"^(?P<instance_type>[\w\.]+) for training warm pool usage$"),
    ("sagemaker", "Transform job usage", r"^(?P<instance_type>[\w\.]+) for transform job usage$"),
    ("sagemaker", "Rate of requests", r"^Rate of (?P<operation>\w+) requests$"),
    ("sagemaker", "Apps running", r"^(?P<app_type>[\w\s]+) running on (?P<instance_type>[\w.]+) instances?$"),
    // Service Quotas
    ("servicequotas", "Throttle rate", r"^Throttle rate for (?P<operation>\w+)$"),
];

impl PatternRegistry {
    pub fn builder() -> PatternRegistryBuilder {
        PatternRegistryBuilder::default()
    }

    /// Registry with the built-in AWS patterns.
    pub fn aws_defaults() -> ReconcileResult<Self> {
        AWS_PATTERNS
            .iter()
            .fold(Self::builder(), |b, (svc, name, re)| b.pattern(svc, name, re))
            .build()
    }

    /// Match a quota name against its service's patterns, in order.
    pub fn match_quota(&self, service_code: &str, quota_name: &str) -> Option<PatternMatch<'_>> {
        let patterns = self.services.get(service_code)?;
        patterns.iter().find_map(|p| {
            let caps = p.regex.captures(quota_name)?;
            let captures = p
                .regex
                .capture_names()
                .flatten()
                .map(|label| {
                    let value = caps.name(label).map_or("", |m| m.as_str());
                    (label.to_string(), value.to_string())
                })
                .collect();
            Some(PatternMatch {
                name: &p.name,
                captures,
            })
        })
    }

    /// Number of patterns registered for a service.
    pub fn len_for(&self, service_code: &str) -> usize {
        self.services.get(service_code).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Collects patterns and compiles them once in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct PatternRegistryBuilder {
    entries: Vec<(String, String, String)>,
}

impl PatternRegistryBuilder {
    pub fn pattern(mut self, service_code: &str, name: &str, regex: &str) -> Self {
        self.entries
            .push((service_code.to_string(), name.to_string(), regex.to_string()));
        self
    }

    pub fn build(self) -> ReconcileResult<PatternRegistry> {
        let mut services: HashMap<String, Vec<Pattern>> = HashMap::new();
        for (service_code, name, re) in self.entries {
            let regex = Regex::new(&re).map_err(|source| ReconcileError::InvalidPattern {
                service_code: service_code.clone(),
                name: name.clone(),
                source,
            })?;
            services
                .entry(service_code)
                .or_default()
                .push(Pattern { name, regex });
        }
        Ok(PatternRegistry { services })
    }
}
