//! Provider-safe metric naming.
//!
//! Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`. Quota names are free
//! text ("Running On-Demand Standard (A, C, D) instances"), so they are
//! split at camel-case boundaries, lower-cased, and every other character
//! becomes `_`.

use std::sync::LazyLock;

use regex::Regex;

/// Prefix shared by every quota metric.
pub const METRIC_PREFIX: &str = "aws_quota";

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static regex"));

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

/// Convert free text into a lower-case identifier fragment.
///
/// `"GenerateDataKeyPair request rate"` becomes
/// `"generate_data_key_pair_request_rate"`.
pub fn prom_string(text: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(text, "${1}.${2}");
    sanitize(&split).to_lowercase()
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(text: &str) -> String {
    INVALID_CHARS.replace_all(text, "_").into_owned()
}

/// Build `aws_quota_<service>_<name>` for a service code and a quota name
/// (raw or generalized).
pub fn metric_name(service_code: &str, name: &str) -> String {
    format!(
        "{METRIC_PREFIX}_{}_{}",
        prom_string(service_code),
        prom_string(name)
    )
}

/// Help text for a metric: the (generalized) name and the owning service.
pub fn description(service_name: &str, service_code: &str, name: &str) -> String {
    let service = if service_name.is_empty() {
        service_code
    } else {
        service_name
    };
    format!("{name} ({service})")
}
