//! IAM role ARN validation.

/// Whether `role` is a well-formed IAM role ARN
/// (`arn:<partition>:<service>:<region>:<account>:role/<name>`).
pub fn validate_role_arn(role: &str) -> bool {
    let parts: Vec<&str> = role.splitn(6, ':').collect();
    let [prefix, partition, service, _region, _account, resource] = parts.as_slice() else {
        return false;
    };
    *prefix == "arn"
        && !partition.is_empty()
        && !service.is_empty()
        && resource.starts_with("role/")
}
