//! quota-reconcile — turn raw quota listings into a compact metric set.
//!
//! # Architecture
//!
//! ```text
//!   [QuotaUsage] ──► PatternRegistry ──match──► generalized name + capture labels
//!                         │
//!                      no match
//!                         ▼
//!                      Grouping ──cluster──► common name + `kind` label
//!                         │
//!                    singleton
//!                         ▼
//!                  raw name + `kind` = raw name
//! ```
//!
//! Every path ends in [`MetricRecord`](quota_core::MetricRecord)s named
//! `aws_quota_<service>_<name>`.

pub mod error;
pub mod grouping;
pub mod patterns;
pub mod reconciler;

pub use error::{ReconcileError, ReconcileResult};
pub use grouping::{Group, Grouping};
pub use patterns::{PatternMatch, PatternRegistry, PatternRegistryBuilder};
pub use reconciler::{DEFAULT_THRESHOLD, Reconciler, Scope};
