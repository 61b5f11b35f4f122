//! quota-scraper — per-job quota collection.
//!
//! A [`JobScraper`] owns one job (service code + regions) and produces its
//! metric records on demand. Every invocation consults the job's cache
//! first and only reaches upstream on a miss.
//!
//! # Architecture
//!
//! ```text
//! JobScraper::scrape()
//!   ├── Cache::read() ── Fresh ──────────────────────────► records
//!   │                 └─ Expired + serve-stale ──► records, spawn refresh
//!   └── scrape_fresh()
//!         ├── JoinSet: one task per region
//!         │     ├── try_join!(applied listing, default listing)
//!         │     ├── merge (applied wins)
//!         │     ├── usage lookups (optional, best-effort)
//!         │     └── Reconciler::reconcile()
//!         └── Cache::write()
//! ```
//!
//! Upstream access goes through the [`QuotaApi`] and [`IdentityApi`]
//! traits; [`aws`] implements them with the AWS SDK.

pub mod api;
pub mod arn;
pub mod aws;
pub mod error;
pub mod scraper;
pub mod usage;

pub use api::{Datapoint, IdentityApi, QuotaApi, QuotaPage};
pub use arn::validate_role_arn;
pub use error::{ApiError, ScrapeError, ScrapeResult};
pub use scraper::{JobScraper, ScrapeOptions, Scraper};
