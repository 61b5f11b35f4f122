//! quota-cache — per-job metric snapshot cache.
//!
//! Each job owns one JSON file holding its last successful scrape. The
//! expiry instant lives in memory only, so a fresh process always starts
//! with every job in the [`CacheRead::Empty`] state.
//!
//! # States
//!
//! ```text
//!   open() ──► Empty ──write()──► Fresh ──(lifetime elapses)──► Expired
//!                                   ▲                              │
//!                                   └──────────write()─────────────┘
//! ```

pub mod error;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use store::{Cache, CacheRead};
