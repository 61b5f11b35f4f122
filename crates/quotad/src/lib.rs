//! quotad — the AWS quota exporter daemon.
//!
//! Loads a job list, builds one scraper per job, registers each as a
//! collector and serves the result on `/metrics`.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Landing page |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness check |

pub mod build_info;
pub mod cleanup;
pub mod cli;
pub mod logging;
pub mod server;

pub use build_info::BuildInfo;
pub use cli::Cli;
pub use server::{AppState, build_router};
