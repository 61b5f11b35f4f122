pub mod config;
pub mod naming;
pub mod types;

pub use config::{Job, JobList};
pub use naming::{metric_name, prom_string};
pub use types::*;
