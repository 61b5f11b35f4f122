//! File-backed snapshot store with an in-memory expiry.
//!
//! Reads report one of three states. A fresh read returns the snapshot
//! while `now < expires`; an expired read still returns the last snapshot
//! so the caller may serve it stale; an empty read means no write has ever
//! succeeded. The `serving_stale` flag is owned by the caller (see
//! [`Cache::begin_stale_refresh`]) and cleared by the next successful write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use quota_core::MetricRecord;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Convert any `Display` error into a `CacheError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| CacheError::$variant(e.to_string())
    };
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    /// The snapshot has not expired yet.
    Fresh(Vec<MetricRecord>),
    /// The snapshot is past its expiry but still available.
    Expired(Vec<MetricRecord>),
    /// Nothing has been written yet.
    Empty,
}

#[derive(Debug, Default)]
struct CacheState {
    expires: Option<Instant>,
    serving_stale: bool,
}

struct CacheInner {
    path: PathBuf,
    lifetime: Duration,
    state: Mutex<CacheState>,
}

/// Thread-safe handle to one job's cache file.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Create a new cache file named `<key>-<random>.json` under `dir`.
    ///
    /// The directory is created if absent. The file outlives the handle;
    /// removing `dir` on shutdown cleans up every job's cache.
    pub fn open(dir: &Path, key: &str, lifetime: Duration) -> CacheResult<Self> {
        fs::create_dir_all(dir).map_err(map_err!(Open))?;
        let (_, path) = tempfile::Builder::new()
            .prefix(&format!("{key}-"))
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(map_err!(Open))?
            .keep()
            .map_err(map_err!(Open))?;
        debug!(?path, %key, ?lifetime, "cache opened");
        Ok(Self {
            inner: Arc::new(CacheInner {
                path,
                lifetime,
                state: Mutex::new(CacheState::default()),
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn lifetime(&self) -> Duration {
        self.inner.lifetime
    }

    /// Read the current snapshot.
    pub fn read(&self) -> CacheResult<CacheRead> {
        let Some(expires) = self.state().expires else {
            return Ok(CacheRead::Empty);
        };
        let bytes = fs::read(&self.inner.path).map_err(map_err!(Read))?;
        let records: Vec<MetricRecord> =
            serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
        if Instant::now() < expires {
            Ok(CacheRead::Fresh(records))
        } else {
            Ok(CacheRead::Expired(records))
        }
    }

    /// Replace the snapshot, restart the expiry clock and clear the
    /// stale-refresh flag.
    pub fn write(&self, records: &[MetricRecord]) -> CacheResult<()> {
        let bytes = serde_json::to_vec(records).map_err(map_err!(Serialize))?;
        let mut state = self.state();
        fs::write(&self.inner.path, bytes).map_err(map_err!(Write))?;
        state.expires = Some(Instant::now() + self.inner.lifetime);
        state.serving_stale = false;
        debug!(path = ?self.inner.path, records = records.len(), "cache written");
        Ok(())
    }

    /// Whether a background refresh is currently in flight.
    pub fn serving_stale(&self) -> bool {
        self.state().serving_stale
    }

    /// Schedule a background refresh unless one is already in flight.
    ///
    /// `launch` runs at most once per stale period: it is invoked under the
    /// state lock and the flag is raised before the lock is released, so
    /// concurrent callers observe the flag and skip. Returns whether
    /// `launch` was invoked.
    pub fn begin_stale_refresh<F: FnOnce()>(&self, launch: F) -> bool {
        let mut state = self.state();
        if state.serving_stale {
            return false;
        }
        state.serving_stale = true;
        launch();
        true
    }

    /// Lower the stale-refresh flag after a refresh that did not write, so
    /// the next read can schedule another attempt.
    pub fn abandon_stale_refresh(&self) {
        self.state().serving_stale = false;
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
