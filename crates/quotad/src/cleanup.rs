//! Removal of cache files on shutdown.
//!
//! Only the files the job caches created are deleted. The cache folder
//! itself is removed only when this process created it and it is empty
//! afterwards.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CacheCleanup {
    dir: PathBuf,
    created: bool,
    files: Vec<PathBuf>,
}

impl CacheCleanup {
    /// Note whether `dir` exists yet. Call before any cache is opened.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            created: !dir.exists(),
            files: Vec::new(),
        }
    }

    /// Track a cache file for removal.
    pub fn track(&mut self, path: &Path) {
        self.files.push(path.to_path_buf());
    }

    pub fn run(&self) {
        for file in &self.files {
            match std::fs::remove_file(file) {
                Ok(()) => debug!(file = %file.display(), "cache file removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(file = %file.display(), error = %e, "cache file not removed"),
            }
        }
        if !self.created {
            return;
        }
        match std::fs::remove_dir(&self.dir) {
            Ok(()) => info!(dir = %self.dir.display(), "cache folder removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "cache folder not removed"),
        }
    }
}
