//! Per-file mutual exclusion
//!
//! Two mutations targeting the same file never interleave their
//! read-modify-write cycles. Locks are keyed by canonical path, so the same
//! file reached through different spellings shares one lock. Exclusion is
//! in-process only; a single administrative process is assumed per host.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

static FILE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Lock handle for one file; call [`FileLock::lock`] to hold it
#[derive(Clone)]
pub struct FileLock {
    path: PathBuf,
    inner: Arc<Mutex<()>>,
}

impl FileLock {
    /// Block until the lock is held
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The process-wide lock for `path`
#[must_use]
pub fn for_path(path: &Path) -> FileLock {
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let registry = FILE_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let inner = registry
        .lock()
        .entry(key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    FileLock { path: key, inner }
}
