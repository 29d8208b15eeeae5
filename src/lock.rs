//! Per-path advisory locking for group metadata mutation.
//!
//! Modeled on [`crate::array::Array`]'s per-chunk lock registry
//! (`chunk_locks: parking_lot::Mutex<HashMap<Vec<u64>, Arc<parking_lot::Mutex<()>>>>`):
//! a single process-wide registry hands out one [`parking_lot::Mutex`] per
//! canonicalized group path, so concurrent workers serialize metadata edits
//! (attribute writes, array creation, resizes) without serializing
//! unrelated groups.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

static GROUP_LOCKS: Mutex<Option<HashMap<PathBuf, Arc<Mutex<()>>>>> = Mutex::new(None);

/// Returns the advisory lock for `path`, creating one if this is the first request for it.
#[must_use]
pub fn group_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = path.to_path_buf();
    let mut registry = GROUP_LOCKS.lock();
    let registry = registry.get_or_insert_with(HashMap::new);
    registry.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}
