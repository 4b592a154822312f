//! Per-root serialization of restore attempts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Hands out one async mutex per data directory.
///
/// Roots are keyed by their nearest existing ancestor, canonicalized, plus the
/// not-yet-created remainder. Two spellings of one directory share a lock, and
/// the key does not change when a restore creates the root.
#[derive(Clone, Default)]
pub struct RestoreLocks {
    roots: Arc<RwLock<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl RestoreLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `root`. Released when the guard drops.
    pub async fn acquire(&self, root: &Path) -> OwnedMutexGuard<()> {
        let key = lock_key(root).await;

        let existing = self.roots.read().await.get(&key).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut roots = self.roots.write().await;
                roots.entry(key).or_default().clone()
            }
        };

        lock.lock_owned().await
    }

    /// Number of roots seen so far
    pub async fn tracked_count(&self) -> usize {
        self.roots.read().await.len()
    }
}

async fn lock_key(root: &Path) -> PathBuf {
    let mut existing = root.to_path_buf();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(&existing).await {
            return missing
                .iter()
                .rev()
                .fold(canonical, |key, name| key.join(name));
        }

        let name = match existing.file_name() {
            Some(name) => name.to_os_string(),
            None => return root.to_path_buf(),
        };
        existing = match existing.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => return root.to_path_buf(),
        };
        missing.push(name);
    }
}
