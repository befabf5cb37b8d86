// Per-target mutual exclusion.
//
// Two pushes for the same working tree must not interleave their git
// commands. Guards are owned so they can be held across awaits and are
// released on every exit path by drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct TargetLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl TargetLocks {
    /// Wait until no other sync holds `path`, then hold it until the guard drops.
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.lock_for(path).lock_owned().await
    }

    /// Take the lock only if it is free.
    pub fn try_acquire(&self, path: &Path) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(path).try_lock_owned().ok()
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut locks = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = TargetLocks::default();
        let guard = locks.acquire(Path::new("/srv/site")).await;
        assert!(locks.try_acquire(Path::new("/srv/site")).is_none());

        drop(guard);
        assert!(locks.try_acquire(Path::new("/srv/site")).is_some());
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let locks = TargetLocks::default();
        let _site = locks.acquire(Path::new("/srv/site")).await;
        assert!(locks.try_acquire(Path::new("/srv/blog")).is_some());
    }

    #[tokio::test]
    async fn equivalent_paths_share_a_lock() {
        let temp = tempfile::TempDir::new().expect("tempdir should be created");
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(&repo).expect("repo dir should be created");
        let dotted = temp.path().join(".").join("repo");

        let locks = TargetLocks::default();
        let _guard = locks.acquire(&repo).await;
        assert!(locks.try_acquire(&dotted).is_none());
    }

    #[tokio::test]
    async fn waiter_proceeds_after_release() {
        let locks = TargetLocks::default();
        let guard = locks.acquire(Path::new("/srv/site")).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(Path::new("/srv/site")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .expect("waiter task should not panic");
    }
}
