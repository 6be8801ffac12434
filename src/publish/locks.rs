//! Per-(user, platform) locks that serialize token refreshes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::platform::Platform;

type Key = (i64, Platform);

/// One mutex per (user, platform) pair.
///
/// A caller that finds an expired token takes the pair's lock, then re-reads
/// the token. Whoever got there first has already refreshed it, so concurrent
/// publishers cause exactly one refresh call.
#[derive(Debug, Default)]
pub struct RefreshLocks {
    locks: RwLock<HashMap<Key, Arc<Mutex<()>>>>,
}

impl RefreshLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the pair's credentials.
    ///
    /// The lock is released when the guard is dropped.
    pub async fn acquire(&self, user_id: i64, platform: Platform) -> OwnedMutexGuard<()> {
        self.get_or_create((user_id, platform)).await.lock_owned().await
    }

    async fn get_or_create(&self, key: Key) -> Arc<Mutex<()>> {
        {
            let read_guard = self.locks.read().await;
            if let Some(lock) = read_guard.get(&key) {
                return Arc::clone(lock);
            }
        }

        let mut write_guard = self.locks.write().await;
        // Another task may have inserted it between the two guards
        if let Some(lock) = write_guard.get(&key) {
            return Arc::clone(lock);
        }

        let lock = Arc::new(Mutex::new(()));
        write_guard.insert(key, Arc::clone(&lock));
        lock
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_pair_is_exclusive() {
        let locks = Arc::new(RefreshLocks::new());
        let guard = locks.acquire(1, Platform::Linkedin).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(1, Platform::Linkedin).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_pairs_do_not_block() {
        let locks = RefreshLocks::new();
        let _a = locks.acquire(1, Platform::Linkedin).await;
        let _b = locks.acquire(2, Platform::Linkedin).await;
        let _c = locks.acquire(1, Platform::X).await;
        assert_eq!(locks.len().await, 3);
    }

    #[tokio::test]
    async fn test_lock_reused_after_release() {
        let locks = RefreshLocks::new();
        drop(locks.acquire(7, Platform::Bluesky).await);
        drop(locks.acquire(7, Platform::Bluesky).await);
        assert_eq!(locks.len().await, 1);
    }
}
