//! Per-key async serialization (§5 ordering guarantees).
//!
//! Voice-state transitions for a given user, ownership mutations for a given
//! channel, and starboard mutations for a given message all need to apply in
//! the order their triggering events arrived; a second gateway event for the
//! same key must wait for the first's transaction to finish rather than race
//! it. Keys that aren't contending never block each other, so one slow
//! transaction for user A doesn't stall user B.
//!
//! Entries are cleaned up opportunistically: once the last holder of a key's
//! lock drops its guard, the next `lock` call that observes no other
//! references removes the map entry instead of leaving it to grow forever.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
    inner: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self { inner: DashMap::new() }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.clone().lock_owned().await;

        // Opportunistic sweep: if we're the sole owner of this Arc besides the
        // map's own entry, no one else is waiting on it right now.
        if Arc::strong_count(&mutex) == 2 {
            self.inner.remove_if(&key, |_, v| Arc::strong_count(v) <= 2);
        }
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_same_key() {
        let locks = Arc::new(KeyedLocks::<String>::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _g = locks.lock("user:1".to_string()).await;
                order.lock().await.push(i);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks: KeyedLocks<&'static str> = KeyedLocks::new();
        let _a = locks.lock("a").await;
        let _b = locks.lock("b").await;
    }
}
