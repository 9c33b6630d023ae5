//! Named async mutex
//!
//! Writers to the same key are queued in arrival order, writers to different
//! keys never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
pub struct KeyedLock {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(key.to_string()).or_default().clone(),
            // Poisoned map: fall back to an unshared lock rather than panic
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run `f` while holding the lock named `key`
    pub async fn unlocking<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.entry(key);
        let result = {
            let _guard = lock.lock().await;
            f().await
        };
        self.release(key, lock);
        result
    }

    /// Blocking form of [`KeyedLock::unlocking`] for threads outside the runtime
    pub fn blocking_unlocking<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.entry(key);
        let result = {
            let _guard = lock.blocking_lock();
            f()
        };
        self.release(key, lock);
        result
    }

    fn release(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // map + our handle: nobody else is queued on this key
            if Arc::strong_count(&lock) <= 2 {
                locks.remove(key);
            }
        }
    }

    #[cfg(test)]
    pub fn active_keys(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
