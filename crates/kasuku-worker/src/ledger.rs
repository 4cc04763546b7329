// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotency ledger: at-most-one observable result per key.
//!
//! A lookup hit returns the stored result verbatim without re-running the
//! computation. On a miss the computation runs under a per-key in-process
//! lock (so concurrent deliveries of the same key in one process compute
//! once), then the result is stored with `put_if_absent`; a writer that
//! loses the cross-process race discards its local result and returns the
//! winner's stored one. Computation errors are never recorded -- a retry
//! re-runs the computation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use kasuku_core::{IdempotencyStore, KasukuError};

/// Ledger over an injected [`IdempotencyStore`].
#[derive(Clone)]
pub struct IdempotencyLedger {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the stored result for `key`, or run `compute` and store it.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T, KasukuError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, KasukuError>>,
    {
        let lock = self.key_lock(key).await;
        let guard = lock.lock().await;

        let result = self.get_or_compute_locked(key, compute).await;

        drop(guard);
        self.release_lock(key, &lock).await;
        result
    }

    async fn get_or_compute_locked<T, F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<T, KasukuError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, KasukuError>>,
    {
        if let Some(stored) = self.store.get(key).await? {
            debug!(key, "idempotency hit, returning stored result");
            return deserialize(stored);
        }

        let result = compute().await?;
        let value = serde_json::to_value(&result).map_err(|e| KasukuError::Storage {
            source: Box::new(e),
        })?;

        if self.store.put_if_absent(key, &value, self.ttl).await? {
            Ok(result)
        } else {
            // A concurrent writer elsewhere stored first; theirs is the
            // observable result.
            debug!(key, "lost idempotency write race, reading winner's result");
            match self.store.get(key).await? {
                Some(stored) => deserialize(stored),
                None => Err(KasukuError::Internal(format!(
                    "idempotency record for `{key}` vanished after write conflict"
                ))),
            }
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_lock(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(key) {
            // Drop the map entry once no other caller holds a handle.
            if Arc::ptr_eq(existing, lock) && Arc::strong_count(lock) <= 2 {
                locks.remove(key);
            }
        }
    }
}

fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, KasukuError> {
    serde_json::from_value(value).map_err(|e| KasukuError::Storage {
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory store with the same put-if-absent contract as SQLite.
    struct MemoryStore {
        records: std::sync::Mutex<HashMap<String, serde_json::Value>>,
        reject_writes: AtomicBool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                records: std::sync::Mutex::new(HashMap::new()),
                reject_writes: AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl IdempotencyStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KasukuError> {
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn put_if_absent(
            &self,
            key: &str,
            result: &serde_json::Value,
            _ttl: Duration,
        ) -> Result<bool, KasukuError> {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Ok(false);
            }
            let mut records = self.records.lock().unwrap();
            if records.contains_key(key) {
                return Ok(false);
            }
            records.insert(key.to_string(), result.clone());
            Ok(true)
        }
    }

    fn ledger(store: Arc<MemoryStore>) -> IdempotencyLedger {
        IdempotencyLedger::new(store, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn miss_computes_and_stores() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let result: String = ledger(store.clone())
            .get_or_compute("evt-1", move || async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok("handled".to_string())
            })
            .await
            .unwrap();

        assert_eq!(result, "handled");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.records.lock().unwrap().contains_key("evt-1"));
    }

    #[tokio::test]
    async fn hit_returns_stored_without_recompute() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls_clone = calls.clone();
            let result: String = ledger
                .get_or_compute("evt-1", move || async move {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Ok("first".to_string())
                })
                .await
                .unwrap();
            assert_eq!(result, "first");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "compute must run once");
    }

    #[tokio::test]
    async fn concurrent_calls_compute_once_and_agree() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .get_or_compute("evt-concurrent", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("winner".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            let result: String = handle.await.unwrap();
            assert_eq!(result, "winner");
        }
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "side effect must be observed exactly once"
        );
    }

    #[tokio::test]
    async fn losing_writer_returns_winners_result() {
        let store = Arc::new(MemoryStore::new());
        // Simulate losing the cross-process race: our write is rejected and
        // the winner's record appears in the store.
        store
            .records
            .lock()
            .unwrap()
            .insert("evt-1".into(), serde_json::json!("winner"));
        store.reject_writes.store(true, Ordering::SeqCst);

        // Bypass the lookup hit by clearing, computing, then racing: here we
        // emulate the window by removing the record before the call and
        // re-inserting it from "another process" inside compute.
        let store_inner = store.clone();
        store.records.lock().unwrap().remove("evt-1");
        let result: String = ledger(store.clone())
            .get_or_compute("evt-1", move || async move {
                store_inner
                    .records
                    .lock()
                    .unwrap()
                    .insert("evt-1".into(), serde_json::json!("winner"));
                Ok("loser".to_string())
            })
            .await
            .unwrap();

        assert_eq!(result, "winner", "local result must be discarded");
    }

    #[tokio::test]
    async fn compute_error_is_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store.clone());

        let err = ledger
            .get_or_compute::<String, _, _>("evt-1", || async {
                Err(KasukuError::transient("downstream down"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KasukuError::Transient { .. }));
        assert!(store.records.lock().unwrap().is_empty());

        // Retry succeeds and stores.
        let result: String = ledger
            .get_or_compute("evt-1", || async { Ok("recovered".to_string()) })
            .await
            .unwrap();
        assert_eq!(result, "recovered");
    }

    #[tokio::test]
    async fn key_locks_are_released_after_use() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger(store);
        let _: String = ledger
            .get_or_compute("evt-1", || async { Ok("x".to_string()) })
            .await
            .unwrap();
        assert!(ledger.locks.lock().await.is_empty());
    }
}
