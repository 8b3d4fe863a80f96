//! In-process object store with call counters and injectable put failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::ObjectStore;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_puts: Mutex<Vec<String>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, key: &str, body: impl Into<Vec<u8>>) {
        self.lock_objects().insert(key.to_string(), body.into());
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock_objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Number of `put` calls issued, including failed ones.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make every `put` whose key contains `pattern` fail.
    pub fn fail_puts_containing(&self, pattern: &str) {
        self.fail_puts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_puts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn should_fail(&self, key: &str) -> bool {
        self.fail_puts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|pattern| key.contains(pattern.as_str()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.object(key))
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(key) {
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.lock_objects().insert(key.to_string(), body);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock_objects()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.lock_objects().remove(key);
        Ok(())
    }
}
