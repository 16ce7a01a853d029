#![allow(dead_code)]

use async_trait::async_trait;
use relay_core::{BlobStore, ObjectMeta, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory blob store whose deletes can be made to fail per key
pub struct MemoryStore {
    id: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    // key -> deletes still to fail
    delete_failures: Mutex<HashMap<String, usize>>,
    delete_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new(id: &str) -> Self {
        MemoryStore {
            id: id.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            delete_failures: Mutex::new(HashMap::new()),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    /// Fail the next `times` deletes of `key`
    pub fn fail_deletes(&self, key: &str, times: usize) {
        self.delete_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), times);
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StoreError> {
        let size = bytes.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(ObjectMeta {
            key: key.to_string(),
            size,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.bytes(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let bytes = self.get(key).await?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn list(&self) -> Result<Vec<ObjectMeta>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(key, bytes)| ObjectMeta {
                key: key.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.delete_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Backend(format!("injected delete failure: {}", key)));
                }
            }
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
