use async_trait::async_trait;
use metrics::counter;
use relay_core::{BlobStore, Event, ObjectMeta, StoreError};
use relay_dispatch::Topic;
use std::sync::Arc;
use tracing::debug;

use crate::pipeline_metrics::UPLOADS_TOTAL;

/// Source store that announces every write on the upload topic.
///
/// This is the only way objects enter the pipeline: a `put` that returns
/// `Ok` has stored the object and published its `Event`.
pub struct NotifyingStore {
    inner: Arc<dyn BlobStore>,
    topic: Arc<Topic>,
}

impl NotifyingStore {
    pub fn new(inner: Arc<dyn BlobStore>, topic: Arc<Topic>) -> Self {
        NotifyingStore { inner, topic }
    }
}

#[async_trait]
impl BlobStore for NotifyingStore {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StoreError> {
        let meta = self.inner.put(key, bytes).await?;
        let event = Event::new(self.inner.id(), key, meta.size);
        let message_id = self
            .topic
            .publish(Some("upload"), &event)
            .map_err(|e| StoreError::Backend(format!("upload event for {}: {}", key, e)))?;
        counter!(UPLOADS_TOTAL.name).increment(1);
        debug!(key = %key, size = meta.size, message_id = %message_id, "upload event published");
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.inner.head(key).await
    }

    async fn list(&self) -> Result<Vec<ObjectMeta>, StoreError> {
        self.inner.list().await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
