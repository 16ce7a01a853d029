use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use relay_core::{BlobStore, ObjectMeta, StorageConfig, StoreError};
use tracing::{debug, trace};

use crate::store_config::build_operator;

/// Blob store backed by an opendal operator (memory, fs or s3).
#[derive(Debug, Clone)]
pub struct BucketStore {
    id: String,
    /// Optional extra prefix for key joining (used by the memory backend)
    root_prefix: String,
    /// Opendal operator
    op: Operator,
}

impl BucketStore {
    pub fn new(cfg: &StorageConfig) -> Result<Self, StoreError> {
        let (op, root_prefix, id) = build_operator(cfg)?;
        debug!(store = %id, "opened bucket store");
        Ok(Self {
            id,
            root_prefix,
            op,
        })
    }

    #[inline]
    fn join(&self, key: &str) -> String {
        let p = key.trim_matches('/');
        if self.root_prefix.is_empty() {
            p.to_string()
        } else {
            format!("{}/{}", self.root_prefix, p)
        }
    }

    #[inline]
    fn strip(&self, path: &str) -> String {
        if self.root_prefix.is_empty() {
            return path.trim_start_matches('/').to_string();
        }
        path.trim_start_matches('/')
            .strip_prefix(&self.root_prefix)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or_else(|| path.to_string())
    }

    fn list_root(&self) -> String {
        if self.root_prefix.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.root_prefix)
        }
    }
}

fn map_err(op: &str, key: &str, e: opendal::Error) -> StoreError {
    if e.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Backend(format!("{} {}: {}", op, key, e))
    }
}

#[async_trait]
impl BlobStore for BucketStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StoreError> {
        let path = self.join(key);
        let size = bytes.len() as u64;
        let mut writer = self
            .op
            .writer(&path)
            .await
            .map_err(|e| map_err("writer", key, e))?;
        writer
            .write(opendal::Buffer::from(bytes))
            .await
            .map_err(|e| map_err("write", key, e))?;
        writer.close().await.map_err(|e| map_err("close", key, e))?;
        trace!(store = %self.id, key, size, "object written");
        Ok(ObjectMeta {
            key: key.to_string(),
            size,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.join(key);
        let data = self
            .op
            .read(&path)
            .await
            .map_err(|e| map_err("read", key, e))?;
        Ok(data.to_vec())
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let path = self.join(key);
        let meta = self
            .op
            .stat(&path)
            .await
            .map_err(|e| map_err("stat", key, e))?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: meta.content_length(),
        })
    }

    async fn list(&self) -> Result<Vec<ObjectMeta>, StoreError> {
        let root = self.list_root();
        let entries = match self.op.list_with(&root).recursive(true).await {
            Ok(entries) => entries,
            // nothing was ever written under this root
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_err("list", &root, e)),
        };

        let mut objects = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.metadata().is_file() {
                continue;
            }
            // list metadata does not carry the length on every backend
            let size = match self.op.stat(entry.path()).await {
                Ok(meta) => meta.content_length(),
                // removed between list and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(map_err("stat", entry.path(), e)),
            };
            objects.push(ObjectMeta {
                key: self.strip(entry.path()),
                size,
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    /// Delete an object by key. No-op if the object doesn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.join(key);
        self.op
            .delete(&path)
            .await
            .map_err(|e| map_err("delete", key, e))?;
        trace!(store = %self.id, key, "object deleted");
        Ok(())
    }
}
