use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemoryConfig {
    // logical namespace used as a key prefix
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FsConfig {
    // absolute directory, either /var/lib/relay or file:///var/lib/relay
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct S3Config {
    // s3://bucket or s3://bucket/prefix
    pub root: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StorageConfig {
    #[serde(rename = "memory")]
    Memory(MemoryConfig),
    #[serde(rename = "fs")]
    Fs(FsConfig),
    #[serde(rename = "s3")]
    S3(S3Config),
}

impl StorageConfig {
    pub fn memory(root: &str) -> Self {
        StorageConfig::Memory(MemoryConfig {
            root: root.to_string(),
        })
    }

    pub fn root(&self) -> &str {
        match self {
            StorageConfig::Memory(c) => &c.root,
            StorageConfig::Fs(c) => &c.root,
            StorageConfig::S3(c) => &c.root,
        }
    }

    /// Replace the root (bucket) while keeping the backend type and options.
    pub fn with_root(mut self, root: &str) -> Self {
        match &mut self {
            StorageConfig::Memory(c) => c.root = root.to_string(),
            StorageConfig::Fs(c) => c.root = root.to_string(),
            StorageConfig::S3(c) => c.root = root.to_string(),
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

/// Key-addressed blob storage.
///
/// `put` is a full overwrite and `delete` of an absent key succeeds, so both
/// are safe to repeat under at-least-once delivery.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Identifier of this store (bucket name), stamped on events and size reports.
    fn id(&self) -> &str;
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError>;
    async fn list(&self) -> Result<Vec<ObjectMeta>, StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
