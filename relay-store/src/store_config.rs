use opendal::services::{Fs, Memory, S3};
use opendal::{Builder, Operator};
use relay_core::{StorageConfig, StoreError};

/// Build the opendal operator for a store configuration.
///
/// Returns the operator, the key prefix joined in front of every object key,
/// and the store id stamped on events (the bucket name for s3).
pub(crate) fn build_operator(
    cfg: &StorageConfig,
) -> Result<(Operator, String, String), StoreError> {
    match cfg {
        StorageConfig::S3(s3) => {
            let (bucket, prefix) =
                split_bucket_prefix(&s3.root).map_err(StoreError::InvalidConfig)?;
            let mut s3_builder = S3::default().bucket(&bucket);
            // opendal wants an absolute root for the key prefix
            if !prefix.is_empty() {
                s3_builder = s3_builder.root(&format!("/{}", prefix));
            }
            if let Some(url) = s3.endpoint.as_deref() {
                s3_builder = s3_builder.endpoint(url);
            }
            if let Some(name) = s3.region.as_deref() {
                s3_builder = s3_builder.region(name);
            }
            if let (Some(key_id), Some(secret)) = (s3.access_key.as_deref(), s3.secret_key.as_deref()) {
                s3_builder = s3_builder.access_key_id(key_id).secret_access_key(secret);
            }
            Ok((finish(s3_builder, "s3")?, String::new(), bucket))
        }
        StorageConfig::Fs(fs) => {
            let fs_root = split_fs_root(&fs.root).map_err(StoreError::InvalidConfig)?;
            let op = finish(Fs::default().root(&fs_root), "fs")?;
            Ok((op, String::new(), fs_root))
        }
        StorageConfig::Memory(mem) => {
            // the memory service has no root, keys are prefixed instead
            let prefix = normalize_prefix(&mem.root);
            if prefix.is_empty() {
                return Err(StoreError::InvalidConfig(
                    "memory store needs a non-empty root".to_string(),
                ));
            }
            Ok((finish(Memory::default(), "memory")?, prefix.clone(), prefix))
        }
    }
}

fn finish<B: Builder>(builder: B, backend: &str) -> Result<Operator, StoreError> {
    Operator::new(builder)
        .map(|op| op.finish())
        .map_err(|e| StoreError::InvalidConfig(format!("opendal {} backend: {}", backend, e)))
}

/// `s3://bucket/some/prefix` -> (`bucket`, `some/prefix`). A value without
/// a scheme is taken as a bare bucket name.
pub fn split_bucket_prefix(uri: &str) -> Result<(String, String), String> {
    if uri.is_empty() {
        return Err("empty s3 root".to_string());
    }
    let Some((_, location)) = uri.split_once("://") else {
        return Ok((uri.to_string(), String::new()));
    };
    let (bucket, prefix) = location.split_once('/').unwrap_or((location, ""));
    if bucket.is_empty() {
        return Err(format!("no bucket in s3 root {}", uri));
    }
    Ok((bucket.to_string(), normalize_prefix(prefix)))
}

pub fn split_fs_root(uri_or_path: &str) -> Result<String, String> {
    let s = uri_or_path
        .strip_prefix("file://")
        .unwrap_or(uri_or_path);
    if s.is_empty() {
        return Err("fs root must not be empty".to_string());
    }
    Ok(s.to_string())
}

pub fn normalize_prefix(p: &str) -> String {
    p.trim_matches('/').to_string()
}
