use relay_core::{BlobStore, StoreError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One upload for the client: `KEY:SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSpec {
    pub key: String,
    pub size: usize,
}

impl FromStr for UploadSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // split on the last colon so keys may contain one
        let (key, size) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected KEY:SIZE, got '{}'", s))?;
        if key.is_empty() {
            return Err(format!("empty key in '{}'", s));
        }
        let size = size
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid size in '{}': {}", s, e))?;
        Ok(UploadSpec {
            key: key.to_string(),
            size,
        })
    }
}

/// Write each upload's `size` bytes of `x` into `store`, one after the other
/// with `interval` in between. Returns how many uploads completed before
/// `cancel` fired.
pub async fn run_uploads(
    store: Arc<dyn BlobStore>,
    uploads: Vec<UploadSpec>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<usize, StoreError> {
    let mut done = 0;
    for (i, upload) in uploads.iter().enumerate() {
        if i > 0 {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        if cancel.is_cancelled() {
            break;
        }
        let meta = store.put(&upload.key, vec![b'x'; upload.size]).await?;
        info!(key = %meta.key, size = meta.size, store = store.id(), "uploaded");
        done += 1;
    }
    Ok(done)
}
