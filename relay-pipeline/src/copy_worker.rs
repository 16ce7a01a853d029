use async_trait::async_trait;
use metrics::{counter, histogram};
use relay_core::{BlobStore, Envelope, Event, Message, Queue, SizeReport};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::pipeline_metrics::{BYTES_COPIED_TOTAL, COPY_OBJECT_SIZE_BYTES, OBJECTS_COPIED_TOTAL};
use crate::worker::Handler;

/// Replicates one uploaded object from the source to the destination store,
/// then hands a size report to the log queue.
///
/// The destination write is a full overwrite, so a redelivered upload event
/// leaves the destination unchanged and only produces a duplicate report.
pub struct CopyWorker {
    source: Arc<dyn BlobStore>,
    destination: Arc<dyn BlobStore>,
    log_queue: Arc<dyn Queue>,
}

impl CopyWorker {
    pub fn new(
        source: Arc<dyn BlobStore>,
        destination: Arc<dyn BlobStore>,
        log_queue: Arc<dyn Queue>,
    ) -> Self {
        CopyWorker {
            source,
            destination,
            log_queue,
        }
    }
}

#[async_trait]
impl Handler for CopyWorker {
    fn name(&self) -> &str {
        "copy"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let (_, event): (Envelope, Event) = message.decode_envelope()?;
        let key = event.object_key();
        debug!(
            key = %key,
            store = %event.store_id,
            delivery_count = message.delivery_count,
            "copying object"
        );

        let bytes = self.source.get(&key).await?;
        let written = self.destination.put(&key, bytes).await?;

        let report = SizeReport {
            bucket: self.destination.id().to_string(),
            key: key.clone(),
            size: written.size,
        };
        self.log_queue.enqueue(serde_json::to_vec(&report)?).await?;

        counter!(OBJECTS_COPIED_TOTAL.name).increment(1);
        counter!(BYTES_COPIED_TOTAL.name).increment(written.size);
        histogram!(COPY_OBJECT_SIZE_BYTES.name).record(written.size as f64);
        info!(
            key = %key,
            size = written.size,
            from = self.source.id(),
            to = self.destination.id(),
            "object copied"
        );
        Ok(())
    }
}
