pub mod errors;
pub mod message;
pub mod queue;
pub mod storage;

pub use errors::{QueueError, StoreError};
pub use message::{
    decode_key, encode_key, now_millis, Envelope, Event, Message, MetricSample, ReceiptToken,
    SizeReport,
};
pub use queue::Queue;
pub use storage::{BlobStore, ObjectMeta, StorageConfig};
