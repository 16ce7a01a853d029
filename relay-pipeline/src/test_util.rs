use relay_core::{Envelope, Message, ReceiptToken};
use serde::Serialize;

// shared with the integration tests
#[path = "../tests/common/memory_store.rs"]
mod memory_store;
pub(crate) use memory_store::MemoryStore;

/// A message as a worker receives it, with a raw body
pub(crate) fn raw_message(body: Vec<u8>) -> Message {
    Message {
        message_id: "m-1".to_string(),
        body,
        delivery_count: 1,
        receipt: ReceiptToken::generate(),
        sent_at: 0,
    }
}

/// A message as delivered through a topic subscription
pub(crate) fn topic_message<T: Serialize>(topic: &str, subject: &str, payload: &T) -> Message {
    let envelope = Envelope::new(
        topic,
        Some(subject.to_string()),
        serde_json::to_string(payload).unwrap(),
    );
    raw_message(serde_json::to_vec(&envelope).unwrap())
}
