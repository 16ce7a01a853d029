use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch, used for every wall-clock timestamp in the pipeline.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Encode an object key the way upload notifications carry it.
pub fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Decode an object key carried by an upload notification.
///
/// Keys arrive percent-encoded with spaces written as `+`. A key that fails to
/// decode as UTF-8 is returned untouched.
pub fn decode_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => raw.to_string(),
    }
}

/// Event produced by a write to a store. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    // identifier of the store (bucket) that was written
    pub store_id: String,
    // encoded object key, see `decode_key`
    pub key: String,
    // object size in bytes at write time
    pub size: u64,
    pub timestamp: u64,
}

impl Event {
    pub fn new(store_id: &str, key: &str, size: u64) -> Self {
        Event {
            store_id: store_id.to_string(),
            key: encode_key(key),
            size,
            timestamp: now_millis(),
        }
    }

    /// The decoded object key.
    pub fn object_key(&self) -> String {
        decode_key(&self.key)
    }
}

/// Wrapper a topic puts around every published message before handing it
/// to a subscribed queue. `message` holds the JSON encoded inner payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub topic: String,
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: u64,
}

impl Envelope {
    pub fn new(topic: &str, subject: Option<String>, message: String) -> Self {
        Envelope {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            subject,
            message,
            timestamp: now_millis(),
        }
    }

    /// Parse the inner payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.message)
    }
}

/// Opaque token identifying one lease of one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptToken(String);

impl ReceiptToken {
    pub fn generate() -> Self {
        ReceiptToken(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReceiptToken {
    fn from(value: &str) -> Self {
        ReceiptToken(value.to_string())
    }
}

impl Display for ReceiptToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message handed out by a queue together with the lease that owns it.
#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: String,
    pub body: Vec<u8>,
    // number of times this message has been leased, including this one
    pub delivery_count: u32,
    pub receipt: ReceiptToken,
    // enqueue time
    pub sent_at: u64,
}

impl Message {
    pub fn size(&self) -> usize {
        self.body.len()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Decode a message delivered through a topic: first the envelope, then its payload.
    pub fn decode_envelope<T: DeserializeOwned>(&self) -> Result<(Envelope, T), serde_json::Error> {
        let envelope: Envelope = self.decode()?;
        let payload = envelope.payload()?;
        Ok((envelope, payload))
    }
}

/// Job handed from the copy worker to the log worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    // destination store the object was copied into
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// One point of a derived time series. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub namespace: String,
    pub name: String,
    pub value: f64,
    pub timestamp: u64,
}
