// Payload Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Store-assigned document identifier (UUID v4)
pub type DocumentId = String;

/// Field added to a payload when it is rendered as a stored document
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Webhook payload: an arbitrary JSON object with no fixed schema.
///
/// Payloads are anonymous; two identical payloads are two signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Accepts only JSON objects
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(DomainError::NotAnObject(json_kind(&other))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Queue entry: opaque UTF-8 text holding a serialized payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueEntry(String);

impl QueueEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Compact JSON encoding, identical in shape to the ingress `payload` field
    pub fn encode(payload: &Payload) -> serde_json::Result<Self> {
        serde_json::to_string(payload).map(Self)
    }

    /// Decode the entry; fails for non-JSON text and for JSON that is not an object
    pub fn decode(&self) -> Result<Payload> {
        let value: Value =
            serde_json::from_str(&self.0).map_err(|e| DomainError::InvalidJson(e.to_string()))?;
        Payload::from_value(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Persisted payload plus storage-assigned metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub collection: String,
    pub body: Payload,
    pub inserted_at: i64,
}

impl StoredDocument {
    /// Document as seen by readers of the store: the payload with `_id` added
    pub fn to_document(&self) -> Value {
        let mut fields = self.body.as_map().clone();
        fields.insert(DOCUMENT_ID_FIELD.to_string(), Value::String(self.id.clone()));
        Value::Object(fields)
    }
}

/// Ingress acknowledgment.
///
/// Both variants mean "accepted for asynchronous processing". Neither says
/// anything about persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acknowledgment {
    /// Appended to the queue tail
    Buffered,
    /// Degraded mode: no queue handle, nothing was appended
    Unqueued,
}

impl Acknowledgment {
    pub fn is_queued(&self) -> bool {
        matches!(self, Acknowledgment::Buffered)
    }
}

/// Malformed entry set aside for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub entry: String,
    pub reason: String,
    pub failed_at: i64,
}

impl DeadLetter {
    pub fn new(entry: &QueueEntry, reason: impl Into<String>, failed_at: i64) -> Self {
        Self {
            entry: entry.as_str().to_string(),
            reason: reason.into(),
            failed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_rejects_non_objects() {
        for value in [json!(null), json!(1), json!("x"), json!([1, 2]), json!(true)] {
            assert!(Payload::from_value(value).is_err());
        }
        assert!(Payload::from_value(json!({})).is_ok());
    }

    #[test]
    fn test_entry_decodes_to_same_payload() {
        let payload = Payload::from_value(json!({
            "ticker": "BTCUSDT",
            "action": "buy",
            "price": 95000.5,
            "meta": {"tags": ["a", "b"], "n": null}
        }))
        .unwrap();

        let entry = QueueEntry::encode(&payload).unwrap();
        assert!(!entry.as_str().contains('\n'));
        assert_eq!(entry.decode().unwrap(), payload);
    }

    #[test]
    fn test_decode_malformed_entries() {
        let err = QueueEntry::new("not json at all").decode().unwrap_err();
        assert!(matches!(err, DomainError::InvalidJson(_)));

        let err = QueueEntry::new("[1,2,3]").decode().unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_stored_document_adds_id() {
        let doc = StoredDocument {
            id: "abc".to_string(),
            collection: "signals".to_string(),
            body: Payload::from_value(json!({"ticker": "ETHUSDT"})).unwrap(),
            inserted_at: 0,
        };
        assert_eq!(doc.to_document(), json!({"ticker": "ETHUSDT", "_id": "abc"}));
    }
}
