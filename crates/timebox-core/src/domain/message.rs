//! Message value types for the queue abstraction.

use serde::{Deserialize, Serialize};

/// What the transport needs to delete a message: its id plus the
/// receipt issued for the current delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub id: String,
    pub receipt: String,
}

impl MessageHandle {
    pub fn new(id: impl Into<String>, receipt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            receipt: receipt.into(),
        }
    }
}

/// One message as delivered by the transport.
///
/// The body stays as JSON until the consumer's pull decodes it; a message is
/// "in flight" from receive until it is deleted or its receipt expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub handle: MessageHandle,
    pub body: serde_json::Value,
}

impl Message {
    pub fn new(handle: MessageHandle, body: serde_json::Value) -> Self {
        Self { handle, body }
    }
}

/// One entry of a batch-delete `failed` list.
///
/// Any non-empty failed list is fatal for the pass (the transport kept a
/// message we believed processed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    pub id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrip_json() {
        let m = Message::new(
            MessageHandle::new("m-1", "r-1"),
            serde_json::json!({"order": 42}),
        );
        let s = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&s).unwrap();
        assert_eq!(back, m);
    }
}
