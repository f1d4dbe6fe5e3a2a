use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const UNKNOWN_PEER: i64 = -32001;
    pub const PEER_TRANSPORT_FAILED: i64 = -32002;
    pub const BACKPRESSURE: i64 = -32003;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, reason)
    }

    pub fn unknown_peer(peer: &str) -> Self {
        Self::new(Self::UNKNOWN_PEER, format!("unknown peer: {peer}"))
    }
}

/// A single JSON-RPC 2.0 message: a request (has `id`), a notification (no
/// `id`), or a response (carries a matching `id` plus `result` xor `error`).
///
/// Transports exchange these wrapped in [`Frame`], which additionally
/// allows batches, per the JSON-RPC 2.0 spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request {
        version: JsonRpcVersion,
        id: Value,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Notification {
        version: JsonRpcVersion,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Response {
        version: JsonRpcVersion,
        id: Value,
        #[serde(flatten)]
        outcome: ResponseOutcome,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOutcome {
    Ok { result: Value },
    Err { error: JsonRpcError },
}

/// Marker type that (de)serializes only the literal string `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s != "2.0" {
            return Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )));
        }
        Ok(JsonRpcVersion)
    }
}

/// The wire envelope: either a single message or a batch of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Single(Message),
    Batch(Vec<Message>),
}

impl Message {
    pub fn request(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            version: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            version: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }

    pub fn response_ok(id: Value, result: Value) -> Self {
        Message::Response {
            version: JsonRpcVersion,
            id,
            outcome: ResponseOutcome::Ok { result },
        }
    }

    pub fn response_err(id: Value, error: JsonRpcError) -> Self {
        Message::Response {
            version: JsonRpcVersion,
            id,
            outcome: ResponseOutcome::Err { error },
        }
    }

    pub fn id(&self) -> Option<&Value> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Response { id, .. } => Some(id),
            Message::Notification { .. } => None,
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } => Some(method),
            Message::Notification { method, .. } => Some(method),
            Message::Response { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trips_through_json() {
        let msg = Message::request(1, "node/get_info", None);
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"version\":\"2.0\""));
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.method(), Some("node/get_info"));
    }

    #[test]
    fn notification_has_no_id() {
        let msg = Message::notification("gossip/announce", Some(json!({"peers": []})));
        assert!(msg.id().is_none());
    }

    #[test]
    fn response_err_round_trips() {
        let msg = Message::response_err(json!(5), JsonRpcError::method_not_found("foo/bar"));
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        match back {
            Message::Response {
                outcome: ResponseOutcome::Err { error },
                ..
            } => assert_eq!(error.code, JsonRpcError::METHOD_NOT_FOUND),
            _ => panic!("expected an error response"),
        }
    }

    #[test]
    fn batch_frame_round_trips() {
        let frame = Frame::Batch(vec![
            Message::request(1, "a/op", None),
            Message::notification("b/op", None),
        ]);
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        match back {
            Frame::Batch(v) => assert_eq!(v.len(), 2),
            Frame::Single(_) => panic!("expected a batch"),
        }
    }

    #[test]
    fn rejects_wrong_jsonrpc_version() {
        let text = r#"{"version":"1.0","id":1,"method":"x"}"#;
        let result: Result<Message, _> = serde_json::from_str(text);
        assert!(result.is_err());
    }
}
