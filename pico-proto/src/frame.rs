//! Wire frames
//!
//! Every datagram is a UTF-8 JSON object. Client requests carry `cmd`, `frm = "app"`, `idp`
//! and `pin`; the device answers each request twice on the same `idp`: first with an ACK
//! frame (`res = 99`, `frm = "mst"`), then with the substantive response (`res != 99`). The
//! client closes the exchange with its own ACK frame.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Response code marking an ACK frame
pub const ACK_CODE: i64 = 99;

/// Command name of the status query
pub const STATUS_QUERY: &str = "stato_sync";

/// Command name used by every parameter update
pub const UPDATE_PARAMETERS: &str = "upd_pico";

/// Which side of the link produced a frame (`frm`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The client application
    #[serde(rename = "app")]
    App,
    /// The device
    #[serde(rename = "mst")]
    Device,
}

impl Role {
    /// The value carried in the `frm` field
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Device => "mst",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "app" => Some(Self::App),
            "mst" => Some(Self::Device),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a frame participates in an exchange
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Device acknowledgment of a request (`res = 99` from the device)
    Ack,
    /// Substantive answer to a request (`res` present and not 99)
    Response,
    /// A frame without a response code, such as an unsolicited device event
    Command,
    /// An ACK frame not produced by the device, e.g. a reflected client ACK
    Other,
}

/// Errors raised while decoding frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The datagram was not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The datagram was JSON, but not an object
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
    /// A successful response could not be decoded into the expected structure
    #[error("malformed {what} payload: {source}")]
    Payload {
        /// What was being decoded
        what: &'static str,
        /// The underlying decoding error
        source: serde_json::Error,
    },
}

/// A decoded JSON frame
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    /// Decode a raw datagram
    pub fn decode(datagram: &[u8]) -> Result<Self, ProtocolError> {
        let value = serde_json::from_slice::<Value>(datagram)?;
        Self::from_value(value)
    }

    /// Wrap an already parsed JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(ProtocolError::NotAnObject(json_type(&other))),
        }
    }

    /// Exchange sequence number, if present and representable
    pub fn idp(&self) -> Option<u32> {
        self.fields
            .get("idp")?
            .as_u64()
            .and_then(|idp| u32::try_from(idp).ok())
    }

    /// Command name (`cmd`)
    pub fn command(&self) -> Option<&str> {
        self.fields.get("cmd")?.as_str()
    }

    /// Sender role (`frm`)
    pub fn sender(&self) -> Option<Role> {
        Role::parse(self.fields.get("frm")?.as_str()?)
    }

    /// Response code (`res`)
    pub fn response_code(&self) -> Option<i64> {
        self.fields.get("res")?.as_i64()
    }

    /// Classify this frame for exchange matching
    pub fn kind(&self) -> FrameKind {
        match self.response_code() {
            Some(ACK_CODE) if self.sender() == Some(Role::Device) => FrameKind::Ack,
            Some(ACK_CODE) => FrameKind::Other,
            Some(_) => FrameKind::Response,
            None if self.fields.contains_key("res") => FrameKind::Response,
            None => FrameKind::Command,
        }
    }

    /// Look up an arbitrary field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields of the frame
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consume the frame, yielding its JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Serialize a request, stamping it with `idp`
///
/// `payload` is the command body without its sequence number; any `idp` it already carries
/// is overwritten.
pub fn encode_request(payload: &Map<String, Value>, idp: u32) -> Bytes {
    let mut fields = payload.clone();
    fields.insert("idp".into(), idp.into());
    encode(fields)
}

/// Serialize the client ACK that closes the exchange identified by `idp`
pub fn encode_ack(idp: u32) -> Bytes {
    let mut fields = Map::new();
    fields.insert("idp".into(), idp.into());
    fields.insert("frm".into(), Role::App.as_str().into());
    fields.insert("res".into(), ACK_CODE.into());
    encode(fields)
}

fn encode(fields: Map<String, Value>) -> Bytes {
    Bytes::from(Value::Object(fields).to_string())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(value: Value) -> Message {
        Message::from_value(value).unwrap()
    }

    #[test]
    fn classify() {
        assert_eq!(
            msg(json!({"res": 99, "frm": "mst", "idp": 5})).kind(),
            FrameKind::Ack
        );
        assert_eq!(
            msg(json!({"res": 99, "frm": "app", "idp": 5})).kind(),
            FrameKind::Other
        );
        assert_eq!(msg(json!({"res": 1, "idp": 5})).kind(), FrameKind::Response);
        assert_eq!(
            msg(json!({"cmd": "evt", "idp": 5})).kind(),
            FrameKind::Command
        );
    }

    #[test]
    fn idp_bounds() {
        assert_eq!(msg(json!({"idp": 12})).idp(), Some(12));
        assert_eq!(msg(json!({"idp": -1})).idp(), None);
        assert_eq!(msg(json!({"idp": 1u64 << 40})).idp(), None);
        assert_eq!(msg(json!({"idp": "5"})).idp(), None);
        assert_eq!(msg(json!({})).idp(), None);
    }

    #[test]
    fn reject_non_objects() {
        assert!(matches!(
            Message::decode(b"[1,2]"),
            Err(ProtocolError::NotAnObject("an array"))
        ));
        assert!(matches!(
            Message::decode(b"{not json"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn request_carries_idp() {
        let mut payload = Map::new();
        payload.insert("cmd".into(), STATUS_QUERY.into());
        payload.insert("frm".into(), "app".into());
        payload.insert("pin".into(), "1234".into());
        let decoded = Message::decode(&encode_request(&payload, 5)).unwrap();
        assert_eq!(
            decoded.into_value(),
            json!({"cmd": "stato_sync", "idp": 5, "pin": "1234", "frm": "app"})
        );
    }

    #[test]
    fn closing_ack() {
        let decoded = Message::decode(&encode_ack(5)).unwrap();
        assert_eq!(
            decoded.into_value(),
            json!({"idp": 5, "frm": "app", "res": 99})
        );
    }
}
