use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::Value;

use crate::error::BridgeError;

/// Versioned envelope types shared by the editor and its host.
///
/// Every message crossing the boundary is one of three kinds, discriminated by `kind`:
///
/// ```json
/// { "v": 1, "kind": "event",    "type": "SCHEMA_LOAD", "payload": { ... } }
/// { "v": 1, "kind": "request",  "id": "…", "type": "FOO", "payload": { ... } }
/// { "v": 1, "kind": "response", "id": "…", "ok": true, "payload": { ... } }
/// ```
///
/// Anything carrying a different `v` is rejected by [`BridgeMsg::decode`] before it reaches the
/// bridge.
pub const PROTOCOL_VERSION: u64 = 1;

/// Marker for the only protocol version this crate speaks. Serializes as `1`, refuses anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct V1;

impl Serialize for V1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(PROTOCOL_VERSION)
    }
}

impl<'de> Deserialize<'de> for V1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u64::deserialize(deserializer)?;
        if v == PROTOCOL_VERSION {
            Ok(V1)
        } else {
            Err(de::Error::custom(format!("unsupported envelope version {v}")))
        }
    }
}

/// Fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventMsg {
    #[schemars(with = "u8")]
    pub v: V1,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A call that expects exactly one [`ResponseMsg`] carrying the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequestMsg {
    #[schemars(with = "u8")]
    pub v: V1,
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Answer to a [`RequestMsg`]. `ok == false` means `error` (if any) describes the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResponseMsg {
    #[schemars(with = "u8")]
    pub v: V1,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BridgeMsg {
    Event(EventMsg),
    Request(RequestMsg),
    Response(ResponseMsg),
}

// -----------------------------------------------------------------------------
// Helper constructors
// -----------------------------------------------------------------------------
impl BridgeMsg {
    pub fn event(msg_type: impl Into<String>, payload: Option<Value>) -> Self {
        BridgeMsg::Event(EventMsg {
            v: V1,
            msg_type: msg_type.into(),
            payload,
            meta: None,
        })
    }

    pub fn request(id: impl Into<String>, msg_type: impl Into<String>, payload: Option<Value>) -> Self {
        BridgeMsg::Request(RequestMsg {
            v: V1,
            id: id.into(),
            msg_type: msg_type.into(),
            payload,
            meta: None,
        })
    }

    pub fn success(id: impl Into<String>, payload: Option<Value>) -> Self {
        BridgeMsg::Response(ResponseMsg {
            v: V1,
            id: id.into(),
            ok: true,
            payload,
            error: None,
            meta: None,
        })
    }

    pub fn fail(id: impl Into<String>, error: Option<Value>) -> Self {
        BridgeMsg::Response(ResponseMsg {
            v: V1,
            id: id.into(),
            ok: false,
            payload: None,
            error,
            meta: None,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMsg::Event(_) => "event",
            BridgeMsg::Request(_) => "request",
            BridgeMsg::Response(_) => "response",
        }
    }

    /// `type` of events and requests; responses carry none.
    pub fn msg_type(&self) -> Option<&str> {
        match self {
            BridgeMsg::Event(ev) => Some(&ev.msg_type),
            BridgeMsg::Request(req) => Some(&req.msg_type),
            BridgeMsg::Response(_) => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            BridgeMsg::Event(ev) => ev.payload.as_ref(),
            BridgeMsg::Request(req) => req.payload.as_ref(),
            BridgeMsg::Response(rsp) => rsp.payload.as_ref(),
        }
    }

    /// Validates the version tag and decodes a raw JSON envelope.
    pub fn decode(value: Value) -> Result<Self, BridgeError> {
        match value.get("v").and_then(Value::as_u64) {
            Some(PROTOCOL_VERSION) => {}
            _ => {
                let seen = value.get("v").map(|v| v.to_string()).unwrap_or_else(|| "none".into());
                return Err(BridgeError::UnsupportedVersion(seen));
            }
        }
        serde_json::from_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
    }

    /// Decodes one line of a JSON-lines stream.
    pub fn decode_line(line: &str) -> Result<Self, BridgeError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| BridgeError::Malformed(e.to_string()))?;
        Self::decode(value)
    }

    pub fn encode(&self) -> Result<Value, BridgeError> {
        serde_json::to_value(self).map_err(|e| BridgeError::Encode(e.to_string()))
    }
}
