use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// No response arrived before the request deadline.
    #[error("Bridge request timeout: {msg_type}")]
    Timeout { msg_type: String },

    /// The host answered with `ok: false`.
    #[error("host rejected the request: {error}")]
    Host { error: Value },

    #[error("bridge dropped the request before it was settled")]
    Closed,

    #[error("correlation id `{0}` is already pending")]
    DuplicateId(String),

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("could not encode envelope: {0}")]
    Encode(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }

    /// Error used when the host reports a failure without saying why.
    pub fn generic_host_error() -> Self {
        BridgeError::Host {
            error: Value::String("Bridge error".into()),
        }
    }
}
