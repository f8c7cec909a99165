//! Wire protocol errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Message '{kind}' is missing field '{field}'")]
    MissingField { kind: String, field: &'static str },

    #[error("Message '{kind}' has an invalid payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Payload must be a JSON object")]
    NotAnObject,
}
