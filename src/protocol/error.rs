use serde_json::json;
use thiserror::Error;

use crate::core::{CoreError, ErrorCode, ErrorPayload, InvalidId};
use crate::error::Transience;

/// Ingress validation failure. Every variant is reported back to the sender.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("envelope is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
    #[error("unsupported envelope version {got}, expected {expected}")]
    UnsupportedVersion { got: u32, expected: u32 },
    #[error("unknown message type `{kind}`")]
    UnknownType { kind: String },
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
    #[error("batch has {count} operations, limit is {max}")]
    TooManyOps { count: usize, max: usize },
}

impl ProtocolError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            reason: reason.into(),
        }
    }

    pub fn invalid_payload(kind: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::TooLarge { .. } => ErrorCode::EnvelopeTooLarge,
            ProtocolError::Malformed { .. } | ProtocolError::InvalidId(_) => {
                ErrorCode::MalformedEnvelope
            }
            ProtocolError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            ProtocolError::UnknownType { .. } => ErrorCode::UnknownMessageType,
            ProtocolError::InvalidPayload { .. } | ProtocolError::TooManyOps { .. } => {
                ErrorCode::InvalidPayload
            }
        }
    }

    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn to_error_payload(&self) -> ErrorPayload {
        let payload = ErrorPayload::new(self.code(), self.to_string());
        match self {
            ProtocolError::TooLarge { size, max } => {
                payload.with_details(json!({"size": size, "max": max}))
            }
            ProtocolError::UnsupportedVersion { got, expected } => {
                payload.with_details(json!({"got": got, "expected": expected}))
            }
            ProtocolError::UnknownType { kind } => payload.with_details(json!({"type": kind})),
            ProtocolError::TooManyOps { count, max } => {
                payload.with_details(json!({"count": count, "max": max}))
            }
            _ => payload,
        }
    }
}

impl From<CoreError> for ProtocolError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidId(id) => ProtocolError::InvalidId(id),
            other => ProtocolError::malformed(other.to_string()),
        }
    }
}
