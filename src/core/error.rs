//! Core capability errors (identifier validation, snapshot decoding) and the
//! client-facing error payload.
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Transience;

/// Invalid identifier supplied by a client or found in persisted data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("tenant id `{raw}` is invalid: {reason}")]
    Tenant { raw: String, reason: String },
    #[error("document id `{raw}` is invalid: {reason}")]
    Doc { raw: String, reason: String },
    #[error("user id `{raw}` is invalid: {reason}")]
    User { raw: String, reason: String },
}

/// Persisted snapshot could not be decoded.
#[derive(Debug, Error, Clone)]
#[error("snapshot is corrupt: {reason}")]
pub struct SnapshotCorrupt {
    pub reason: String,
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    SnapshotCorrupt(#[from] SnapshotCorrupt),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }
}

// =============================================================================
// Protocol error codes + payload
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Envelope framing / validation
    MalformedEnvelope,
    UnsupportedVersion,
    UnknownMessageType,
    InvalidPayload,
    EnvelopeTooLarge,

    // Admission
    TenantNotAllowed,
    RoomFull,
    RateLimited,

    // Generic internal
    Internal,

    Unknown(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::MalformedEnvelope => "malformed_envelope",
            ErrorCode::UnsupportedVersion => "unsupported_version",
            ErrorCode::UnknownMessageType => "unknown_message_type",
            ErrorCode::InvalidPayload => "invalid_payload",
            ErrorCode::EnvelopeTooLarge => "envelope_too_large",

            ErrorCode::TenantNotAllowed => "tenant_not_allowed",
            ErrorCode::RoomFull => "room_full",
            ErrorCode::RateLimited => "rate_limited",

            ErrorCode::Internal => "internal",

            ErrorCode::Unknown(code) => code.as_str(),
        }
    }

    pub fn parse(code: &str) -> Self {
        match code {
            "malformed_envelope" => ErrorCode::MalformedEnvelope,
            "unsupported_version" => ErrorCode::UnsupportedVersion,
            "unknown_message_type" => ErrorCode::UnknownMessageType,
            "invalid_payload" => ErrorCode::InvalidPayload,
            "envelope_too_large" => ErrorCode::EnvelopeTooLarge,

            "tenant_not_allowed" => ErrorCode::TenantNotAllowed,
            "room_full" => ErrorCode::RoomFull,
            "rate_limited" => ErrorCode::RateLimited,

            "internal" => ErrorCode::Internal,

            other => ErrorCode::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ErrorCode::parse(s))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::parse(&raw))
    }
}

/// Body of an `error` message sent back to the submitting client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl ErrorPayload {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details<T: Serialize>(mut self, details: T) -> Self {
        self.details = serialize_optional(details);
        self
    }

    pub fn details_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.details {
            Some(value) => serde_json::from_value(value.clone()).map(Some),
            None => Ok(None),
        }
    }
}

fn serialize_optional<T: Serialize>(value: T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(_) => None,
    }
}
