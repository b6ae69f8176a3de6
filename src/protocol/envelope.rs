//! The JSON message envelope and ingress validation.
//!
//! Every inbound message is decoded and validated exactly once here. What
//! comes out of [`Envelope::parse_request`] is typed and within limits; the
//! merge never sees raw client JSON.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;
use super::payload::{
    OP_APPEND_NOTE, OP_SET, OpAck, OpBroadcast, OpSubmit, PresenceUpdate, SnapshotResponse,
    WireOp, ops_to_wire,
};
use crate::core::{
    ClientSnapshot, DocId, ErrorPayload, Limits, Operation, RoomKey, TenantId, UserId,
};

pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    JoinRoom,
    LeaveRoom,
    OpSubmit,
    OpAck,
    OpBroadcast,
    SnapshotRequest,
    SnapshotResponse,
    PresenceUpdate,
    Error,
    Unknown(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::JoinRoom => "join_room",
            MessageType::LeaveRoom => "leave_room",
            MessageType::OpSubmit => "op_submit",
            MessageType::OpAck => "op_ack",
            MessageType::OpBroadcast => "op_broadcast",
            MessageType::SnapshotRequest => "snapshot_request",
            MessageType::SnapshotResponse => "snapshot_response",
            MessageType::PresenceUpdate => "presence_update",
            MessageType::Error => "error",
            MessageType::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "join_room" => MessageType::JoinRoom,
            "leave_room" => MessageType::LeaveRoom,
            "op_submit" => MessageType::OpSubmit,
            "op_ack" => MessageType::OpAck,
            "op_broadcast" => MessageType::OpBroadcast,
            "snapshot_request" => MessageType::SnapshotRequest,
            "snapshot_response" => MessageType::SnapshotResponse,
            "presence_update" => MessageType::PresenceUpdate,
            "error" => MessageType::Error,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    /// Types a client may send.
    pub fn is_client_request(&self) -> bool {
        matches!(
            self,
            MessageType::JoinRoom
                | MessageType::LeaveRoom
                | MessageType::OpSubmit
                | MessageType::SnapshotRequest
                | MessageType::PresenceUpdate
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MessageType::parse(s))
    }
}

impl Serialize for MessageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(MessageType::parse(&raw))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub version: u32,
    pub tenant: String,
    pub doc_id: String,
    pub user_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Validated addressing of an inbound envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub key: RoomKey,
    pub user: UserId,
    pub request_id: Option<String>,
}

/// Validated client request.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientRequest {
    Join,
    Leave,
    Submit {
        base_version: u64,
        ops: Vec<Operation>,
    },
    SnapshotRequest,
    Presence(PresenceUpdate),
}

impl Envelope {
    /// Decode raw bytes, enforcing size, schema version and a known type.
    pub fn decode(bytes: &[u8], limits: &Limits) -> Result<Self, ProtocolError> {
        if bytes.len() > limits.max_envelope_bytes {
            return Err(ProtocolError::TooLarge {
                size: bytes.len(),
                max: limits.max_envelope_bytes,
            });
        }
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::malformed(e.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                got: envelope.version,
                expected: ENVELOPE_VERSION,
            });
        }
        if let MessageType::Unknown(kind) = &envelope.kind {
            return Err(ProtocolError::UnknownType { kind: kind.clone() });
        }
        Ok(envelope)
    }

    /// Best-effort extraction of `request_id` from bytes that failed to decode.
    pub fn peek_request_id(bytes: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        value
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn context(&self) -> Result<RequestContext, ProtocolError> {
        let tenant = TenantId::new(self.tenant.as_str())?;
        let doc = DocId::new(self.doc_id.as_str())?;
        let user = UserId::new(self.user_id.as_str())?;
        Ok(RequestContext {
            key: RoomKey::new(tenant, doc),
            user,
            request_id: self.request_id.clone(),
        })
    }

    pub fn parse_request(&self, limits: &Limits) -> Result<ClientRequest, ProtocolError> {
        match &self.kind {
            MessageType::JoinRoom => Ok(ClientRequest::Join),
            MessageType::LeaveRoom => Ok(ClientRequest::Leave),
            MessageType::SnapshotRequest => Ok(ClientRequest::SnapshotRequest),
            MessageType::OpSubmit => {
                let submit: OpSubmit = self.payload_as("op_submit")?;
                let ops = validate_ops(submit.ops, limits)?;
                Ok(ClientRequest::Submit {
                    base_version: submit.base_version,
                    ops,
                })
            }
            MessageType::PresenceUpdate => {
                if self.payload.is_null() {
                    return Ok(ClientRequest::Presence(PresenceUpdate::default()));
                }
                Ok(ClientRequest::Presence(self.payload_as("presence_update")?))
            }
            other => Err(ProtocolError::UnknownType {
                kind: other.as_str().to_string(),
            }),
        }
    }

    fn payload_as<T: DeserializeOwned>(&self, kind: &'static str) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ProtocolError::invalid_payload(kind, e.to_string()))
    }

    /// Typed view of the payload, for consumers of outbound envelopes.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    fn outbound<T: Serialize>(
        kind: MessageType,
        key: &RoomKey,
        user: &UserId,
        request_id: Option<String>,
        body: &T,
    ) -> Self {
        Self {
            kind,
            version: ENVELOPE_VERSION,
            tenant: key.tenant.to_string(),
            doc_id: key.doc.to_string(),
            user_id: user.to_string(),
            request_id,
            payload: payload_value(body),
        }
    }

    pub fn op_ack(key: &RoomKey, user: &UserId, request_id: Option<String>, version: u64) -> Self {
        Self::outbound(
            MessageType::OpAck,
            key,
            user,
            request_id,
            &OpAck {
                op_version: version,
            },
        )
    }

    pub fn op_broadcast(key: &RoomKey, user: &UserId, version: u64, ops: &[Operation]) -> Self {
        Self::outbound(
            MessageType::OpBroadcast,
            key,
            user,
            None,
            &OpBroadcast {
                op_version: version,
                ops: ops_to_wire(ops),
                user_id: user.clone(),
            },
        )
    }

    pub fn snapshot_response(
        key: &RoomKey,
        user: &UserId,
        request_id: Option<String>,
        snapshot: ClientSnapshot,
    ) -> Self {
        Self::outbound(
            MessageType::SnapshotResponse,
            key,
            user,
            request_id,
            &SnapshotResponse::from(snapshot),
        )
    }

    pub fn presence_update(key: &RoomKey, user: &UserId, update: &PresenceUpdate) -> Self {
        Self::outbound(MessageType::PresenceUpdate, key, user, None, update)
    }

    /// Error reply. Addressing is echoed raw since it may be what failed.
    pub fn error(
        tenant: &str,
        doc_id: &str,
        user_id: &str,
        request_id: Option<String>,
        error: &ErrorPayload,
    ) -> Self {
        Self {
            kind: MessageType::Error,
            version: ENVELOPE_VERSION,
            tenant: tenant.to_string(),
            doc_id: doc_id.to_string(),
            user_id: user_id.to_string(),
            request_id,
            payload: payload_value(error),
        }
    }
}

// Payload types have string keys only, so serialization cannot fail.
fn payload_value<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize envelope payload");
        Value::Null
    })
}

/// Turn wire ops into validated operations.
pub fn validate_ops(ops: Vec<WireOp>, limits: &Limits) -> Result<Vec<Operation>, ProtocolError> {
    if ops.is_empty() {
        return Err(ProtocolError::invalid_payload(
            "op_submit",
            "ops must not be empty",
        ));
    }
    if ops.len() > limits.max_ops_per_batch {
        return Err(ProtocolError::TooManyOps {
            count: ops.len(),
            max: limits.max_ops_per_batch,
        });
    }
    ops.into_iter()
        .enumerate()
        .map(|(idx, op)| validate_op(idx, op, limits))
        .collect()
}

fn validate_op(idx: usize, op: WireOp, limits: &Limits) -> Result<Operation, ProtocolError> {
    let invalid = |reason: String| ProtocolError::invalid_payload("op_submit", reason);
    if op.path.len() > limits.max_path_bytes {
        return Err(invalid(format!(
            "ops[{idx}]: path longer than {} bytes",
            limits.max_path_bytes
        )));
    }
    match op.kind.as_str() {
        OP_SET => {
            if op.path.is_empty() {
                return Err(invalid(format!("ops[{idx}]: set requires a path")));
            }
            Ok(Operation::Set {
                path: op.path,
                value: op.value,
                ts: op.ts,
            })
        }
        OP_APPEND_NOTE => {
            let text = match op.value {
                Value::String(text) => text,
                Value::Object(mut map) => match map.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => {
                        return Err(invalid(format!(
                            "ops[{idx}]: append_note object needs a string `text`"
                        )));
                    }
                },
                _ => {
                    return Err(invalid(format!(
                        "ops[{idx}]: append_note value must be a string or {{text}}"
                    )));
                }
            };
            if text.len() > limits.max_note_bytes {
                return Err(invalid(format!(
                    "ops[{idx}]: note longer than {} bytes",
                    limits.max_note_bytes
                )));
            }
            Ok(Operation::AppendNote { text, ts: op.ts })
        }
        "" => Err(invalid(format!("ops[{idx}]: missing operation type"))),
        other => Ok(Operation::Unrecognized {
            kind: other.to_string(),
            path: op.path,
            value: op.value,
            ts: op.ts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn submit(ops: Value) -> Vec<u8> {
        bytes(json!({
            "type": "op_submit",
            "version": 1,
            "tenant": "t1",
            "doc_id": "d1",
            "user_id": "u1",
            "request_id": "r-1",
            "payload": {"baseVersion": 0, "ops": ops}
        }))
    }

    #[test]
    fn decodes_and_parses_submit() {
        let limits = Limits::default();
        let raw = submit(json!([
            {"path": "inputs.wacc", "type": "set", "value": 9.0, "ts": 1000},
            {"type": "append_note", "value": {"text": "why 9%?"}, "ts": 1001}
        ]));
        let envelope = Envelope::decode(&raw, &limits).unwrap();
        let ctx = envelope.context().unwrap();
        assert_eq!(ctx.key, RoomKey::parse("t1", "d1").unwrap());
        assert_eq!(ctx.request_id.as_deref(), Some("r-1"));
        match envelope.parse_request(&limits).unwrap() {
            ClientRequest::Submit { base_version, ops } => {
                assert_eq!(base_version, 0);
                assert_eq!(
                    ops,
                    vec![
                        Operation::Set {
                            path: "inputs.wacc".into(),
                            value: json!(9.0),
                            ts: 1000
                        },
                        Operation::AppendNote {
                            text: "why 9%?".into(),
                            ts: 1001
                        },
                    ]
                );
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_version_and_unknown_type() {
        let limits = Limits::default();
        let raw = bytes(json!({
            "type": "join_room", "version": 2, "tenant": "t", "doc_id": "d", "user_id": "u"
        }));
        let err = Envelope::decode(&raw, &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedVersion);

        let raw = bytes(json!({
            "type": "rename_doc", "version": 1, "tenant": "t", "doc_id": "d", "user_id": "u"
        }));
        let err = Envelope::decode(&raw, &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownMessageType);
    }

    #[test]
    fn server_types_are_not_client_requests() {
        let limits = Limits::default();
        let raw = bytes(json!({
            "type": "op_ack", "version": 1, "tenant": "t", "doc_id": "d", "user_id": "u",
            "payload": {"opVersion": 3}
        }));
        let envelope = Envelope::decode(&raw, &limits).unwrap();
        let err = envelope.parse_request(&limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownMessageType);
    }

    #[test]
    fn rejects_oversized_envelope() {
        let limits = Limits {
            max_envelope_bytes: 32,
            ..Limits::default()
        };
        let err = Envelope::decode(&submit(json!([])), &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EnvelopeTooLarge);
    }

    #[test]
    fn rejects_bad_ids() {
        let limits = Limits::default();
        let raw = bytes(json!({
            "type": "join_room", "version": 1, "tenant": "a:b", "doc_id": "d", "user_id": "u"
        }));
        let envelope = Envelope::decode(&raw, &limits).unwrap();
        assert_eq!(
            envelope.context().unwrap_err().code(),
            ErrorCode::MalformedEnvelope
        );
    }

    #[test]
    fn malformed_json_keeps_request_id_when_visible() {
        let raw = br#"{"type": "op_submit", "request_id": "r-9"}"#;
        let err = Envelope::decode(raw, &Limits::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedEnvelope);
        assert_eq!(Envelope::peek_request_id(raw).as_deref(), Some("r-9"));
        assert_eq!(Envelope::peek_request_id(b"{{{"), None);
    }

    #[test]
    fn op_validation_rules() {
        let limits = Limits {
            max_ops_per_batch: 2,
            max_path_bytes: 4,
            max_note_bytes: 3,
            ..Limits::default()
        };
        let check = |ops: Value| {
            let envelope = Envelope::decode(&submit(ops), &limits).unwrap();
            envelope.parse_request(&limits)
        };

        assert!(check(json!([])).is_err());
        let too_many = check(json!([
            {"path": "a", "type": "set", "value": 1, "ts": 1},
            {"path": "b", "type": "set", "value": 1, "ts": 1},
            {"path": "c", "type": "set", "value": 1, "ts": 1}
        ]))
        .unwrap_err();
        assert!(matches!(too_many, ProtocolError::TooManyOps { count: 3, max: 2 }));
        assert!(check(json!([{"path": "", "type": "set", "value": 1, "ts": 1}])).is_err());
        assert!(check(json!([{"path": "abcde", "type": "set", "value": 1, "ts": 1}])).is_err());
        assert!(check(json!([{"type": "append_note", "value": 5, "ts": 1}])).is_err());
        assert!(check(json!([{"type": "append_note", "value": "long", "ts": 1}])).is_err());
        assert!(check(json!([{"path": "a", "type": "set", "value": 1}])).is_err());
        assert!(check(json!([{"path": "a", "value": 1, "ts": 1}])).is_err());

        let unknown = check(json!([{"path": "a", "type": "delete", "ts": 1}])).unwrap();
        assert!(matches!(
            unknown,
            ClientRequest::Submit { ref ops, .. }
                if matches!(&ops[0], Operation::Unrecognized { kind, .. } if kind == "delete")
        ));
    }

    #[test]
    fn outbound_envelopes_have_wire_shape() {
        let key = RoomKey::parse("t1", "d1").unwrap();
        let user = UserId::new("u2").unwrap();
        let ack = Envelope::op_ack(&key, &user, Some("r-2".into()), 7);
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({
                "type": "op_ack",
                "version": 1,
                "tenant": "t1",
                "doc_id": "d1",
                "user_id": "u2",
                "request_id": "r-2",
                "payload": {"opVersion": 7}
            })
        );

        let ops = [Operation::Set {
            path: "p".into(),
            value: json!(1),
            ts: 3,
        }];
        let broadcast = Envelope::op_broadcast(&key, &user, 8, &ops);
        assert_eq!(broadcast.request_id, None);
        let body: OpBroadcast = broadcast.decode_payload().unwrap();
        assert_eq!(body.op_version, 8);
        assert_eq!(body.user_id, user);
    }
}
