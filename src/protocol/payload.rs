//! Type-specific envelope bodies.
//!
//! Field names follow the wire exactly (camelCase where clients expect it).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ClientSnapshot, Note, Operation, UserId};

/// One operation as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireOp {
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
    pub ts: u64,
}

pub const OP_SET: &str = "set";
pub const OP_APPEND_NOTE: &str = "append_note";

impl From<&Operation> for WireOp {
    fn from(op: &Operation) -> Self {
        match op {
            Operation::Set { path, value, ts } => WireOp {
                path: path.clone(),
                kind: OP_SET.to_string(),
                value: value.clone(),
                ts: *ts,
            },
            Operation::AppendNote { text, ts } => WireOp {
                path: String::new(),
                kind: OP_APPEND_NOTE.to_string(),
                value: Value::String(text.clone()),
                ts: *ts,
            },
            Operation::Unrecognized {
                kind,
                path,
                value,
                ts,
            } => WireOp {
                path: path.clone(),
                kind: kind.clone(),
                value: value.clone(),
                ts: *ts,
            },
        }
    }
}

pub fn ops_to_wire(ops: &[Operation]) -> Vec<WireOp> {
    ops.iter().map(WireOp::from).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpSubmit {
    #[serde(rename = "baseVersion", default)]
    pub base_version: u64,
    pub ops: Vec<WireOp>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpAck {
    #[serde(rename = "opVersion")]
    pub op_version: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpBroadcast {
    #[serde(rename = "opVersion")]
    pub op_version: u64,
    pub ops: Vec<WireOp>,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(rename = "baseVersion")]
    pub base_version: u64,
    pub state: BTreeMap<String, Value>,
    pub notes: Vec<Note>,
}

impl From<ClientSnapshot> for SnapshotResponse {
    fn from(snapshot: ClientSnapshot) -> Self {
        Self {
            base_version: snapshot.version,
            state: snapshot.state,
            notes: snapshot.notes,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Active,
    Idle,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::Active => "active",
            PresenceStatus::Idle => "idle",
            PresenceStatus::Offline => "offline",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(default)]
    pub cursor: Option<Value>,
    #[serde(default)]
    pub status: PresenceStatus,
    #[serde(default)]
    pub meta: Option<Value>,
}

impl PresenceUpdate {
    pub fn offline() -> Self {
        Self {
            status: PresenceStatus::Offline,
            ..Self::default()
        }
    }

    /// Metadata stored by the presence tracker: `meta` plus cursor and status.
    pub fn tracker_meta(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(meta) = &self.meta {
            map.insert("meta".into(), meta.clone());
        }
        if let Some(cursor) = &self.cursor {
            map.insert("cursor".into(), cursor.clone());
        }
        map.insert("status".into(), Value::String(self.status.as_str().into()));
        Value::Object(map)
    }
}
