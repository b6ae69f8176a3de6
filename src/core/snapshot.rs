//! Persisted and client-facing snapshot forms.
//!
//! `Snapshot` is the durable record (provenance kept per entry so LWW keeps
//! comparing correctly after a reload). `ClientSnapshot` is the view handed
//! to clients, with provenance stripped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::composite::Note;
use super::crdt::{Lww, LwwEntry};
use super::error::SnapshotCorrupt;
use super::identity::UserId;
use super::time::Stamp;

/// One persisted path entry: `{value, ts, user_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(default)]
    pub value: Value,
    pub ts: u64,
    pub user_id: UserId,
}

impl From<&LwwEntry> for SnapshotEntry {
    fn from(entry: &LwwEntry) -> Self {
        Self {
            value: entry.value.clone(),
            ts: entry.stamp.ts,
            user_id: entry.stamp.by.clone(),
        }
    }
}

impl From<SnapshotEntry> for LwwEntry {
    fn from(entry: SnapshotEntry) -> Self {
        Lww::new(entry.value, Stamp::new(entry.ts, entry.user_id))
    }
}

/// Durable record for one room.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub base_version: u64,
    #[serde(default)]
    pub lww_state: BTreeMap<String, SnapshotEntry>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotCorrupt> {
        serde_json::from_slice(bytes).map_err(|e| SnapshotCorrupt {
            reason: e.to_string(),
        })
    }
}

/// Client-facing document view: current values only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub version: u64,
    pub state: BTreeMap<String, Value>,
    pub notes: Vec<Note>,
}
