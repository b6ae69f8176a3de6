//! Layer 9: Room state and the LWW batch merge.
//!
//! One `RoomState` per (tenant, doc) per process. All mutation goes through
//! [`RoomState::apply`] / [`RoomState::apply_remote`]; the merge is a pure
//! function of each write's `(ts, writer)` so replicas converge regardless
//! of delivery order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::composite::{Note, NoteLog};
use super::crdt::{Lww, LwwEntry};
use super::identity::UserId;
use super::ring::RingBuffer;
use super::snapshot::{ClientSnapshot, Snapshot, SnapshotEntry};
use super::time::{Stamp, WallClock};

/// A validated document operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Propose that `path` takes `value` as of `ts`.
    Set { path: String, value: Value, ts: u64 },
    /// Unconditionally append a note.
    AppendNote { text: String, ts: u64 },
    /// Well-formed op of a kind this server does not know. Dropped by the
    /// merge with a warning; kept so the batch is relayed as submitted.
    Unrecognized {
        kind: String,
        path: String,
        value: Value,
        ts: u64,
    },
}

impl Operation {
    pub fn ts(&self) -> u64 {
        match self {
            Operation::Set { ts, .. }
            | Operation::AppendNote { ts, .. }
            | Operation::Unrecognized { ts, .. } => *ts,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Operation::Set { .. } => "set",
            Operation::AppendNote { .. } => "append_note",
            Operation::Unrecognized { kind, .. } => kind,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOrigin {
    Local,
    Remote,
}

/// Entry in the diagnostic operation log.
#[derive(Clone, Debug)]
pub struct AppliedBatch {
    pub version: u64,
    pub writer: UserId,
    pub ops: Vec<Operation>,
    pub received_at: WallClock,
    pub origin: BatchOrigin,
}

/// What one batch did, for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub version: u64,
    pub sets_won: usize,
    pub sets_lost: usize,
    pub notes_appended: usize,
    pub ignored: usize,
}

/// Authoritative in-memory state for one room.
#[derive(Clone, Debug)]
pub struct RoomState {
    version: u64,
    entries: BTreeMap<String, LwwEntry>,
    notes: NoteLog,
    op_log: RingBuffer<AppliedBatch>,
    members: BTreeSet<UserId>,
    ops_since_snapshot: u64,
}

impl RoomState {
    pub fn new(op_log_capacity: usize) -> Self {
        Self {
            version: 0,
            entries: BTreeMap::new(),
            notes: NoteLog::new(),
            op_log: RingBuffer::with_capacity(op_log_capacity),
            members: BTreeSet::new(),
            ops_since_snapshot: 0,
        }
    }

    /// Hydrate from a persisted snapshot, provenance included.
    pub fn from_snapshot(snapshot: Snapshot, op_log_capacity: usize) -> Self {
        let mut state = Self::new(op_log_capacity);
        state.version = snapshot.base_version;
        state.entries = snapshot
            .lww_state
            .into_iter()
            .map(|(path, entry)| (path, LwwEntry::from(entry)))
            .collect();
        state.notes = NoteLog::from(snapshot.notes);
        state
    }

    /// Durable form: everything except members and the op log.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            base_version: self.version,
            lww_state: self
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), SnapshotEntry::from(entry)))
                .collect(),
            notes: self.notes.as_slice().to_vec(),
        }
    }

    pub fn client_view(&self) -> ClientSnapshot {
        ClientSnapshot {
            version: self.version,
            state: self
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.value.clone()))
                .collect(),
            notes: self.notes.as_slice().to_vec(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &BTreeMap<String, LwwEntry> {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&LwwEntry> {
        self.entries.get(path)
    }

    pub fn value(&self, path: &str) -> Option<&Value> {
        self.entries.get(path).map(|entry| &entry.value)
    }

    pub fn notes(&self) -> &NoteLog {
        &self.notes
    }

    pub fn op_log(&self) -> &RingBuffer<AppliedBatch> {
        &self.op_log
    }

    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn ops_since_snapshot(&self) -> u64 {
        self.ops_since_snapshot
    }

    /// Returns true if the user was not already a member.
    pub fn add_member(&mut self, user: UserId) -> bool {
        self.members.insert(user)
    }

    /// Returns true if the user was a member.
    pub fn remove_member(&mut self, user: &UserId) -> bool {
        self.members.remove(user)
    }

    pub fn mark_snapshotted(&mut self) {
        self.ops_since_snapshot = 0;
    }

    /// Merge a locally submitted batch. Returns the new version.
    pub fn apply(&mut self, writer: &UserId, ops: &[Operation], now: WallClock) -> u64 {
        self.apply_detailed(writer, ops, now).version
    }

    /// Merge a locally submitted batch, reporting per-op results.
    ///
    /// The version advances by exactly one for the whole batch.
    pub fn apply_detailed(
        &mut self,
        writer: &UserId,
        ops: &[Operation],
        now: WallClock,
    ) -> ApplyOutcome {
        let mut outcome = self.merge_ops(writer, ops);
        self.version += 1;
        outcome.version = self.version;
        self.finish_batch(writer, ops, now, BatchOrigin::Local);
        outcome
    }

    /// Merge a batch that another process accepted and published.
    ///
    /// Same merge as [`apply`](Self::apply). The version never falls behind
    /// the originating process's counter.
    pub fn apply_remote(
        &mut self,
        writer: &UserId,
        ops: &[Operation],
        remote_version: u64,
        now: WallClock,
    ) -> ApplyOutcome {
        let mut outcome = self.merge_ops(writer, ops);
        self.version = (self.version + 1).max(remote_version);
        outcome.version = self.version;
        self.finish_batch(writer, ops, now, BatchOrigin::Remote);
        outcome
    }

    fn merge_ops(&mut self, writer: &UserId, ops: &[Operation]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for op in ops {
            match op {
                Operation::Set { path, value, ts } => {
                    let proposed = Lww::new(value.clone(), Stamp::new(*ts, writer.clone()));
                    if self.merge_set(path, proposed) {
                        outcome.sets_won += 1;
                    } else {
                        outcome.sets_lost += 1;
                    }
                }
                Operation::AppendNote { text, ts } => {
                    self.notes
                        .append(Note::new(*ts, writer.clone(), text.clone()));
                    outcome.notes_appended += 1;
                }
                Operation::Unrecognized { kind, path, .. } => {
                    tracing::warn!(
                        kind = %kind,
                        path = %path,
                        writer = %writer,
                        "ignoring operation of unrecognized kind"
                    );
                    outcome.ignored += 1;
                }
            }
        }
        outcome
    }

    /// LWW register write. Returns whether the proposed write won.
    fn merge_set(&mut self, path: &str, proposed: LwwEntry) -> bool {
        match self.entries.get_mut(path) {
            None => {
                self.entries.insert(path.to_string(), proposed);
                true
            }
            Some(stored) if proposed.wins_over(stored) => {
                *stored = proposed;
                true
            }
            Some(_) => false,
        }
    }

    fn finish_batch(
        &mut self,
        writer: &UserId,
        ops: &[Operation],
        now: WallClock,
        origin: BatchOrigin,
    ) {
        self.op_log.push(AppliedBatch {
            version: self.version,
            writer: writer.clone(),
            ops: ops.to_vec(),
            received_at: now,
            origin,
        });
        self.ops_since_snapshot += 1;
    }
}
