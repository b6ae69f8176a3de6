//! Core domain types for collaborative rooms (Layers 0-9)
//!
//! Module hierarchy follows type dependency order:
//! - time: WallClock, Stamp (Layer 0)
//! - identity: TenantId, DocId, UserId, RoomKey, ProcessId (Layer 1)
//! - crdt: Lww<T> (Layer 3)
//! - ring: RingBuffer (Layer 4)
//! - composite: Note, NoteLog (Layer 5)
//! - snapshot: Snapshot, ClientSnapshot (Layer 8)
//! - room: Operation, RoomState (Layer 9)

pub mod composite;
pub mod crdt;
pub mod error;
pub mod identity;
pub mod limits;
pub mod ring;
pub mod room;
pub mod snapshot;
pub mod time;

pub use composite::{Note, NoteLog};
pub use crdt::{Crdt, Lww, LwwEntry};
pub use error::{CoreError, ErrorCode, ErrorPayload, InvalidId, SnapshotCorrupt};
pub use identity::{DocId, MAX_ID_BYTES, ProcessId, RoomKey, TenantId, UserId};
pub use limits::{Limits, LimitsOverride};
pub use ring::RingBuffer;
pub use room::{AppliedBatch, ApplyOutcome, BatchOrigin, Operation, RoomState};
pub use snapshot::{ClientSnapshot, Snapshot, SnapshotEntry};
pub use time::{Stamp, WallClock};
