#![forbid(unsafe_code)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod collab;
pub mod config;
pub mod core;
pub mod error;
pub mod paths;
pub mod protocol;
pub mod telemetry;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types most callers touch at crate root
pub use crate::collab::{Dispatcher, Outbound, RoomManager};
pub use crate::core::{
    DocId, ErrorCode, ErrorPayload, Limits, Lww, Note, NoteLog, Operation, RoomKey, RoomState,
    Snapshot, Stamp, TenantId, UserId, WallClock,
};
pub use crate::protocol::{Envelope, MessageType};
