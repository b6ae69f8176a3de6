//! Wire protocol: envelope, payloads, ingress validation.

mod envelope;
mod error;
mod payload;

pub use envelope::{
    ClientRequest, ENVELOPE_VERSION, Envelope, MessageType, RequestContext, validate_ops,
};
pub use error::ProtocolError;
pub use payload::{
    OP_APPEND_NOTE, OP_SET, OpAck, OpBroadcast, OpSubmit, PresenceStatus, PresenceUpdate,
    SnapshotResponse, WireOp, ops_to_wire,
};
