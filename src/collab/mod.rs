//! Collaboration services: storage, fan-out, presence, admission, the room
//! manager and envelope dispatch.

pub mod admission;
pub mod broadcast;
pub mod manager;
pub mod presence;
pub mod session;
pub mod store;
pub mod sweeper;

pub use admission::{AdmissionController, AdmissionRejection, RATE_WINDOW_MS};
pub use broadcast::{
    BroadcastError, BrokerLimits, BrokerMessage, BrokerSubscription, ChannelBroker, DropReason,
    Publisher, RoomEvent, SubscriberLimits,
};
pub use manager::{CollabError, IngestedBatch, Room, RoomManager};
pub use presence::{PresenceEntry, PresenceTracker};
pub use session::{Dispatcher, Outbound};
pub use store::{FsSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError, TimeoutStore};
pub use sweeper::PresenceSweeper;
