//! Room manager: owns every room of this process.
//!
//! All document mutation happens here, under the room's mutex. A batch is
//! merged, then (maybe) snapshotted, then published, all before the lock is
//! released, so the published `opVersion` order matches the merge order.
//! Store and publish failures degrade durability and fan-out but never fail
//! the submission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::{Value, json};
use thiserror::Error;

use super::admission::{AdmissionController, AdmissionRejection};
use super::broadcast::{BroadcastError, Publisher, RoomEvent};
use super::presence::PresenceTracker;
use super::store::{SnapshotStore, StoreError};
use crate::config::CollabConfig;
use crate::core::{
    ClientSnapshot, ErrorCode, ErrorPayload, Limits, Operation, ProcessId, RoomKey, RoomState,
    Snapshot, UserId, WallClock,
};
use crate::error::Transience;
use crate::protocol::{
    PresenceStatus, PresenceUpdate, ProtocolError, WireOp, ops_to_wire, validate_ops,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollabError {
    #[error(transparent)]
    Rejected(#[from] AdmissionRejection),
    #[error("invalid room event: {0}")]
    InvalidEvent(#[from] ProtocolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error("snapshot encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("room {key} lock poisoned")]
    RoomPoisoned { key: RoomKey },
    #[error("room registry lock poisoned")]
    RegistryPoisoned,
}

impl CollabError {
    pub fn transience(&self) -> Transience {
        match self {
            CollabError::Rejected(AdmissionRejection::RateLimited { .. }) => Transience::Retryable,
            CollabError::Rejected(_) | CollabError::InvalidEvent(_) | CollabError::Encode(_) => {
                Transience::Permanent
            }
            CollabError::Store(e) => e.transience(),
            CollabError::Broadcast(e) => e.transience(),
            CollabError::RoomPoisoned { .. } | CollabError::RegistryPoisoned => {
                Transience::Permanent
            }
        }
    }

    /// Client-facing form. Infrastructure detail is not exposed.
    pub fn to_error_payload(&self) -> ErrorPayload {
        match self {
            CollabError::Rejected(rejection) => rejection.to_error_payload(),
            CollabError::InvalidEvent(err) => err.to_error_payload(),
            _ => ErrorPayload::new(ErrorCode::Internal, "internal error"),
        }
    }
}

/// One room: its key and its state behind the per-room mutex.
#[derive(Debug)]
pub struct Room {
    key: RoomKey,
    state: Mutex<RoomState>,
}

impl Room {
    fn new(key: RoomKey, state: RoomState) -> Self {
        Self {
            key,
            state: Mutex::new(state),
        }
    }

    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, RoomState>, CollabError> {
        self.state.lock().map_err(|_| CollabError::RoomPoisoned {
            key: self.key.clone(),
        })
    }

    pub fn version(&self) -> Result<u64, CollabError> {
        Ok(self.lock()?.version())
    }
}

/// Outcome of [`RoomManager::ingest`].
#[derive(Clone, Debug, PartialEq)]
pub struct IngestedBatch {
    pub key: RoomKey,
    pub user: UserId,
    pub version: u64,
    pub ops: Vec<Operation>,
    /// False for this process's own events, which were merged at submit time.
    pub applied: bool,
}

pub struct RoomManager {
    config: CollabConfig,
    limits: Limits,
    store: Arc<dyn SnapshotStore>,
    publisher: Arc<dyn Publisher>,
    presence: Arc<PresenceTracker>,
    admission: AdmissionController,
    process_id: ProcessId,
    rooms: RwLock<HashMap<RoomKey, Arc<Room>>>,
}

impl RoomManager {
    pub fn new(
        config: CollabConfig,
        limits: Limits,
        store: Arc<dyn SnapshotStore>,
        publisher: Arc<dyn Publisher>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self::with_process_id(
            config,
            limits,
            store,
            publisher,
            presence,
            ProcessId::generate(),
        )
    }

    pub fn with_process_id(
        config: CollabConfig,
        limits: Limits,
        store: Arc<dyn SnapshotStore>,
        publisher: Arc<dyn Publisher>,
        presence: Arc<PresenceTracker>,
        process_id: ProcessId,
    ) -> Self {
        let admission = AdmissionController::new(&config);
        Self {
            config,
            limits,
            store,
            publisher,
            presence,
            admission,
            process_id,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn channel_for(&self, key: &RoomKey) -> String {
        key.channel(&self.config.channel_prefix)
    }

    /// The single authoritative room for `key`, hydrated from the store on
    /// first access.
    pub fn get_or_create(&self, key: &RoomKey) -> Result<Arc<Room>, CollabError> {
        if let Some(room) = self.lookup(key)? {
            return Ok(room);
        }

        // Store I/O happens outside the registry lock; a racing creator may
        // win, in which case its room is kept and ours is discarded.
        let state = match self.load_snapshot(key) {
            Some(snapshot) => {
                tracing::debug!(
                    tenant = %key.tenant,
                    doc_id = %key.doc,
                    version = snapshot.base_version,
                    "hydrated room from snapshot"
                );
                RoomState::from_snapshot(snapshot, self.limits.op_log_capacity)
            }
            None => RoomState::new(self.limits.op_log_capacity),
        };

        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| CollabError::RegistryPoisoned)?;
        let room = rooms
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Room::new(key.clone(), state)));
        Ok(Arc::clone(room))
    }

    fn lookup(&self, key: &RoomKey) -> Result<Option<Arc<Room>>, CollabError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| CollabError::RegistryPoisoned)?;
        Ok(rooms.get(key).cloned())
    }

    /// Add `user` to the room. Idempotent for existing members.
    pub fn join(&self, key: &RoomKey, user: &UserId) -> Result<Arc<Room>, CollabError> {
        self.admission.check_tenant(&key.tenant)?;
        let room = self.get_or_create(key)?;
        let (newly_joined, members) = {
            let mut state = room.lock()?;
            self.admission
                .check_join(state.is_member(user), state.members().len())?;
            let added = state.add_member(user.clone());
            (added, state.members().len())
        };
        self.presence
            .refresh(key, user, &key.tenant, json!({"status": "active"}));
        tracing::info!(
            tenant = %key.tenant,
            doc_id = %key.doc,
            user_id = %user,
            members,
            rejoin = !newly_joined,
            "user joined room"
        );
        Ok(room)
    }

    /// Remove `user` from the room. Absent users are a no-op.
    pub fn leave(&self, key: &RoomKey, user: &UserId) -> Result<bool, CollabError> {
        self.presence.leave(key, user);
        let Some(room) = self.lookup(key)? else {
            return Ok(false);
        };
        let (removed, empty) = {
            let mut state = room.lock()?;
            let removed = state.remove_member(user);
            (removed, state.members().is_empty())
        };
        if empty {
            self.admission.forget_room(key);
        }
        if removed {
            tracing::info!(
                tenant = %key.tenant,
                doc_id = %key.doc,
                user_id = %user,
                "user left room"
            );
        }
        Ok(removed)
    }

    /// Merge a client batch. Returns the room version after the batch.
    ///
    /// `claimed_base_version` is advisory: LWW resolves conflicts whatever
    /// the client had seen.
    pub fn apply_operations(
        &self,
        key: &RoomKey,
        user: &UserId,
        claimed_base_version: u64,
        ops: Vec<Operation>,
    ) -> Result<u64, CollabError> {
        let now = WallClock::now();
        self.admission.check_tenant(&key.tenant)?;
        self.admission.check_rate(key, ops.len(), now)?;
        let room = self.get_or_create(key)?;

        let mut state = room.lock()?;
        if claimed_base_version < state.version() {
            tracing::debug!(
                tenant = %key.tenant,
                doc_id = %key.doc,
                user_id = %user,
                claimed_base_version,
                version = state.version(),
                "batch built on stale base version"
            );
        }
        let outcome = state.apply_detailed(user, &ops, now);
        tracing::debug!(
            tenant = %key.tenant,
            doc_id = %key.doc,
            user_id = %user,
            version = outcome.version,
            sets_won = outcome.sets_won,
            sets_lost = outcome.sets_lost,
            notes = outcome.notes_appended,
            ignored = outcome.ignored,
            "applied batch"
        );
        self.maybe_snapshot(key, &mut state);
        self.publish(key, user, outcome.version, ops_to_wire(&ops));
        Ok(outcome.version)
    }

    /// Merge a batch published by another process.
    ///
    /// Events this process published itself are already merged; they come
    /// back unapplied so the caller can still fan them out locally.
    pub fn ingest(&self, event: RoomEvent) -> Result<IngestedBatch, CollabError> {
        let key = RoomKey::parse(&event.tenant, &event.doc_id).map_err(ProtocolError::from)?;
        let ops = validate_ops(event.ops, &self.limits)?;

        if event.origin == Some(self.process_id) {
            return Ok(IngestedBatch {
                key,
                user: event.user_id,
                version: event.op_version,
                ops,
                applied: false,
            });
        }

        let room = self.get_or_create(&key)?;
        let mut state = room.lock()?;
        let outcome = state.apply_remote(&event.user_id, &ops, event.op_version, WallClock::now());
        tracing::debug!(
            tenant = %key.tenant,
            doc_id = %key.doc,
            user_id = %event.user_id,
            remote_version = event.op_version,
            version = outcome.version,
            "ingested remote batch"
        );
        self.maybe_snapshot(&key, &mut state);
        drop(state);

        Ok(IngestedBatch {
            key,
            user: event.user_id,
            version: outcome.version,
            ops,
            applied: true,
        })
    }

    pub fn current_snapshot(&self, key: &RoomKey) -> Result<ClientSnapshot, CollabError> {
        self.admission.check_tenant(&key.tenant)?;
        let room = self.get_or_create(key)?;
        let state = room.lock()?;
        Ok(state.client_view())
    }

    /// Record a client presence update. `offline` drops the entry.
    pub fn update_presence(
        &self,
        key: &RoomKey,
        user: &UserId,
        update: &PresenceUpdate,
    ) -> Result<(), CollabError> {
        self.admission.check_tenant(&key.tenant)?;
        if update.status == PresenceStatus::Offline {
            self.presence.leave(key, user);
        } else {
            self.presence
                .touch(key, user, &key.tenant, update.tracker_meta());
        }
        Ok(())
    }

    /// Persisted snapshot for `key`. Unreadable or corrupt data counts as
    /// absent.
    pub fn load_snapshot(&self, key: &RoomKey) -> Option<Snapshot> {
        let storage_key = key.storage_key(&self.config.snapshot_key_prefix);
        let bytes = match self.store.load(&storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(
                    tenant = %key.tenant,
                    doc_id = %key.doc,
                    error = %err,
                    "snapshot load failed, starting empty"
                );
                return None;
            }
        };
        match Snapshot::decode(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(
                    tenant = %key.tenant,
                    doc_id = %key.doc,
                    error = %err,
                    "ignoring corrupt snapshot"
                );
                None
            }
        }
    }

    pub fn save_snapshot(&self, key: &RoomKey, state: &RoomState) -> Result<(), CollabError> {
        let bytes = state.to_snapshot().encode()?;
        let storage_key = key.storage_key(&self.config.snapshot_key_prefix);
        self.store.save(&storage_key, &bytes)?;
        Ok(())
    }

    /// Snapshot when the cadence is due. The counter only resets on success,
    /// so a failed save is retried after the next batch.
    fn maybe_snapshot(&self, key: &RoomKey, state: &mut RoomState) {
        let interval = self.config.snapshot_interval;
        if interval == 0 || state.ops_since_snapshot() < interval {
            return;
        }
        match self.save_snapshot(key, state) {
            Ok(()) => {
                state.mark_snapshotted();
                tracing::debug!(
                    tenant = %key.tenant,
                    doc_id = %key.doc,
                    version = state.version(),
                    "saved snapshot"
                );
            }
            Err(err) => tracing::warn!(
                tenant = %key.tenant,
                doc_id = %key.doc,
                version = state.version(),
                pending = state.ops_since_snapshot(),
                error = %err,
                "snapshot save failed"
            ),
        }
    }

    fn publish(&self, key: &RoomKey, user: &UserId, version: u64, ops: Vec<WireOp>) {
        let channel = self.channel_for(key);
        let result = RoomEvent::new(key, user, version, ops, self.process_id)
            .encode()
            .map_err(BroadcastError::from)
            .and_then(|payload| self.publisher.publish(&channel, payload));
        if let Err(err) = result {
            tracing::warn!(
                tenant = %key.tenant,
                doc_id = %key.doc,
                version,
                channel = %channel,
                error = %err,
                "publish failed, other processes will miss this batch"
            );
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }

    /// Keys of all rooms held by this process, sorted.
    pub fn rooms(&self) -> Vec<RoomKey> {
        let mut keys: Vec<RoomKey> = self
            .rooms
            .read()
            .map(|rooms| rooms.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Presence entries of the room as a JSON list, for diagnostics.
    pub fn presence_view(&self, key: &RoomKey) -> Value {
        let active = self.presence.active(key, WallClock::now());
        Value::Array(
            active
                .into_iter()
                .map(|(user, entry)| {
                    json!({
                        "user_id": user,
                        "last_seen": entry.last_seen,
                        "meta": entry.meta,
                    })
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::broadcast::{BrokerLimits, ChannelBroker, SubscriberLimits};
    use crate::collab::store::MemorySnapshotStore;
    use std::time::Duration;

    struct Harness {
        store: Arc<MemorySnapshotStore>,
        broker: ChannelBroker,
        manager: RoomManager,
    }

    fn harness(edit: impl FnOnce(&mut CollabConfig)) -> Harness {
        let mut config = CollabConfig::default();
        edit(&mut config);
        let limits = Limits::default();
        let store = Arc::new(MemorySnapshotStore::new());
        let broker = ChannelBroker::new(BrokerLimits::from_limits(&limits));
        let manager = RoomManager::new(
            config,
            limits,
            store.clone(),
            Arc::new(broker.clone()),
            Arc::new(PresenceTracker::new(Duration::from_secs(60))),
        );
        Harness {
            store,
            broker,
            manager,
        }
    }

    fn key() -> RoomKey {
        RoomKey::parse("t1", "d1").unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn set(path: &str, value: Value, ts: u64) -> Operation {
        Operation::Set {
            path: path.into(),
            value,
            ts,
        }
    }

    #[test]
    fn get_or_create_returns_same_room() {
        let h = harness(|_| {});
        let a = h.manager.get_or_create(&key()).unwrap();
        let b = h.manager.get_or_create(&key()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(h.manager.room_count(), 1);
        assert_eq!(h.manager.rooms(), vec![key()]);
    }

    #[test]
    fn concurrent_first_access_shares_one_room() {
        const WRITERS: u64 = 8;
        let h = harness(|_| {});
        h.store.set_delay(Duration::from_millis(30));

        let rooms: Vec<Arc<Room>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|i| {
                    let manager = &h.manager;
                    scope.spawn(move || {
                        let room = manager.get_or_create(&key()).unwrap();
                        let writer = user(&format!("u{i}"));
                        manager
                            .apply_operations(&key(), &writer, 0, vec![set("p", json!(i), i)])
                            .unwrap();
                        room
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        assert!(rooms.iter().all(|room| Arc::ptr_eq(room, &rooms[0])));
        assert_eq!(h.manager.room_count(), 1);
        assert_eq!(rooms[0].version().unwrap(), WRITERS);
        assert_eq!(
            h.manager.current_snapshot(&key()).unwrap().version,
            WRITERS
        );
    }

    #[test]
    fn unlisted_tenant_cannot_read_or_signal_presence() {
        let h = harness(|c| {
            c.tenant_allowlist_enabled = true;
            c.allowed_tenants = vec!["good".into()];
        });
        let evil = RoomKey::parse("evil", "d1").unwrap();
        let err = h.manager.current_snapshot(&evil).unwrap_err();
        assert_eq!(err.to_error_payload().code, ErrorCode::TenantNotAllowed);

        let err = h
            .manager
            .update_presence(&evil, &user("u1"), &PresenceUpdate::offline())
            .unwrap_err();
        assert_eq!(err.to_error_payload().code, ErrorCode::TenantNotAllowed);
        assert_eq!(h.manager.room_count(), 0);
        assert_eq!(h.manager.presence().room_count(), 0);
    }

    #[test]
    fn rejoin_keeps_presence_meta() {
        let h = harness(|_| {});
        h.manager.join(&key(), &user("u1")).unwrap();
        let update = PresenceUpdate {
            cursor: Some(json!({"cell": "B2"})),
            status: PresenceStatus::Idle,
            meta: None,
        };
        h.manager
            .update_presence(&key(), &user("u1"), &update)
            .unwrap();
        h.manager.join(&key(), &user("u1")).unwrap();

        let view = h.manager.presence_view(&key());
        assert_eq!(view[0]["meta"], update.tracker_meta());
    }

    #[test]
    fn join_is_idempotent_and_tracks_presence() {
        let h = harness(|_| {});
        h.manager.join(&key(), &user("u1")).unwrap();
        let room = h.manager.join(&key(), &user("u1")).unwrap();
        assert_eq!(room.lock().unwrap().members().len(), 1);
        assert_eq!(h.manager.presence_view(&key()).as_array().unwrap().len(), 1);

        assert!(h.manager.leave(&key(), &user("u1")).unwrap());
        assert!(!h.manager.leave(&key(), &user("u1")).unwrap());
        assert!(!h.manager.leave(&RoomKey::parse("t1", "zz").unwrap(), &user("u1")).unwrap());
        assert_eq!(h.manager.presence_view(&key()), json!([]));
    }

    #[test]
    fn join_enforces_admission() {
        let h = harness(|c| {
            c.max_room_members = 1;
            c.tenant_allowlist_enabled = true;
            c.allowed_tenants = vec!["t1".into()];
        });
        h.manager.join(&key(), &user("u1")).unwrap();
        let err = h.manager.join(&key(), &user("u2")).unwrap_err();
        assert_eq!(err.to_error_payload().code, ErrorCode::RoomFull);
        h.manager.join(&key(), &user("u1")).unwrap();

        let other = RoomKey::parse("t2", "d1").unwrap();
        let err = h.manager.join(&other, &user("u1")).unwrap_err();
        assert_eq!(err.to_error_payload().code, ErrorCode::TenantNotAllowed);
        assert_eq!(h.manager.room_count(), 1);
    }

    #[test]
    fn apply_publishes_on_room_channel() {
        let h = harness(|_| {});
        let sub = h
            .broker
            .subscribe("collab:t1:d1", SubscriberLimits::new(16, 1 << 20).unwrap())
            .unwrap();
        let version = h
            .manager
            .apply_operations(&key(), &user("u1"), 0, vec![set("p", json!(1), 10)])
            .unwrap();
        assert_eq!(version, 1);

        let message = sub.try_recv().unwrap();
        assert_eq!(message.channel, "collab:t1:d1");
        let event = RoomEvent::decode(&message.payload).unwrap();
        assert_eq!(event.op_version, 1);
        assert_eq!(event.origin, Some(h.manager.process_id()));
    }

    #[test]
    fn stale_base_version_is_still_applied() {
        let h = harness(|_| {});
        for ts in 1..=3 {
            h.manager
                .apply_operations(&key(), &user("u1"), 0, vec![set("p", json!(ts), ts)])
                .unwrap();
        }
        let version = h
            .manager
            .apply_operations(&key(), &user("u2"), 0, vec![set("q", json!(true), 1)])
            .unwrap();
        assert_eq!(version, 4);
        let view = h.manager.current_snapshot(&key()).unwrap();
        assert_eq!(view.state["q"], json!(true));
    }

    #[test]
    fn failures_downstream_do_not_fail_the_submit() {
        let h = harness(|c| c.snapshot_interval = 1);
        h.store.set_failing(true);
        h.broker.set_failing(true);
        let version = h
            .manager
            .apply_operations(&key(), &user("u1"), 0, vec![set("p", json!(1), 1)])
            .unwrap();
        assert_eq!(version, 1);
        let room = h.manager.get_or_create(&key()).unwrap();
        assert_eq!(room.lock().unwrap().ops_since_snapshot(), 1);

        h.store.set_failing(false);
        h.manager
            .apply_operations(&key(), &user("u1"), 1, vec![set("p", json!(2), 2)])
            .unwrap();
        assert_eq!(room.lock().unwrap().ops_since_snapshot(), 0);
        assert_eq!(h.store.save_count(), 1);
    }

    #[test]
    fn corrupt_snapshot_hydrates_empty() {
        let h = harness(|_| {});
        h.store
            .insert_raw("collab:snapshot:t1:d1", b"{not json".to_vec())
            .unwrap();
        assert!(h.manager.load_snapshot(&key()).is_none());
        let view = h.manager.current_snapshot(&key()).unwrap();
        assert_eq!(view.version, 0);
    }

    #[test]
    fn rate_limit_rejects_without_applying() {
        let h = harness(|c| c.ops_per_minute_limit = 2);
        h.manager
            .apply_operations(
                &key(),
                &user("u1"),
                0,
                vec![set("a", json!(1), 1), set("b", json!(1), 1)],
            )
            .unwrap();
        let err = h
            .manager
            .apply_operations(&key(), &user("u1"), 1, vec![set("c", json!(1), 1)])
            .unwrap_err();
        assert_eq!(err.to_error_payload().code, ErrorCode::RateLimited);
        assert!(err.transience().is_retryable());
        assert_eq!(h.manager.current_snapshot(&key()).unwrap().version, 1);
    }

    #[test]
    fn own_events_are_not_reapplied() {
        let h = harness(|_| {});
        h.manager
            .apply_operations(&key(), &user("u1"), 0, vec![set("p", json!(1), 1)])
            .unwrap();
        let message = h.broker.hot_cache().unwrap().pop().unwrap();
        let batch = h
            .manager
            .ingest(RoomEvent::decode(&message.payload).unwrap())
            .unwrap();
        assert!(!batch.applied);
        assert_eq!(batch.version, 1);
        assert_eq!(h.manager.current_snapshot(&key()).unwrap().version, 1);
    }

    #[test]
    fn remote_events_merge_through_lww() {
        let h = harness(|_| {});
        h.manager
            .apply_operations(&key(), &user("u1"), 0, vec![set("p", json!("local"), 10)])
            .unwrap();
        let remote = RoomEvent {
            tenant: "t1".into(),
            doc_id: "d1".into(),
            user_id: user("u0"),
            op_version: 5,
            ops: vec![WireOp {
                path: "p".into(),
                kind: "set".into(),
                value: json!("remote"),
                ts: 10,
            }],
            origin: Some(ProcessId::generate()),
        };
        let batch = h.manager.ingest(remote).unwrap();
        assert!(batch.applied);
        assert_eq!(batch.version, 5);
        let view = h.manager.current_snapshot(&key()).unwrap();
        assert_eq!(view.state["p"], json!("local"));
        assert_eq!(view.version, 5);
    }

    #[test]
    fn invalid_remote_events_are_rejected() {
        let h = harness(|_| {});
        let event = RoomEvent {
            tenant: "t:1".into(),
            doc_id: "d1".into(),
            user_id: user("u1"),
            op_version: 1,
            ops: Vec::new(),
            origin: None,
        };
        assert!(matches!(
            h.manager.ingest(event),
            Err(CollabError::InvalidEvent(_))
        ));
        assert_eq!(h.manager.room_count(), 0);
    }
}
