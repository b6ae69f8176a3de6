//! Advisory "who's online" tracking.
//!
//! Entries expire purely by wall-clock time since the last touch. Nothing
//! here affects document state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::core::{RoomKey, TenantId, UserId, WallClock};

#[derive(Clone, Debug, PartialEq)]
pub struct PresenceEntry {
    pub tenant: TenantId,
    pub last_seen: WallClock,
    pub meta: Value,
}

#[derive(Debug)]
pub struct PresenceTracker {
    ttl: Duration,
    rooms: Mutex<HashMap<RoomKey, HashMap<UserId, PresenceEntry>>>,
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn touch(&self, room: &RoomKey, user: &UserId, tenant: &TenantId, meta: Value) {
        self.touch_at(room, user, tenant, meta, WallClock::now());
    }

    /// Upsert the entry and refresh `last_seen`.
    pub fn touch_at(
        &self,
        room: &RoomKey,
        user: &UserId,
        tenant: &TenantId,
        meta: Value,
        now: WallClock,
    ) {
        let mut rooms = self.lock();
        rooms.entry(room.clone()).or_default().insert(
            user.clone(),
            PresenceEntry {
                tenant: tenant.clone(),
                last_seen: now,
                meta,
            },
        );
    }

    /// Refresh `last_seen`, keeping any stored meta. `meta` is only used when
    /// the user has no entry yet.
    pub fn refresh(&self, room: &RoomKey, user: &UserId, tenant: &TenantId, meta: Value) {
        self.refresh_at(room, user, tenant, meta, WallClock::now());
    }

    pub fn refresh_at(
        &self,
        room: &RoomKey,
        user: &UserId,
        tenant: &TenantId,
        meta: Value,
        now: WallClock,
    ) {
        let mut rooms = self.lock();
        rooms
            .entry(room.clone())
            .or_default()
            .entry(user.clone())
            .and_modify(|entry| entry.last_seen = now)
            .or_insert_with(|| PresenceEntry {
                tenant: tenant.clone(),
                last_seen: now,
                meta,
            });
    }

    /// Remove immediately, regardless of TTL. Returns whether an entry existed.
    pub fn leave(&self, room: &RoomKey, user: &UserId) -> bool {
        let mut rooms = self.lock();
        let Some(users) = rooms.get_mut(room) else {
            return false;
        };
        let removed = users.remove(user).is_some();
        if users.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Unexpired entries for `room`, ordered by user id.
    pub fn active(&self, room: &RoomKey, now: WallClock) -> Vec<(UserId, PresenceEntry)> {
        let rooms = self.lock();
        let mut active: Vec<_> = rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(user, entry)| (user.clone(), entry.clone()))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    /// Purge expired entries and empty rooms. Returns how many entries went.
    pub fn sweep(&self, now: WallClock) -> usize {
        let mut rooms = self.lock();
        let mut removed = 0;
        rooms.retain(|_, users| {
            let before = users.len();
            users.retain(|_, entry| !self.is_expired(entry, now));
            removed += before - users.len();
            !users.is_empty()
        });
        removed
    }

    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    fn is_expired(&self, entry: &PresenceEntry, now: WallClock) -> bool {
        u128::from(now.millis_since(entry.last_seen)) > self.ttl.as_millis()
    }

    // Advisory state: recover from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<RoomKey, HashMap<UserId, PresenceEntry>>> {
        self.rooms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
