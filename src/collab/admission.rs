//! Admission control for joins and submissions.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CollabConfig;
use crate::core::{ErrorCode, ErrorPayload, RoomKey, TenantId, WallClock};

pub const RATE_WINDOW_MS: u64 = 60_000;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdmissionRejection {
    #[error("tenant `{tenant}` is not allowed")]
    TenantNotAllowed { tenant: TenantId },
    #[error("room is full ({max_members} members)")]
    RoomFull { max_members: usize },
    #[error("rate limit of {limit} operations per minute exceeded")]
    RateLimited { limit: u32, retry_after_ms: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitedDetails {
    pub limit: u32,
    pub retry_after_ms: u64,
}

impl AdmissionRejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            AdmissionRejection::TenantNotAllowed { .. } => ErrorCode::TenantNotAllowed,
            AdmissionRejection::RoomFull { .. } => ErrorCode::RoomFull,
            AdmissionRejection::RateLimited { .. } => ErrorCode::RateLimited,
        }
    }

    pub fn to_error_payload(&self) -> ErrorPayload {
        let payload = ErrorPayload::new(self.code(), self.to_string());
        match self {
            AdmissionRejection::RateLimited {
                limit,
                retry_after_ms,
            } => payload.with_details(RateLimitedDetails {
                limit: *limit,
                retry_after_ms: *retry_after_ms,
            }),
            AdmissionRejection::RoomFull { max_members } => {
                payload.with_details(serde_json::json!({"max_members": max_members}))
            }
            AdmissionRejection::TenantNotAllowed { .. } => payload,
        }
    }
}

#[derive(Debug)]
pub struct AdmissionController {
    allowlist: Option<BTreeSet<String>>,
    max_room_members: usize,
    ops_per_minute: u32,
    windows: Mutex<HashMap<RoomKey, RateWindow>>,
}

impl AdmissionController {
    pub fn new(config: &CollabConfig) -> Self {
        let allowlist = config
            .tenant_allowlist_enabled
            .then(|| config.allowed_tenants.iter().cloned().collect());
        Self {
            allowlist,
            max_room_members: config.max_room_members,
            ops_per_minute: config.ops_per_minute_limit,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_tenant(&self, tenant: &TenantId) -> Result<(), AdmissionRejection> {
        match &self.allowlist {
            Some(allowed) if !allowed.contains(tenant.as_str()) => {
                Err(AdmissionRejection::TenantNotAllowed {
                    tenant: tenant.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Re-joins of existing members always pass.
    pub fn check_join(
        &self,
        already_member: bool,
        member_count: usize,
    ) -> Result<(), AdmissionRejection> {
        if already_member || self.max_room_members == 0 || member_count < self.max_room_members {
            return Ok(());
        }
        Err(AdmissionRejection::RoomFull {
            max_members: self.max_room_members,
        })
    }

    /// Charge `op_count` operations against the room's sliding window.
    /// Nothing is charged when the batch is rejected.
    pub fn check_rate(
        &self,
        key: &RoomKey,
        op_count: usize,
        now: WallClock,
    ) -> Result<(), AdmissionRejection> {
        if self.ops_per_minute == 0 {
            return Ok(());
        }
        let limit = u64::from(self.ops_per_minute);
        let mut windows = self.lock();
        let window = windows.entry(key.clone()).or_default();
        window.expire(now);
        let requested = op_count as u64;
        if window.total + requested <= limit {
            window.charge(now, requested);
            return Ok(());
        }
        Err(AdmissionRejection::RateLimited {
            limit: self.ops_per_minute,
            retry_after_ms: window.retry_after(now, requested, limit),
        })
    }

    /// Drop the rate window of a room with no activity left.
    pub fn forget_room(&self, key: &RoomKey) {
        self.lock().remove(key);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomKey, RateWindow>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    batches: VecDeque<(WallClock, u64)>,
    total: u64,
}

impl RateWindow {
    fn expire(&mut self, now: WallClock) {
        while let Some(&(at, count)) = self.batches.front() {
            if now.millis_since(at) < RATE_WINDOW_MS {
                break;
            }
            self.batches.pop_front();
            self.total -= count;
        }
    }

    fn charge(&mut self, now: WallClock, count: u64) {
        self.batches.push_back((now, count));
        self.total += count;
    }

    /// Time until enough of the window ages out to fit `requested`.
    fn retry_after(&self, now: WallClock, requested: u64, limit: u64) -> u64 {
        if requested > limit {
            return RATE_WINDOW_MS;
        }
        let mut remaining = self.total;
        for &(at, count) in &self.batches {
            remaining -= count;
            if remaining + requested <= limit {
                return RATE_WINDOW_MS.saturating_sub(now.millis_since(at));
            }
        }
        RATE_WINDOW_MS
    }
}
