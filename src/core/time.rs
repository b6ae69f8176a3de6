//! Layer 0: Time primitives
//!
//! Stamp: (client timestamp, writer) - the LWW ordering key.
//! WallClock: server-side wall time for presence TTL and rate windows (not ordering).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::identity::UserId;

/// Wall clock for TTL/rate windows - NOT for LWW ordering.
///
/// Copy is fine here - it's just a measurement, not causality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero when the
    /// clock went backward.
    pub fn millis_since(self, earlier: WallClock) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Stamp = client timestamp + attribution.
///
/// This is what you compare for LWW. The client-supplied `ts` orders writes;
/// `by` breaks ties so every replica picks the same winner regardless of
/// arrival order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub ts: u64,
    pub by: UserId,
}

impl Stamp {
    pub fn new(ts: u64, by: UserId) -> Self {
        Self { ts, by }
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.by.cmp(&other.by)) // deterministic tiebreak
    }
}
