//! Safety limits for ingress validation and per-room memory.

use serde::{Deserialize, Serialize};

/// Values are explicit about their units to avoid confusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_envelope_bytes: usize,
    pub max_ops_per_batch: usize,
    pub max_path_bytes: usize,
    pub max_note_bytes: usize,
    /// Capacity of each room's diagnostic operation log, in batches.
    pub op_log_capacity: usize,
    pub max_broadcast_subscribers: usize,
    pub broker_hot_cache_max_events: usize,
    pub broker_hot_cache_max_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_envelope_bytes: 1024 * 1024,
            max_ops_per_batch: 500,
            max_path_bytes: 512,
            max_note_bytes: 16 * 1024,
            op_log_capacity: 256,
            max_broadcast_subscribers: 64,
            broker_hot_cache_max_events: 1_024,
            broker_hot_cache_max_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Partial override of [`Limits`] for config layers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsOverride {
    pub max_envelope_bytes: Option<usize>,
    pub max_ops_per_batch: Option<usize>,
    pub max_path_bytes: Option<usize>,
    pub max_note_bytes: Option<usize>,
    pub op_log_capacity: Option<usize>,
    pub max_broadcast_subscribers: Option<usize>,
    pub broker_hot_cache_max_events: Option<usize>,
    pub broker_hot_cache_max_bytes: Option<usize>,
}

impl LimitsOverride {
    pub fn apply_to(&self, target: &mut Limits) {
        if let Some(v) = self.max_envelope_bytes {
            target.max_envelope_bytes = v;
        }
        if let Some(v) = self.max_ops_per_batch {
            target.max_ops_per_batch = v;
        }
        if let Some(v) = self.max_path_bytes {
            target.max_path_bytes = v;
        }
        if let Some(v) = self.max_note_bytes {
            target.max_note_bytes = v;
        }
        if let Some(v) = self.op_log_capacity {
            target.op_log_capacity = v;
        }
        if let Some(v) = self.max_broadcast_subscribers {
            target.max_broadcast_subscribers = v;
        }
        if let Some(v) = self.broker_hot_cache_max_events {
            target.broker_hot_cache_max_events = v;
        }
        if let Some(v) = self.broker_hot_cache_max_bytes {
            target.broker_hot_cache_max_bytes = v;
        }
    }
}
