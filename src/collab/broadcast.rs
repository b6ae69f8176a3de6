//! Cross-process fan-out of accepted batches.
//!
//! Each room has one logical channel named `{prefix}:{tenant}:{doc}`.
//! `ChannelBroker` is the in-process implementation: subscribers register a
//! channel prefix and receive every message published under it through a
//! bounded queue. Subscribers that fall behind are dropped.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{
    Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Limits, ProcessId, RoomKey, UserId};
use crate::error::Transience;
use crate::protocol::WireOp;

/// Message published on a room channel after a batch is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub tenant: String,
    pub doc_id: String,
    pub user_id: UserId,
    #[serde(rename = "opVersion")]
    pub op_version: u64,
    pub ops: Vec<WireOp>,
    /// Publishing process. Absent on events from publishers that do not tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ProcessId>,
}

impl RoomEvent {
    pub fn new(
        key: &RoomKey,
        user: &UserId,
        op_version: u64,
        ops: Vec<WireOp>,
        origin: ProcessId,
    ) -> Self {
        Self {
            tenant: key.tenant.to_string(),
            doc_id: key.doc.to_string(),
            user_id: user.clone(),
            op_version,
            ops,
            origin: Some(origin),
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BroadcastError {
    #[error("subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("subscriber limits invalid: {reason}")]
    InvalidSubscriberLimits { reason: String },
    #[error("publish failed: {reason}")]
    Unavailable { reason: String },
    #[error("event encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("broker lock poisoned")]
    LockPoisoned,
}

impl BroadcastError {
    pub fn transience(&self) -> Transience {
        match self {
            BroadcastError::Unavailable { .. } => Transience::Retryable,
            _ => Transience::Permanent,
        }
    }
}

/// Sink for room events. Delivery is at-most-once; failures are reported
/// but never retried.
pub trait Publisher: Send + Sync {
    fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BroadcastError>;
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BroadcastError> {
        (**self).publish(channel, payload)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: Bytes,
}

impl BrokerMessage {
    fn byte_len(&self) -> usize {
        self.payload.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerLimits {
    pub max_subscribers: usize,
    pub hot_cache_max_events: usize,
    pub hot_cache_max_bytes: usize,
}

impl BrokerLimits {
    pub fn from_limits(limits: &Limits) -> Self {
        Self {
            max_subscribers: limits.max_broadcast_subscribers,
            hot_cache_max_events: limits.broker_hot_cache_max_events,
            hot_cache_max_bytes: limits.broker_hot_cache_max_bytes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriberLimits {
    pub max_events: usize,
    pub max_bytes: usize,
}

impl SubscriberLimits {
    pub fn new(max_events: usize, max_bytes: usize) -> Result<Self, BroadcastError> {
        if max_events == 0 {
            return Err(BroadcastError::InvalidSubscriberLimits {
                reason: "max_events must be > 0".to_string(),
            });
        }
        if max_bytes == 0 {
            return Err(BroadcastError::InvalidSubscriberLimits {
                reason: "max_bytes must be > 0".to_string(),
            });
        }
        Ok(Self {
            max_events,
            max_bytes,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    SubscriberLagged,
}

pub struct BrokerSubscription {
    receiver: Receiver<BrokerMessage>,
    queued_bytes: Arc<AtomicUsize>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl BrokerSubscription {
    pub fn recv(&self) -> Result<BrokerMessage, RecvError> {
        let message = self.receiver.recv()?;
        self.decrement_bytes(message.byte_len());
        Ok(message)
    }

    pub fn try_recv(&self) -> Result<BrokerMessage, TryRecvError> {
        let message = self.receiver.try_recv()?;
        self.decrement_bytes(message.byte_len());
        Ok(message)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<BrokerMessage, RecvTimeoutError> {
        let message = self.receiver.recv_timeout(timeout)?;
        self.decrement_bytes(message.byte_len());
        Ok(message)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<BrokerMessage> {
        std::iter::from_fn(|| self.try_recv().ok()).collect()
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().ok().and_then(|guard| *guard)
    }

    /// For readiness selection only. Take messages through the subscription
    /// so queued-byte accounting stays correct.
    pub fn receiver(&self) -> &Receiver<BrokerMessage> {
        &self.receiver
    }

    fn decrement_bytes(&self, amount: usize) {
        let prev = self.queued_bytes.fetch_sub(amount, Ordering::AcqRel);
        debug_assert!(prev >= amount, "queued bytes underflow");
    }
}

/// In-process pub/sub broker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChannelBroker {
    inner: Arc<Mutex<BrokerState>>,
    failing: Arc<AtomicBool>,
}

impl ChannelBroker {
    pub fn new(limits: BrokerLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BrokerState::new(limits))),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to every channel starting with `prefix`.
    pub fn subscribe(
        &self,
        prefix: impl Into<String>,
        limits: SubscriberLimits,
    ) -> Result<BrokerSubscription, BroadcastError> {
        let mut state = self.lock_state()?;
        if state.subscribers.len() >= state.limits.max_subscribers {
            return Err(BroadcastError::SubscriberLimitReached {
                max_subscribers: state.limits.max_subscribers,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(limits.max_events);
        let queued_bytes = Arc::new(AtomicUsize::new(0));
        let drop_reason = Arc::new(Mutex::new(None));
        let id = state.next_subscriber_id;
        state.next_subscriber_id = state.next_subscriber_id.saturating_add(1);
        state.subscribers.insert(
            id,
            SubscriberState {
                prefix: prefix.into(),
                sender,
                max_bytes: limits.max_bytes,
                queued_bytes: Arc::clone(&queued_bytes),
                drop_reason: Arc::clone(&drop_reason),
            },
        );

        Ok(BrokerSubscription {
            receiver,
            queued_bytes,
            drop_reason,
        })
    }

    /// While set, `publish` fails with `BroadcastError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Recently published messages, oldest first.
    pub fn hot_cache(&self) -> Result<Vec<BrokerMessage>, BroadcastError> {
        let state = self.lock_state()?;
        Ok(state.hot_cache.iter().cloned().collect())
    }

    pub fn subscriber_count(&self) -> Result<usize, BroadcastError> {
        let state = self.lock_state()?;
        Ok(state.subscribers.len())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, BrokerState>, BroadcastError> {
        self.inner.lock().map_err(|_| BroadcastError::LockPoisoned)
    }
}

impl Publisher for ChannelBroker {
    fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BroadcastError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BroadcastError::Unavailable {
                reason: "failure injected".to_string(),
            });
        }
        let message = BrokerMessage {
            channel: channel.to_string(),
            payload,
        };
        let mut state = self.lock_state()?;
        state.push_hot_cache(message.clone());

        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            if !message.channel.starts_with(&subscriber.prefix) {
                continue;
            }
            let queued = subscriber.queued_bytes.load(Ordering::Acquire);
            if queued.saturating_add(message.byte_len()) > subscriber.max_bytes {
                subscriber.set_drop_reason(DropReason::SubscriberLagged);
                dropped.push(*id);
                continue;
            }

            match subscriber.sender.try_send(message.clone()) {
                Ok(()) => {
                    subscriber
                        .queued_bytes
                        .fetch_add(message.byte_len(), Ordering::AcqRel);
                }
                Err(TrySendError::Full(_)) => {
                    subscriber.set_drop_reason(DropReason::SubscriberLagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            tracing::warn!(subscriber = id, channel, "dropping broker subscriber");
            state.subscribers.remove(&id);
        }

        Ok(())
    }
}

struct BrokerState {
    limits: BrokerLimits,
    hot_cache: VecDeque<BrokerMessage>,
    hot_cache_bytes: usize,
    next_subscriber_id: u64,
    subscribers: BTreeMap<u64, SubscriberState>,
}

impl BrokerState {
    fn new(limits: BrokerLimits) -> Self {
        Self {
            limits,
            hot_cache: VecDeque::new(),
            hot_cache_bytes: 0,
            next_subscriber_id: 1,
            subscribers: BTreeMap::new(),
        }
    }

    fn push_hot_cache(&mut self, message: BrokerMessage) {
        self.hot_cache_bytes = self.hot_cache_bytes.saturating_add(message.byte_len());
        self.hot_cache.push_back(message);

        while self.hot_cache.len() > self.limits.hot_cache_max_events
            || self.hot_cache_bytes > self.limits.hot_cache_max_bytes
        {
            match self.hot_cache.pop_front() {
                Some(evicted) => {
                    self.hot_cache_bytes = self.hot_cache_bytes.saturating_sub(evicted.byte_len());
                }
                None => break,
            }
        }
    }
}

struct SubscriberState {
    prefix: String,
    sender: Sender<BrokerMessage>,
    max_bytes: usize,
    queued_bytes: Arc<AtomicUsize>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl SubscriberState {
    fn set_drop_reason(&self, reason: DropReason) {
        if let Ok(mut guard) = self.drop_reason.lock()
            && guard.is_none()
        {
            *guard = Some(reason);
        }
    }
}
