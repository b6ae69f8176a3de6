//! Layer 3: CRDT Traits and Primitives
//!
//! The merge primitive for whole-value document paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::time::Stamp;

/// A Conflict-Free Replicated Data Type.
///
/// Properties:
/// - Commutative: join(a, b) == join(b, a)
/// - Associative: join(join(a, b), c) == join(a, join(b, c))
/// - Idempotent: join(a, a) == a
pub trait Crdt: Sized {
    /// Merge two states into a new state that includes information from both.
    fn join(&self, other: &Self) -> Self;
}

/// Last-Writer-Wins register.
///
/// Higher stamp wins; deterministic (stamp includes the writer for tiebreak).
/// The value is always stored together with the stamp that won it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lww<T> {
    pub value: T,
    pub stamp: Stamp,
}

/// One document path's current value plus its provenance.
pub type LwwEntry = Lww<Value>;

impl<T> Lww<T> {
    pub fn new(value: T, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Whether this (proposed) write replaces `stored`.
    ///
    /// Strictly greater only: replaying the exact same stamp is a no-op.
    pub fn wins_over(&self, stored: &Lww<T>) -> bool {
        self.stamp > stored.stamp
    }
}

impl<T: Clone> Crdt for Lww<T> {
    fn join(&self, other: &Self) -> Self {
        if self.stamp >= other.stamp {
            self.clone()
        } else {
            other.clone()
        }
    }
}

impl<T: PartialEq> PartialEq for Lww<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.stamp == other.stamp
    }
}

impl<T: Eq> Eq for Lww<T> {}
