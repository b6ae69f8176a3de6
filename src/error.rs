use thiserror::Error;

use crate::collab::{BroadcastError, CollabError, StoreError};
use crate::config::ConfigError;
use crate::core::CoreError;
use crate::protocol::ProtocolError;

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (locally or remotely).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the per-module errors; callers that care about the
/// cause match on the inner type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(e) => e.transience(),
            Error::Protocol(e) => e.transience(),
            Error::Store(e) => e.transience(),
            Error::Broadcast(e) => e.transience(),
            Error::Collab(e) => e.transience(),
            Error::Config(_) => Transience::Permanent,
        }
    }

    /// Only store writes can leave their outcome in doubt.
    pub fn effect(&self) -> Effect {
        match self {
            Error::Store(e) | Error::Collab(CollabError::Store(e)) => e.effect(),
            _ => Effect::None,
        }
    }
}
