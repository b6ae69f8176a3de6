//! Durable key/value storage for room snapshots.
//!
//! The store is shared across processes and tenants; keys are namespaced by
//! the configured snapshot prefix plus the room key.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::{Effect, Transience};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("snapshot store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("snapshot store call timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("snapshot store worker stopped")]
    WorkerStopped,
    #[error("snapshot store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Io { .. } | StoreError::Unavailable { .. } | StoreError::Timeout { .. } => {
                Transience::Retryable
            }
            StoreError::WorkerStopped | StoreError::LockPoisoned => Transience::Permanent,
        }
    }

    /// A timed-out save may still land after we gave up on it.
    pub fn effect(&self) -> Effect {
        match self {
            StoreError::Timeout { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).save(key, bytes)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store. Share it between managers via `Arc` to stand in for
/// an external store in tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    fn before_call(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "failure injected".to_string(),
            });
        }
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.before_call()?;
        let records = self.records.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.before_call()?;
        self.insert_raw(key, bytes.to_vec())?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Filesystem
// =============================================================================

/// One JSON file per key, named by the hex SHA-256 of the key.
#[derive(Clone, Debug)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(temp.path(), bytes).map_err(|source| StoreError::Io {
            path: temp.path().to_path_buf(),
            source,
        })?;
        temp.persist(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

// =============================================================================
// Timeout wrapper
// =============================================================================

enum StoreCommand {
    Load {
        key: String,
        reply: Sender<Result<Option<Vec<u8>>, StoreError>>,
    },
    Save {
        key: String,
        bytes: Vec<u8>,
        reply: Sender<Result<(), StoreError>>,
    },
}

/// Runs every call of the inner store on a worker thread and gives up on
/// it after `timeout`. The worker exits when the wrapper is dropped.
pub struct TimeoutStore {
    tx: Sender<StoreCommand>,
    timeout: Duration,
}

impl TimeoutStore {
    pub fn new<S: SnapshotStore + 'static>(inner: S, timeout: Duration) -> Self {
        let (tx, rx) = crossbeam::channel::unbounded();
        thread::Builder::new()
            .name("valor-snapshot-store".to_string())
            .spawn(move || run_store_loop(inner, rx))
            .expect("spawn snapshot store worker");
        Self { tx, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn call<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, StoreError>>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply_tx, reply_rx) = crossbeam::channel::bounded(1);
        self.tx
            .send(make(reply_tx))
            .map_err(|_| StoreError::WorkerStopped)?;
        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::Timeout {
                timeout: self.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(StoreError::WorkerStopped),
        }
    }
}

impl SnapshotStore for TimeoutStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.call(|reply| StoreCommand::Load {
            key: key.to_string(),
            reply,
        })
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.call(|reply| StoreCommand::Save {
            key: key.to_string(),
            bytes: bytes.to_vec(),
            reply,
        })
    }
}

fn run_store_loop<S: SnapshotStore>(store: S, rx: Receiver<StoreCommand>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            StoreCommand::Load { key, reply } => {
                // The caller may have timed out and gone away.
                let _ = reply.send(store.load(&key));
            }
            StoreCommand::Save { key, bytes, reply } => {
                let _ = reply.send(store.save(&key, &bytes));
            }
        }
    }
    tracing::debug!("snapshot store worker exiting");
}
