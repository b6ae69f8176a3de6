use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{Limits, LimitsOverride};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub collab: CollabConfig,
    pub limits: Limits,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Room behaviour. Every knob here is externally supplied; nothing about
/// cadence, naming or admission is hardcoded elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Accepted batches between snapshot saves. `0` disables periodic saves.
    pub snapshot_interval: u64,
    pub channel_prefix: String,
    pub snapshot_key_prefix: String,
    pub presence_ttl_ms: u64,
    pub presence_sweep_interval_ms: u64,
    /// `0` means unlimited.
    pub max_room_members: usize,
    pub tenant_allowlist_enabled: bool,
    pub allowed_tenants: Vec<String>,
    /// Operations per minute per room. `0` disables the limit.
    pub ops_per_minute_limit: u32,
    pub store_timeout_ms: u64,
    pub subscriber_queue_events: usize,
    pub subscriber_queue_bytes: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 20,
            channel_prefix: "collab".to_string(),
            snapshot_key_prefix: "collab:snapshot".to_string(),
            presence_ttl_ms: 60_000,
            presence_sweep_interval_ms: 15_000,
            max_room_members: 50,
            tenant_allowlist_enabled: false,
            allowed_tenants: Vec::new(),
            ops_per_minute_limit: 600,
            store_timeout_ms: 2_000,
            subscriber_queue_events: 1_024,
            subscriber_queue_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfigOverride {
    pub snapshot_interval: Option<u64>,
    pub channel_prefix: Option<String>,
    pub snapshot_key_prefix: Option<String>,
    pub presence_ttl_ms: Option<u64>,
    pub presence_sweep_interval_ms: Option<u64>,
    pub max_room_members: Option<usize>,
    pub tenant_allowlist_enabled: Option<bool>,
    pub allowed_tenants: Option<Vec<String>>,
    pub ops_per_minute_limit: Option<u32>,
    pub store_timeout_ms: Option<u64>,
    pub subscriber_queue_events: Option<usize>,
    pub subscriber_queue_bytes: Option<usize>,
}

impl CollabConfigOverride {
    pub fn apply_to(&self, target: &mut CollabConfig) {
        if let Some(value) = self.snapshot_interval {
            target.snapshot_interval = value;
        }
        if let Some(value) = self.channel_prefix.as_ref() {
            target.channel_prefix = value.clone();
        }
        if let Some(value) = self.snapshot_key_prefix.as_ref() {
            target.snapshot_key_prefix = value.clone();
        }
        if let Some(value) = self.presence_ttl_ms {
            target.presence_ttl_ms = value;
        }
        if let Some(value) = self.presence_sweep_interval_ms {
            target.presence_sweep_interval_ms = value;
        }
        if let Some(value) = self.max_room_members {
            target.max_room_members = value;
        }
        if let Some(value) = self.tenant_allowlist_enabled {
            target.tenant_allowlist_enabled = value;
        }
        if let Some(value) = self.allowed_tenants.as_ref() {
            target.allowed_tenants = value.clone();
        }
        if let Some(value) = self.ops_per_minute_limit {
            target.ops_per_minute_limit = value;
        }
        if let Some(value) = self.store_timeout_ms {
            target.store_timeout_ms = value;
        }
        if let Some(value) = self.subscriber_queue_events {
            target.subscriber_queue_events = value;
        }
        if let Some(value) = self.subscriber_queue_bytes {
            target.subscriber_queue_bytes = value;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Fs,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Snapshot directory for the `fs` backend. Defaults under the data dir.
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(crate::paths::snapshot_dir)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfigOverride {
    pub backend: Option<StoreBackend>,
    pub dir: Option<PathBuf>,
}

impl StoreConfigOverride {
    pub fn apply_to(&self, target: &mut StoreConfig) {
        if let Some(backend) = self.backend {
            target.backend = backend;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log to stderr. Stdout carries protocol traffic in `serve-stdio`.
    pub stderr: bool,
    pub stderr_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stderr: true,
            stderr_format: LogFormat::Tree,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stderr: Option<bool>,
    pub stderr_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stderr) = self.stderr {
            target.stderr = stderr;
        }
        if let Some(format) = self.stderr_format {
            target.stderr_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

/// One partial config source. Layers are applied over defaults in order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub collab: CollabConfigOverride,
    pub limits: LimitsOverride,
    pub store: StoreConfigOverride,
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        self.collab.apply_to(&mut base.collab);
        self.limits.apply_to(&mut base.limits);
        self.store.apply_to(&mut base.store);
        self.logging.apply_to(&mut base.logging);
    }
}
