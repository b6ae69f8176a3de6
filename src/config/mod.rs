//! Config loading and persistence.

mod load;
mod merge;
mod schema;

pub use load::{
    ConfigError, config_path, load, load_layer, load_or_default, load_user_config, render,
    write_config,
};
pub use merge::{apply_env_overrides, apply_overrides_from, merge_layers};
pub use schema::{
    CollabConfig, CollabConfigOverride, Config, ConfigLayer, FileLoggingConfig,
    FileLoggingConfigOverride, LogFormat, LogRotation, LoggingConfig, LoggingConfigOverride,
    StoreBackend, StoreConfig, StoreConfigOverride,
};
