use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigLayer};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

/// Parse one config file. A missing file is `Ok(None)`.
pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load_user_config() -> Result<Option<ConfigLayer>, ConfigError> {
    load_layer(&config_path())
}

/// Defaults, then the user file, then `explicit`, then the environment.
///
/// An explicit path that does not exist is an error.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let user = load_user_config()?;
    let explicit = match explicit {
        Some(path) => Some(load_layer(path)?.ok_or_else(|| ConfigError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "config file not found"),
        })?),
        None => None,
    };
    let mut config = merge_layers([user, explicit]);
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Like [`load`], falling back to defaults plus environment on error.
pub fn load_or_default(explicit: Option<&Path>) -> Config {
    match load(explicit) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            config
        }
    }
}

pub fn render(config: &Config) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .ok_or_else(|| write_error(io::Error::other("config path has no parent directory")))?;
    fs::create_dir_all(dir).map_err(write_error)?;
    let contents = render(cfg)?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    fs::write(temp.path(), contents.as_bytes()).map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{LogFormat, LogRotation, StoreBackend};

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.collab.snapshot_interval = 3;
        cfg.collab.tenant_allowlist_enabled = true;
        cfg.collab.allowed_tenants = vec!["acme".into()];
        cfg.store.backend = StoreBackend::Memory;
        cfg.logging.stderr_format = LogFormat::Compact;
        cfg.logging.file.rotation = LogRotation::Hourly;
        cfg.limits.max_ops_per_batch = 42;

        write_config(&path, &cfg).expect("write config");
        let loaded = load_layer(&path).expect("load").expect("present");
        let mut merged = Config::default();
        loaded.apply_to(&mut merged);
        assert_eq!(merged, cfg);
    }

    #[test]
    fn missing_file_is_none_and_bad_toml_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_layer(&dir.path().join("absent.toml")).unwrap().is_none());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[collab\nsnapshot_interval = ").unwrap();
        assert!(matches!(load_layer(&bad), Err(ConfigError::Parse { .. })));

        let wrong_type = dir.path().join("wrong.toml");
        fs::write(&wrong_type, "[collab]\nsnapshot_interval = \"often\"\n").unwrap();
        assert!(matches!(
            load_layer(&wrong_type),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
