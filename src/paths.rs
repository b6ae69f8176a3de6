//! XDG directory helpers for config/data locations.

use std::cell::RefCell;
use std::path::PathBuf;

const APP_DIR: &str = "valor-collab";

/// Base directory for persistent data (snapshots, logs).
///
/// Uses `VALOR_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/valor-collab` or
/// `~/.local/share/valor-collab`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE.with(|cell| cell.borrow().clone()) {
        return dir;
    }

    if let Ok(dir) = std::env::var("VALOR_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join(APP_DIR)
}

/// Scoped per-thread override of [`data_dir`]. Restores the previous value
/// on drop.
#[doc(hidden)]
pub struct DataDirOverride {
    prev: Option<PathBuf>,
}

impl Drop for DataDirOverride {
    fn drop(&mut self) {
        let prev = self.prev.take();
        DATA_DIR_OVERRIDE.with(|cell| {
            cell.replace(prev);
        });
    }
}

#[doc(hidden)]
pub fn override_data_dir_for_tests(path: Option<PathBuf>) -> DataDirOverride {
    let prev = DATA_DIR_OVERRIDE.with(|cell| cell.replace(path));
    DataDirOverride { prev }
}

thread_local! {
    static DATA_DIR_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

/// Default directory of the filesystem snapshot store.
pub fn snapshot_dir() -> PathBuf {
    data_dir().join("snapshots")
}

/// Default directory for rolling log files.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Base directory for configuration files.
///
/// Uses `VALOR_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/valor-collab`
/// or `~/.config/valor-collab`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VALOR_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_scopes_data_paths() {
        let temp = tempfile::tempdir().unwrap();
        {
            let _guard = override_data_dir_for_tests(Some(temp.path().to_path_buf()));
            assert_eq!(snapshot_dir(), temp.path().join("snapshots"));
            assert_eq!(log_dir(), temp.path().join("logs"));
        }
        assert_ne!(data_dir(), temp.path().to_path_buf());
    }
}
