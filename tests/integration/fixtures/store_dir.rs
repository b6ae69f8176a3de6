use std::path::{Path, PathBuf};

use tempfile::TempDir;
use valor_collab::paths::{DataDirOverride, override_data_dir_for_tests};

/// Temporary data dir installed as this thread's data dir override.
pub struct TempStoreDir {
    _temp: TempDir,
    data_dir: PathBuf,
    _override: DataDirOverride,
}

impl TempStoreDir {
    pub fn new() -> std::io::Result<Self> {
        let temp = TempDir::new()?;
        let data_dir = temp.path().join("data");
        std::fs::create_dir_all(&data_dir)?;
        let override_guard = override_data_dir_for_tests(Some(data_dir.clone()));

        Ok(Self {
            _temp: temp,
            data_dir,
            _override: override_guard,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        valor_collab::paths::snapshot_dir()
    }
}
