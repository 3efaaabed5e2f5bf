//! Durable registry persistence
//!
//! The config file is replaced atomically: the snapshot is written to a
//! temporary file in the same directory, flushed, closed and renamed over
//! the target. A failure before the rename leaves the old file untouched.

pub mod schema;

pub use schema::{DriverOptions, PersistedConfig};

use crate::error::{PersistStage, TmpsyncError, TmpsyncResult};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tokio::fs;
use tracing::debug;

/// Name of the config file under the root directory
pub const CONFIG_FILE: &str = "tmpsync.json";

/// Reads and atomically writes the persisted registry
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store for `<root>/tmpsync.json`
    pub fn new(root: &Path) -> Self {
        Self {
            config_path: root.join(CONFIG_FILE),
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load the persisted registry
    ///
    /// Returns `None` when no config has been written yet. A document that
    /// fails to parse is an error; it is never partially trusted.
    pub async fn load(&self) -> TmpsyncResult<Option<PersistedConfig>> {
        let content = match fs::read_to_string(&self.config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Config file {} not found", self.config_path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(TmpsyncError::io(
                    format!("reading config from {}", self.config_path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| TmpsyncError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: e.to_string(),
            })
    }

    /// Persist a registry snapshot
    pub async fn save(&self, config: &PersistedConfig) -> TmpsyncResult<()> {
        let data = serde_json::to_vec_pretty(config)
            .map_err(|e| TmpsyncError::persist(PersistStage::Encode, &self.config_path, e.into()))?;

        let path = self.config_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| TmpsyncError::Internal(format!("config writer panicked: {}", e)))??;

        debug!("Config saved to {}", self.config_path.display());
        Ok(())
    }
}

/// Write `data` to `path` through a temp file and rename
fn write_atomic(path: &Path, data: &[u8]) -> TmpsyncResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // The temp file is removed on drop until it has been renamed
    let mut tmp = Builder::new()
        .prefix(".tmpsync")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| TmpsyncError::persist(PersistStage::CreateTemp, path, e))?;

    tmp.write_all(data)
        .map_err(|e| TmpsyncError::persist(PersistStage::Write, path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| TmpsyncError::persist(PersistStage::Flush, path, e))?;

    let (file, tmp_path) = tmp.into_parts();
    drop(file);

    tmp_path
        .persist(path)
        .map_err(|e| TmpsyncError::persist(PersistStage::Rename, path, e.error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Volume, VolumeOptions};
    use tempfile::TempDir;

    fn snapshot(root: &Path, names: &[&str]) -> PersistedConfig {
        let mut config = PersistedConfig {
            root: root.to_path_buf(),
            ..Default::default()
        };
        for name in names {
            let opts = VolumeOptions {
                fssize: Some("64m".parse().unwrap()),
                target: Some(format!("/backup/{}", name)),
                opmode: "archive,delete".parse().unwrap(),
                sshkey: Some(PathBuf::from("/keys/id")),
            };
            config
                .volumes
                .insert(name.to_string(), Volume::new(name, root, opts));
        }
        config
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path());
        let config = snapshot(temp.path(), &["v1", "v2"]);

        store.save(&config).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded, config);
        assert_eq!(store.path(), temp.path().join(CONFIG_FILE));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path());

        store.save(&snapshot(temp.path(), &["v1"])).await.unwrap();
        store.save(&snapshot(temp.path(), &["v1", "v2"])).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(CONFIG_FILE)]);
    }

    #[tokio::test]
    async fn corrupt_config_is_invalid() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path());
        std::fs::write(store.path(), "{\"volumes\": [").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::new(temp.path());
        let original = snapshot(temp.path(), &["v1"]);
        store.save(&original).await.unwrap();

        // Missing parent directory: the temp file cannot be created
        let broken = ConfigStore::new(&temp.path().join("missing"));
        let err = broken.save(&snapshot(temp.path(), &["v2"])).await.unwrap_err();
        assert!(matches!(
            err,
            TmpsyncError::PersistFailed {
                stage: PersistStage::CreateTemp,
                ..
            }
        ));

        assert_eq!(store.load().await.unwrap().unwrap(), original);
    }
}
