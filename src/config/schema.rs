//! Configuration schema for tmpsync
//!
//! The registry is persisted at `<root>/tmpsync.json`.

use crate::error::{TmpsyncError, TmpsyncResult};
use crate::volume::Volume;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persisted registry document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    /// Root the volumes were created under, kept for reference
    pub root: PathBuf,

    /// All registered volumes keyed by name
    pub volumes: HashMap<String, Volume>,
}

/// Driver startup options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Directory holding mountpoints and the config file
    pub root: PathBuf,
}

impl DriverOptions {
    /// Options rooted at `root`, made absolute against the current directory
    pub fn new(root: impl AsRef<Path>) -> TmpsyncResult<Self> {
        Ok(Self {
            root: absolute(root.as_ref())?,
        })
    }

    /// Apply `key=value` driver options on top of these
    ///
    /// Only `root` is recognized; the key is case-insensitive and the last
    /// occurrence wins.
    pub fn with_pairs<S: AsRef<str>>(self, pairs: &[S]) -> TmpsyncResult<Self> {
        let mut root = self.root;

        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TmpsyncError::invalid_option(pair, "", "expected key=value")
            })?;

            match key.trim().to_ascii_lowercase().as_str() {
                "root" => root = PathBuf::from(value.trim()),
                _ => return Err(TmpsyncError::invalid_option(key, value, "unrecognized key")),
            }
        }

        Self::new(root)
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

fn absolute(path: &Path) -> TmpsyncResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| TmpsyncError::io(format!("resolving root {}", path.display()), e))
}
