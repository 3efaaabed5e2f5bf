//! In-memory volume registry
//!
//! The registry is plain data; locking is owned by the driver.

use crate::config::schema::PersistedConfig;
use crate::volume::record::Volume;
use std::collections::HashMap;
use std::path::Path;

/// Mapping from volume name to volume record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    volumes: HashMap<String, Volume>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a persisted snapshot
    ///
    /// Record names are re-derived from the map keys, so documents written
    /// without a `name` field load unchanged.
    pub fn from_persisted(config: PersistedConfig) -> Self {
        let volumes = config
            .volumes
            .into_iter()
            .map(|(name, mut volume)| {
                volume.name = name.clone();
                (name, volume)
            })
            .collect();
        Self { volumes }
    }

    /// Take a snapshot for persistence
    pub fn to_persisted(&self, root: &Path) -> PersistedConfig {
        PersistedConfig {
            root: root.to_path_buf(),
            volumes: self.volumes.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Volume> {
        self.volumes.get(name)
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&mut self, volume: Volume) -> Option<Volume> {
        self.volumes.insert(volume.name.clone(), volume)
    }

    pub fn remove(&mut self, name: &str) -> Option<Volume> {
        self.volumes.remove(name)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Iterate records in name order
    pub fn iter(&self) -> impl Iterator<Item = &Volume> {
        let mut volumes: Vec<&Volume> = self.volumes.values().collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes.into_iter()
    }
}
