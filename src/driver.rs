//! Volume lifecycle driver
//!
//! Owns the registry and composes the config store, synchronizer and mount
//! primitive. Per volume:
//!
//! | State | Record | tmpfs |
//! |-------|--------|-------|
//! | Unregistered | no | no |
//! | Registered | yes | no |
//! | Mounted | yes | yes |
//!
//! Only the record is persisted. Mount state is always read back from the
//! platform, so a restart never trusts a stale belief about mounts.
//!
//! Read-only `path` and `list` share the registry lock; every other
//! operation holds it exclusively for its whole duration, including the
//! transfer tool and mount calls.

use crate::config::{ConfigStore, DriverOptions};
use crate::error::{TmpsyncError, TmpsyncResult};
use crate::mount::{create_platform, MountPlatform};
use crate::sync::Synchronizer;
use crate::volume::{validate_name, Registry, Volume, VolumeOptions};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Scope reported by `capabilities`
pub const SCOPE_LOCAL: &str = "local";

/// Projection of a volume returned by `get` and `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: PathBuf,
    /// Set by `get` only; this is the query time, not the creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// Driver capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub scope: &'static str,
}

/// Lifecycle driver for tmpfs-backed volumes
pub struct TmpsyncDriver {
    options: DriverOptions,
    store: ConfigStore,
    registry: RwLock<Registry>,
    synchronizer: Synchronizer,
    platform: Box<dyn MountPlatform>,
}

impl TmpsyncDriver {
    /// Create a driver for the current platform using `rsync`
    pub async fn new(options: DriverOptions) -> TmpsyncResult<Self> {
        let platform = create_platform()?;
        Self::with_components(options, Synchronizer::new(), platform).await
    }

    /// Create a driver from explicit components
    ///
    /// Creates the root directory if needed and loads the persisted
    /// registry. A corrupt config file is returned as a fatal error.
    ///
    /// The root is canonicalized so mountpoints compare equal to the paths
    /// the kernel reports in its mount table.
    pub async fn with_components(
        mut options: DriverOptions,
        synchronizer: Synchronizer,
        platform: Box<dyn MountPlatform>,
    ) -> TmpsyncResult<Self> {
        info!(
            "Starting driver at {} ({})",
            options.root.display(),
            platform.platform_name()
        );

        create_dir(&options.root)
            .await
            .map_err(|e| TmpsyncError::io(format!("creating root {}", options.root.display()), e))?;
        options.root = fs::canonicalize(&options.root)
            .await
            .map_err(|e| TmpsyncError::io(format!("resolving root {}", options.root.display()), e))?;

        let store = ConfigStore::new(&options.root);
        let registry = match store.load().await? {
            Some(config) => {
                if config.root != options.root && !config.root.as_os_str().is_empty() {
                    warn!(
                        "Config was written for root {}, running with {}",
                        config.root.display(),
                        options.root.display()
                    );
                }
                Registry::from_persisted(config)
            }
            None => Registry::new(),
        };
        info!("Loaded {} volume(s) from {}", registry.len(), store.path().display());

        let driver = Self {
            options,
            store,
            registry: RwLock::new(registry),
            synchronizer,
            platform,
        };
        driver.report_mounts().await;
        Ok(driver)
    }

    /// Root directory holding mountpoints and the config file
    pub fn root(&self) -> &Path {
        &self.options.root
    }

    /// Log which registered volumes the platform reports as mounted
    async fn report_mounts(&self) {
        let registry = self.registry.read().await;
        for volume in registry.iter() {
            match self.platform.is_mounted(&volume.mountpoint).await {
                Ok(true) => info!("Volume {} is mounted at {}", volume.name, volume.mountpoint.display()),
                Ok(false) => {}
                Err(e) => warn!("Could not query mount state of {}: {}", volume.name, e),
            }
        }
    }

    async fn persist(&self, registry: &Registry) -> TmpsyncResult<()> {
        let snapshot = registry.to_persisted(&self.options.root);
        if let Err(e) = self.store.save(&snapshot).await {
            // In-memory state is kept; the next successful save catches up
            warn!("{}", e);
            return Err(e);
        }
        Ok(())
    }

    async fn is_mounted(&self, volume: &Volume) -> TmpsyncResult<bool> {
        self.platform.is_mounted(&volume.mountpoint).await.map_err(|e| {
            TmpsyncError::io(format!("reading mount state of {}", volume.name), e)
        })
    }

    /// Register a volume and create its mountpoint directory
    ///
    /// Re-creating an existing name replaces its record.
    pub async fn create(&self, name: &str, options: &HashMap<String, String>) -> TmpsyncResult<()> {
        debug!("create ({}, {:?})", name, options);
        validate_name(name)?;
        let opts = VolumeOptions::parse(options)?;

        let mut registry = self.registry.write().await;
        let volume = Volume::new(name, &self.options.root, opts);

        create_dir(&volume.mountpoint).await.map_err(|e| {
            TmpsyncError::io(
                format!("create volume {}: creating {}", name, volume.mountpoint.display()),
                e,
            )
        })?;

        if registry.insert(volume).is_some() {
            warn!("Volume {} already existed, record replaced", name);
        }
        info!("Created volume {}", name);

        self.persist(&registry).await
    }

    /// Delete a volume's mountpoint tree and its record
    pub async fn remove(&self, name: &str) -> TmpsyncResult<()> {
        debug!("remove ({})", name);
        let mut registry = self.registry.write().await;
        let volume = registry
            .get(name)
            .ok_or_else(|| TmpsyncError::NotFound(name.to_string()))?;

        if self.is_mounted(volume).await? {
            return Err(TmpsyncError::Busy(name.to_string()));
        }

        match fs::remove_dir_all(&volume.mountpoint).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TmpsyncError::io(
                    format!("remove volume {}: deleting {}", name, volume.mountpoint.display()),
                    e,
                ))
            }
        }

        registry.remove(name);
        info!("Removed volume {}", name);

        self.persist(&registry).await
    }

    /// Mountpoint of a registered volume
    pub async fn path(&self, name: &str) -> TmpsyncResult<PathBuf> {
        debug!("path ({})", name);
        let registry = self.registry.read().await;
        registry
            .get(name)
            .map(|volume| volume.mountpoint.clone())
            .ok_or_else(|| TmpsyncError::NotFound(name.to_string()))
    }

    /// Mount a tmpfs at the volume's mountpoint
    ///
    /// A volume that is already mounted is rejected, so each volume has at
    /// most one tmpfs.
    pub async fn mount(&self, name: &str, id: &str) -> TmpsyncResult<PathBuf> {
        debug!("mount ({}, id {})", name, id);
        let registry = self.registry.write().await;
        let volume = registry
            .get(name)
            .ok_or_else(|| TmpsyncError::NotFound(name.to_string()))?;

        if self.is_mounted(volume).await? {
            return Err(TmpsyncError::MountFailed {
                name: name.to_string(),
                reason: "already mounted".to_string(),
            });
        }

        self.platform
            .mount_tmpfs(&volume.mountpoint, &volume.mount_data())
            .await
            .map_err(|e| TmpsyncError::MountFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Mounted volume {} at {}", name, volume.mountpoint.display());
        Ok(volume.mountpoint.clone())
    }

    /// Sync the volume to its target, then unmount it
    ///
    /// When the sync fails the tmpfs stays mounted, so its contents are not
    /// lost, and the sync error is returned.
    pub async fn unmount(&self, name: &str, id: &str) -> TmpsyncResult<()> {
        debug!("unmount ({}, id {})", name, id);
        let registry = self.registry.write().await;
        let volume = registry
            .get(name)
            .ok_or_else(|| TmpsyncError::NotFound(name.to_string()))?;

        self.synchronizer.sync(volume).await?;

        self.platform
            .unmount_recursive(&volume.mountpoint)
            .await
            .map_err(|e| TmpsyncError::UnmountFailed {
                path: volume.mountpoint.clone(),
                reason: e.to_string(),
            })?;

        info!("Unmounted volume {}", name);
        Ok(())
    }

    /// Describe one volume
    pub async fn get(&self, name: &str) -> TmpsyncResult<VolumeInfo> {
        debug!("get ({})", name);
        let registry = self.registry.write().await;
        let volume = registry
            .get(name)
            .ok_or_else(|| TmpsyncError::NotFound(name.to_string()))?;

        Ok(VolumeInfo {
            name: volume.name.clone(),
            mountpoint: volume.mountpoint.clone(),
            created_at: Some(Utc::now()),
        })
    }

    /// Describe all volumes, sorted by name
    pub async fn list(&self) -> Vec<VolumeInfo> {
        debug!("list ()");
        let registry = self.registry.read().await;
        registry
            .iter()
            .map(|volume| VolumeInfo {
                name: volume.name.clone(),
                mountpoint: volume.mountpoint.clone(),
                created_at: None,
            })
            .collect()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities { scope: SCOPE_LOCAL }
    }
}

/// `mkdir -p` with mode 0755
async fn create_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o755);
    builder.create(path).await
}
