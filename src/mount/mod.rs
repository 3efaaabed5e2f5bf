//! Platform mount primitive
//!
//! Provides the memory-backed mount operations the driver needs behind a
//! trait, so the lifecycle logic does not depend on a real kernel:
//! - Linux: tmpfs via mount(2)/umount2(2)
//! - Elsewhere: unsupported

mod tmpfs;

pub use tmpfs::{parse_mountinfo, TmpfsPlatform};

use crate::error::{TmpsyncError, TmpsyncResult};
use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Abstract mount primitive
#[async_trait]
pub trait MountPlatform: Send + Sync {
    /// Mount a tmpfs at `target` with the given mount data (`size=64m`)
    async fn mount_tmpfs(&self, target: &Path, data: &str) -> io::Result<()>;

    /// Unmount `target` and everything mounted beneath it
    ///
    /// Nothing mounted at `target` is not an error.
    async fn unmount_recursive(&self, target: &Path) -> io::Result<()>;

    /// Whether `target` is currently a mount point
    async fn is_mounted(&self, target: &Path) -> io::Result<bool>;

    /// Human-readable platform name for logs
    fn platform_name(&self) -> &'static str;
}

/// Create the mount primitive for the current platform
pub fn create_platform() -> TmpsyncResult<Box<dyn MountPlatform>> {
    match std::env::consts::OS {
        "linux" => Ok(Box::new(TmpfsPlatform::new())),
        other => Err(TmpsyncError::UnsupportedPlatform(other.to_string())),
    }
}
