//! Linux tmpfs mounts
//!
//! Mount state is read from `/proc/self/mountinfo`; nothing about mounts
//! is cached in memory.

use crate::mount::MountPlatform;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Mount point column in a mountinfo line
const MOUNT_POINT_FIELD: usize = 4;

/// tmpfs mount primitive backed by the kernel
pub struct TmpfsPlatform {
    mountinfo: PathBuf,
}

impl TmpfsPlatform {
    /// Create a platform reading the current process's mount table
    pub fn new() -> Self {
        Self {
            mountinfo: PathBuf::from(MOUNTINFO),
        }
    }

    async fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
        let content = tokio::fs::read_to_string(&self.mountinfo).await?;
        Ok(parse_mountinfo(&content))
    }
}

impl Default for TmpfsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract mount points from mountinfo content
pub fn parse_mountinfo(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split(' ').nth(MOUNT_POINT_FIELD))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

/// Decode the `\NNN` escapes the kernel uses for space, tab, newline and backslash
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Mount points at or below `target`, deepest first
fn nested_mounts(mounts: Vec<PathBuf>, target: &Path) -> Vec<PathBuf> {
    let mut nested: Vec<PathBuf> = mounts
        .into_iter()
        .filter(|mount| mount.starts_with(target))
        .collect();
    nested.sort_by_key(|mount| std::cmp::Reverse(mount.components().count()));
    nested
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn c_path(path: &Path) -> io::Result<CString> {
        Ok(CString::new(path.as_os_str().as_bytes())?)
    }

    pub fn mount_tmpfs(target: &Path, data: &str) -> io::Result<()> {
        let source = CString::new("tmpfs")?;
        let fstype = CString::new("tmpfs")?;
        let target = c_path(target)?;
        let data = CString::new(data)?;
        let data_ptr = if data.as_bytes().is_empty() {
            std::ptr::null()
        } else {
            data.as_ptr() as *const libc::c_void
        };

        // SAFETY: every pointer comes from a CString that outlives the call
        let rc = unsafe {
            libc::mount(
                source.as_ptr(),
                target.as_ptr(),
                fstype.as_ptr(),
                0,
                data_ptr,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Lazily detach one mount; "not a mount point" is reported as success
    pub fn unmount(target: &Path) -> io::Result<()> {
        let target = c_path(target)?;

        // SAFETY: target is a valid NUL-terminated path for the duration of the call
        let rc = unsafe { libc::umount2(target.as_ptr(), libc::MNT_DETACH) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::ENOENT) => Ok(()),
            _ => Err(err),
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::io;
    use std::path::Path;

    pub fn mount_tmpfs(_target: &Path, _data: &str) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn unmount(_target: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

async fn blocking<F>(f: F) -> io::Result<()>
where
    F: FnOnce() -> io::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::other(format!("mount task failed: {}", e)))?
}

#[async_trait]
impl MountPlatform for TmpfsPlatform {
    async fn mount_tmpfs(&self, target: &Path, data: &str) -> io::Result<()> {
        debug!("Mounting tmpfs at {} ({})", target.display(), data);
        let target = target.to_path_buf();
        let data = data.to_string();
        blocking(move || sys::mount_tmpfs(&target, &data)).await
    }

    async fn unmount_recursive(&self, target: &Path) -> io::Result<()> {
        let mounts = nested_mounts(self.mount_points().await?, target);
        if mounts.is_empty() {
            debug!("Nothing mounted at {}", target.display());
            return Ok(());
        }

        for mount in mounts {
            debug!("Unmounting {}", mount.display());
            blocking(move || sys::unmount(&mount)).await?;
        }
        Ok(())
    }

    async fn is_mounted(&self, target: &Path) -> io::Result<bool> {
        Ok(self.mount_points().await?.iter().any(|mount| mount == target))
    }

    fn platform_name(&self) -> &'static str {
        "Linux tmpfs"
    }
}
