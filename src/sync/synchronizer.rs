//! Release-time content synchronization
//!
//! Runs the external transfer tool once per call. Failures are reported,
//! never retried.

use crate::error::{TmpsyncError, TmpsyncResult};
use crate::sync::args::build_args;
use crate::volume::Volume;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default transfer tool
pub const DEFAULT_PROGRAM: &str = "rsync";

/// Max number of output lines kept in a sync error
const SYNC_ERROR_TAIL_LINES: usize = 50;

/// Combine stdout and stderr and keep the last `SYNC_ERROR_TAIL_LINES`
pub(crate) fn tail_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(SYNC_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Pushes a volume's mountpoint contents to its target
#[derive(Debug, Clone)]
pub struct Synchronizer {
    program: String,
}

impl Synchronizer {
    /// Synchronizer using `rsync` from `PATH`
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Synchronizer using a specific transfer program
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Transfer `volume.mountpoint` to `volume.target`
    ///
    /// Blocks until the tool exits; no timeout is applied.
    pub async fn sync(&self, volume: &Volume) -> TmpsyncResult<()> {
        let target = volume.target.as_deref().ok_or_else(|| TmpsyncError::SyncFailed {
            name: volume.name.clone(),
            output: "no sync target configured".to_string(),
        })?;

        let args = build_args(
            &volume.opmode,
            volume.sshkey.as_deref(),
            &volume.mountpoint,
            target,
        );
        debug!("Executing: {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                warn!("Could not run {}: {}", self.program, e);
                TmpsyncError::SyncFailed {
                    name: volume.name.clone(),
                    output: format!("could not run {}: {}", self.program, e),
                }
            })?;

        if output.status.success() {
            info!("Synced volume {} to {}", volume.name, target);
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut captured = tail_output(&stdout, &stderr);
        if captured.is_empty() {
            captured = format!("{} {}", self.program, output.status);
        }

        warn!("Sync of volume {} failed:\n{}", volume.name, captured);
        Err(TmpsyncError::SyncFailed {
            name: volume.name.clone(),
            output: captured,
        })
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}
