//! Volume records and create-option parsing
//!
//! A `Volume` is immutable once created: mount and unmount change the
//! platform mount state, never the record.

use crate::error::{TmpsyncError, TmpsyncResult};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Option keys recognized at create time
pub mod keys {
    /// tmpfs size limit
    pub const SIZE: &str = "size";
    /// Legacy spelling of `size`
    pub const FSSIZE: &str = "fssize";
    /// Sync destination (local path or `user@host:/path`)
    pub const TARGET: &str = "target";
    /// Sync behaviour flags
    pub const OPMODE: &str = "opmode";
    /// Key file for remote transfers
    pub const SSHKEY: &str = "sshkey";
}

/// Synchronization behaviour flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OpMode {
    pub archive: bool,
    pub compress: bool,
    pub delete: bool,
    pub recursive: bool,
}

impl OpMode {
    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        !(self.archive || self.compress || self.delete || self.recursive)
    }

    fn flag_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.archive {
            names.push("archive");
        }
        if self.compress {
            names.push("compress");
        }
        if self.delete {
            names.push("delete");
        }
        if self.recursive {
            names.push("recursive");
        }
        names
    }
}

impl FromStr for OpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = OpMode::default();
        let flags = s
            .split(|c: char| c == ',' || c == '+' || c == '|' || c.is_whitespace())
            .filter(|flag| !flag.is_empty());

        for flag in flags {
            match flag.to_ascii_lowercase().as_str() {
                "archive" => mode.archive = true,
                "compress" => mode.compress = true,
                "delete" => mode.delete = true,
                "recursive" => mode.recursive = true,
                other => return Err(format!("unknown opmode flag '{}'", other)),
            }
        }
        Ok(mode)
    }
}

impl fmt::Display for OpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag_names().join(","))
    }
}

impl From<OpMode> for String {
    fn from(mode: OpMode) -> Self {
        mode.to_string()
    }
}

impl TryFrom<String> for OpMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// tmpfs size limit as accepted by the `size=` mount option
///
/// Either a byte count with an optional binary suffix (`k`, `m`, `g`, `t`,
/// `p`, `e`) or a percentage of physical memory (`50%`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FsSize(String);

impl FsSize {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for FsSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = match s.chars().last() {
            Some('k' | 'K' | 'm' | 'M' | 'g' | 'G' | 't' | 'T' | 'p' | 'P' | 'e' | 'E' | '%') => {
                &s[..s.len() - 1]
            }
            _ => s,
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err("expected a byte count with optional k/m/g/t/p/e suffix, or a percentage".into());
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for FsSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Treat a missing or empty string field as `None`
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Options supplied when a volume is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeOptions {
    pub fssize: Option<FsSize>,
    pub target: Option<String>,
    pub opmode: OpMode,
    pub sshkey: Option<PathBuf>,
}

impl VolumeOptions {
    /// Validate raw create options
    ///
    /// Keys are matched case-insensitively; any key outside the
    /// recognized set is rejected with the offending key and value.
    pub fn parse(raw: &HashMap<String, String>) -> TmpsyncResult<Self> {
        let mut opts = Self::default();

        for (key, value) in raw {
            match key.to_ascii_lowercase().as_str() {
                keys::SIZE | keys::FSSIZE => {
                    opts.fssize = Some(
                        value
                            .parse()
                            .map_err(|reason| TmpsyncError::invalid_option(key, value, reason))?,
                    );
                }
                keys::TARGET => opts.target = non_empty(value),
                keys::OPMODE => {
                    opts.opmode = value
                        .parse()
                        .map_err(|reason| TmpsyncError::invalid_option(key, value, reason))?;
                }
                keys::SSHKEY => opts.sshkey = non_empty(value).map(PathBuf::from),
                _ => {
                    return Err(TmpsyncError::invalid_option(
                        key,
                        value,
                        "unrecognized key",
                    ))
                }
            }
        }

        Ok(opts)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Reject names that cannot be used as a single path component under root
pub fn validate_name(name: &str) -> TmpsyncResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name == "." || name == ".." {
        "name is a relative path component"
    } else if name.contains('/') {
        "name contains a path separator"
    } else if name.contains('\0') {
        "name contains a NUL byte"
    } else {
        return Ok(());
    };

    Err(TmpsyncError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Volume record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name, also the registry key
    #[serde(default)]
    pub name: String,

    /// Directory the tmpfs is mounted on (`root/name`)
    pub mountpoint: PathBuf,

    /// Requested tmpfs size limit
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub fssize: Option<FsSize>,

    /// Sync destination
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub target: Option<String>,

    /// Sync behaviour flags
    #[serde(default)]
    pub opmode: OpMode,

    /// Key file for remote transfers
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub sshkey: Option<PathBuf>,
}

impl Volume {
    /// Create a new volume record rooted at `root`
    pub fn new(name: &str, root: &Path, opts: VolumeOptions) -> Self {
        Self {
            name: name.to_string(),
            mountpoint: root.join(name),
            fssize: opts.fssize,
            target: opts.target,
            opmode: opts.opmode,
            sshkey: opts.sshkey,
        }
    }

    /// tmpfs mount data (`size=...`), empty when no limit was requested
    pub fn mount_data(&self) -> String {
        self.fssize
            .as_ref()
            .map(|size| format!("size={}", size))
            .unwrap_or_default()
    }
}
