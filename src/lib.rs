//! tmpsync - tmpfs-backed volumes with release-time synchronization
//!
//! Provisions memory-backed volumes on demand, mirrors their contents to a
//! durable target with rsync when they are released, and keeps the volume
//! registry in a crash-safe JSON file.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod mount;
pub mod plugin;
pub mod sync;
pub mod volume;

pub use driver::{Capabilities, TmpsyncDriver, VolumeInfo};
pub use error::{TmpsyncError, TmpsyncResult};
