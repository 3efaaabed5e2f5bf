//! Volume records and the registry that holds them

pub mod record;
pub mod registry;

pub use record::{validate_name, FsSize, OpMode, Volume, VolumeOptions};
pub use registry::Registry;
