//! Content synchronization through an external transfer tool

pub mod args;
mod synchronizer;

pub use args::build_args;
pub use synchronizer::{Synchronizer, DEFAULT_PROGRAM};
