//! CLI argument definitions using clap derive

use crate::plugin::DEFAULT_SOCKET;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// tmpsync - tmpfs volumes synchronized on release
///
/// Serves the volume plugin protocol on a Unix socket. Volumes are tmpfs
/// mounts whose contents are pushed to a durable target with rsync when
/// they are unmounted.
#[derive(Parser, Debug)]
#[command(name = "tmpsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding volume mountpoints and tmpsync.json
    #[arg(short, long, env = "TMPSYNC_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Driver option as KEY=VALUE (repeatable; `root` overrides --root)
    #[arg(short = 'o', long = "opt", value_name = "KEY=VALUE")]
    pub opts: Vec<String>,

    /// Plugin socket path
    #[arg(short, long, env = "TMPSYNC_SOCKET", default_value = DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
