//! Volume plugin protocol surface
//!
//! Exposes the driver over the JSON-over-HTTP plugin protocol on a Unix
//! socket.

pub mod handler;
pub mod protocol;
pub mod server;

pub use handler::{handle, PluginResponse};
pub use server::{PluginServer, DEFAULT_SOCKET};
