//! Server core functionality
//!
//! Control listener and the accept loop that spawns one session per client.

pub mod core;

pub use core::Server;
