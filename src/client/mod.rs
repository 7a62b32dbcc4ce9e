//! Client session management
//!
//! Per-connection state and the loop that serves one control connection.

pub mod handler;
pub mod state;

pub use handler::Session;
pub use state::SessionState;
