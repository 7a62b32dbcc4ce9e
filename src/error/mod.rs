//! Error handling
//!
//! Defines error types for the FTP server and their mapping onto reply codes.

pub mod types;

pub use types::*;
