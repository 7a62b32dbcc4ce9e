//! Transfer module for FTP server
//!
//! Passive data channel lifecycle and the byte streaming behind LIST, RETR
//! and STOR.

pub mod data_channel;
pub mod file_ops;

pub use data_channel::{DataChannel, pasv_tuple};
pub use file_ops::{receive_file, send_bytes, send_file};
