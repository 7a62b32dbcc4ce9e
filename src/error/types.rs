//! Error types
//!
//! Domain-specific error types for each module of the FTP server. Every
//! variant knows which reply code it is reported to the client with.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Path resolution errors
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path escapes root: {0}")]
    EscapesRoot(String),
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

impl PathError {
    pub fn reply_code(&self) -> u16 {
        550
    }
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("invalid password for user: {0}")]
    InvalidPassword(String),
    #[error("PASS received without a preceding USER")]
    NoPendingUser,
}

impl AuthError {
    pub fn reply_code(&self) -> u16 {
        530
    }
}

/// Filesystem operation errors (MKD, RMD, DELE, LIST targets)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("refusing to operate on the root directory")]
    IsRoot,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn reply_code(&self) -> u16 {
        550
    }
}

/// Data channel and transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no passive data channel is open")]
    NotPassive,
    #[error("no free port in passive range {min}-{max}")]
    NoAvailablePort { min: u16, max: u16 },
    #[error("failed to accept data connection: {0}")]
    AcceptFailed(io::Error),
    #[error("transfer failed: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    pub fn reply_code(&self) -> u16 {
        match self {
            TransferError::NotPassive | TransferError::NoAvailablePort { .. } => 425,
            TransferError::AcceptFailed(_) | TransferError::Io(_) => 451,
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("passive_port_min ({min}) must not exceed passive_port_max ({max})")]
    InvalidPortRange { min: u16, max: u16 },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("root directory {path:?} is not accessible: {source}")]
    RootInaccessible { path: PathBuf, source: io::Error },
    #[error("root directory {0:?} is not a directory")]
    RootNotADirectory(PathBuf),
}
