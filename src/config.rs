//! Configuration management
//!
//! Loads the immutable server configuration from built-in defaults, an
//! optional TOML file and `PASVFTPD_*` environment overrides, then validates
//! it once before any listener is created.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default configuration file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "pasvftpd";
const ENV_PREFIX: &str = "PASVFTPD";

/// Complete server configuration, read-only after startup
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IPv4 address the control listener and passive listeners bind to
    pub bind_ip: Ipv4Addr,

    /// Port for the control connection
    pub control_port: u16,

    /// Address announced in PASV replies when bound to 0.0.0.0
    pub advertised_ip: Ipv4Addr,

    /// Inclusive port range scanned by PASV
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// Directory every session is confined to
    pub root_directory: PathBuf,

    pub anonymous_enabled: bool,

    /// The single configured account
    pub username: String,
    pub password: String,

    /// Chunk size for RETR/STOR streaming
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Longest control line accepted, terminator included
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
}

fn default_buffer_size() -> usize {
    8192
}

fn default_max_command_length() -> usize {
    512
}

impl ServerConfig {
    /// Load configuration with environment overrides and validate it.
    ///
    /// With `path` set the file must exist; otherwise `pasvftpd.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind_ip", "0.0.0.0")?
            .set_default("control_port", 2121_i64)?
            .set_default("advertised_ip", "127.0.0.1")?
            .set_default("passive_port_min", 50000_i64)?
            .set_default("passive_port_max", 50100_i64)?
            .set_default("anonymous_enabled", false)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()
    }

    /// Check every invariant and canonicalize the root directory.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.control_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "control_port",
                reason: "must not be 0".into(),
            });
        }

        if self.passive_port_min == 0 {
            return Err(ConfigError::InvalidValue {
                field: "passive_port_min",
                reason: "must not be 0".into(),
            });
        }

        if self.passive_port_min > self.passive_port_max {
            return Err(ConfigError::InvalidPortRange {
                min: self.passive_port_min,
                max: self.passive_port_max,
            });
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "buffer_size",
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_command_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_command_length",
                reason: "must be greater than 0".into(),
            });
        }

        if self.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "username",
                reason: "must not be empty".into(),
            });
        }

        let root = self
            .root_directory
            .canonicalize()
            .map_err(|source| ConfigError::RootInaccessible {
                path: self.root_directory.clone(),
                source,
            })?;
        if !root.is_dir() {
            return Err(ConfigError::RootNotADirectory(root));
        }
        self.root_directory = root;

        Ok(self)
    }

    /// Socket address of the control listener
    pub fn control_socket(&self) -> SocketAddr {
        SocketAddr::from((self.bind_ip, self.control_port))
    }

    /// Ports PASV may hand out, scanned in ascending order
    pub fn passive_ports(&self) -> RangeInclusive<u16> {
        self.passive_port_min..=self.passive_port_max
    }

    /// Address written into PASV replies.
    ///
    /// A wildcard bind address cannot be dialled by clients, so the
    /// configured externally visible address is announced instead.
    pub fn pasv_address(&self) -> Ipv4Addr {
        if self.bind_ip.is_unspecified() {
            self.advertised_ip
        } else {
            self.bind_ip
        }
    }
}
