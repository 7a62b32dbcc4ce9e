//! pasvftpd - Entry Point
//!
//! Loads the configuration, sets up logging and serves FTP clients until
//! the process is stopped.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::info;
use std::io::Write;
use std::sync::Arc;

use pasvftpd::cli::Cli;
use pasvftpd::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(buf, "[{}] [{}] {}", timestamp, record.level(), record.args())
        })
        .init();

    info!("Launching FTP server...");

    let config = ServerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    let server = Server::bind(Arc::new(config))
        .await
        .context("Failed to start control listener")?;
    server.run().await;

    Ok(())
}
