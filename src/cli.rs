use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "pasvftpd", about = "A passive-mode FTP server.")]
pub struct Cli {
    /// Path to a TOML configuration file. Without it `pasvftpd.toml` in the
    /// working directory is read when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
