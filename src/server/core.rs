use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::client::Session;
use crate::config::ServerConfig;

/// Control connection listener. Every accepted connection gets its own
/// task and session; sessions share nothing but the configuration.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the control socket described by `config`.
    pub async fn bind(config: Arc<ServerConfig>) -> io::Result<Self> {
        let addr = config.control_socket();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind to {}: {}", addr, e);
            e
        })?;

        info!("Server bound to {}", listener.local_addr()?);
        info!("Server root directory: {}", config.root_directory.display());

        Ok(Self { listener, config })
    }

    /// Address actually bound, useful when the control port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts control connections until the task is cancelled.
    pub async fn run(self) {
        info!(
            "Accepting FTP clients, passive ports {}-{}",
            self.config.passive_port_min, self.config.passive_port_max
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let config = Arc::clone(&self.config);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = Session::new(stream, addr.to_string(), config).run().await {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
