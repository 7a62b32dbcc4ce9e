//! Module `data_channel`
//!
//! Passive-mode data channels. PASV scans the configured port range for the
//! first port it can listen on; the resulting channel accepts exactly one
//! connection for the next LIST, RETR or STOR and is closed afterwards.

use log::{debug, info};
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::error::TransferError;

/// Backlog of the passive listener; one transfer, one connection
const PASSIVE_BACKLOG: u32 = 1;

/// A single-use listening endpoint opened by PASV.
#[derive(Debug)]
pub struct DataChannel {
    listener: TcpListener,
    port: u16,
}

impl DataChannel {
    /// Binds the first free port of `ports` on `bind_ip`.
    ///
    /// Ports are tried in ascending order. A bind or listen failure just
    /// moves on to the next candidate, so sessions racing for the same port
    /// fall through to the following one.
    pub fn open(bind_ip: Ipv4Addr, ports: RangeInclusive<u16>) -> Result<Self, TransferError> {
        let (min, max) = (*ports.start(), *ports.end());

        for port in ports {
            match listen_on(SocketAddr::from((bind_ip, port))) {
                Ok(listener) => {
                    info!("Passive data channel listening on {}:{}", bind_ip, port);
                    return Ok(Self { listener, port });
                }
                Err(e) => {
                    debug!("Passive port {} was busy: {}", port, e);
                }
            }
        }

        Err(TransferError::NoAvailablePort { min, max })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the client to open the data connection.
    ///
    /// Consumes the channel: the listener is closed once this returns,
    /// whether or not a connection was accepted.
    pub async fn accept(self) -> Result<TcpStream, TransferError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransferError::AcceptFailed)?;
        info!("Data connection from {} on port {}", peer, self.port);
        Ok(stream)
    }
}

fn listen_on(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    // Lets a port whose last data connection sits in TIME_WAIT be reused.
    // Linux still refuses the bind while another socket listens on it.
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(PASSIVE_BACKLOG)
}

/// Formats the `h1,h2,h3,h4,p1,p2` argument of a 227 reply.
pub fn pasv_tuple(ip: Ipv4Addr, port: u16) -> String {
    let [h1, h2, h3, h4] = ip.octets();
    format!("{},{},{},{},{},{}", h1, h2, h3, h4, port / 256, port % 256)
}
