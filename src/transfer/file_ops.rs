//! Byte streaming over an accepted data connection.
//!
//! Transfers are always raw bytes regardless of the TYPE setting. File
//! handles are owned by these functions and closed on every return path.

use log::info;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;

/// Writes a prepared payload (a directory listing) and closes the stream.
pub async fn send_bytes<W>(data: &mut W, payload: &[u8]) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    data.write_all(payload).await?;
    data.shutdown().await?;
    Ok(payload.len() as u64)
}

/// Streams a file to the client in `buffer_size` chunks.
pub async fn send_file<W>(data: &mut W, path: &Path, buffer_size: usize) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut file = File::open(path).await?;
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        data.write_all(&buffer[..n]).await?;
        total += n as u64;
    }

    data.shutdown().await?;
    info!("Sent {} bytes from {}", total, path.display());
    Ok(total)
}

/// Creates or truncates `path` and fills it with everything the client
/// sends until it closes the data connection.
pub async fn receive_file<R>(data: &mut R, path: &Path, buffer_size: usize) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(path).await?;
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = data.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n]).await?;
        total += n as u64;
    }

    // tokio::fs::File hands writes to a background task; flush before the
    // handle is dropped so the content is on disk when 226 goes out.
    file.flush().await?;
    info!("Received {} bytes into {}", total, path.display());
    Ok(total)
}
