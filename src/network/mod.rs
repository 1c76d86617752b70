use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::Request;

/// Port used when transfer.info names only a host
pub const DEFAULT_PORT: u16 = 1256;

/// Byte stream to the backup server
pub struct Connection<S> {
    stream: S,
    peer: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Wrap an already connected stream
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
        }
    }

    /// Get the peer description
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write all bytes and flush
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await.map_err(Error::Connection)?;
        self.stream.flush().await.map_err(Error::Connection)?;
        Ok(())
    }

    pub async fn send_request(&mut self, request: &Request) -> Result<()> {
        let bytes = request.to_bytes()?;
        debug!(
            code = request.header().code,
            payload_size = request.header().payload_size,
            "Sending request"
        );
        self.send(&bytes).await
    }

    /// Read exactly `len` bytes, however many reads that takes
    pub async fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.stream
            .read_exact(&mut buffer)
            .await
            .map_err(Error::Connection)?;
        Ok(buffer)
    }

    /// Shut the stream down. Failures are logged, never returned.
    pub async fn close(mut self) {
        match self.stream.shutdown().await {
            Ok(()) => debug!(peer = %self.peer, "Connection closed"),
            Err(e) => warn!(peer = %self.peer, "Error while closing the connection: {}", e),
        }
    }
}

/// Connect to the backup server
pub async fn connect(host: &str, port: u16) -> Result<Connection<TcpStream>> {
    let addr = format!("{}:{}", host, port);

    let stream = TcpStream::connect(&addr).await.map_err(Error::Connection)?;
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or(addr);

    Ok(Connection::new(stream, peer))
}
