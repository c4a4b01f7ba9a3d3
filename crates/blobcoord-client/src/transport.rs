//! Per-connection request/response exchange: writing one `GetRequest`
//! and reading back exactly one `GetResponse` over a checked-out
//! connection.

use blobcoord_wire::{Frame, GetRequest, GetResponse, WireError};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("connection closed before a full response was read")]
    ConnectionClosed,
}

/// One request/response exchange over a checked-out connection. A real
/// `TcpStream` and the in-crate test fake both implement this.
pub trait ReplicaTransport: Send {
    async fn send_get_request(&mut self, request: &GetRequest) -> Result<(), TransportError>;
    async fn recv_get_response(&mut self) -> Result<GetResponse, TransportError>;
}

impl ReplicaTransport for TcpStream {
    async fn send_get_request(&mut self, request: &GetRequest) -> Result<(), TransportError> {
        let frame = Frame::encode_value(request)?;
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.write_all(&buf).await?;
        self.flush().await?;
        Ok(())
    }

    async fn recv_get_response(&mut self) -> Result<GetResponse, TransportError> {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            if let Some(frame) = Frame::decode(&mut buf)? {
                return Ok(frame.decode_value()?);
            }
            let mut chunk = [0u8; 4096];
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}
