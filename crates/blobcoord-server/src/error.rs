//! Server error types.

use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    BindFailed { addr: std::net::SocketAddr, source: std::io::Error },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("connection closed before a full request was read")]
    ConnectionClosed,

    #[error("startup did not complete within the configured wait")]
    StartupTimedOut,

    #[error("server is shutting down")]
    Shutdown,
}
