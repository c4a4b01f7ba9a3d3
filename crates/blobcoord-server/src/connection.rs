//! Per-connection request handling.
//!
//! Every connection here is short-lived: one request line in, one
//! response out, then the socket closes (`Connection: close` on every
//! response written by [`crate::http`]). The idle timeout therefore only
//! bounds how long a worker will block waiting for a client to finish
//! sending its request line and headers, mirroring `kimberlite-server`'s
//! `Connection::is_idle` check but enforced here via
//! `TcpStream::set_read_timeout` rather than a poll loop, since this
//! ingress has no mio dependency to drive one.

use crate::error::ServerError;
use crate::handler;
use crate::health::HealthState;
use crate::metrics::Metrics;
use blobcoord_client::{Coordinator, ReplicaTransport};
use blobcoord_cluster::ClusterMap;
use blobcoord_pool::ConnectionPool;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Keeps `blobcoord_active_connections` accurate across every return path
/// of [`serve`] by decrementing on drop rather than at each `return`.
struct ActiveConnectionGuard;

impl ActiveConnectionGuard {
    fn acquire() -> Self {
        Metrics::global().active_connections.inc();
        Self
    }
}

impl Drop for ActiveConnectionGuard {
    fn drop(&mut self) {
        Metrics::global().active_connections.dec();
    }
}

/// Reads one request off `stream`, dispatches it, and writes the
/// response. `runtime` is the worker's single-threaded tokio runtime,
/// used to drive the coordinator's async call from this blocking
/// thread.
pub fn serve<C, P>(
    mut stream: TcpStream,
    runtime: &Handle,
    coordinator: &Arc<Coordinator<C, P>>,
    operation_timeout: Duration,
    idle_timeout: Duration,
    health: &HealthState,
) -> Result<(), ServerError>
where
    C: ClusterMap,
    P: ConnectionPool + 'static,
    P::Connection: ReplicaTransport,
{
    let _active = ActiveConnectionGuard::acquire();

    stream.set_read_timeout(Some(idle_timeout)).map_err(ServerError::Io)?;
    stream.set_nodelay(true).map_err(ServerError::Io)?;

    let request = match crate::http::read_request_line(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => {
            debug!("peer closed connection before sending a request");
            return Ok(());
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            warn!("connection idle for {idle_timeout:?}, closing");
            return Err(ServerError::ConnectionClosed);
        }
        Err(err) => return Err(ServerError::Io(err)),
    };

    debug!(method = %request.method, path = %request.path, "handling request");
    runtime
        .block_on(handler::handle(&mut stream, &request, coordinator, operation_timeout, health))
        .map_err(ServerError::Io)
}
