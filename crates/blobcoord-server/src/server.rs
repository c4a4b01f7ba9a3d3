//! The HTTP ingress boss thread: binds the listener, accepts connections,
//! and hands each one to the [`WorkerPool`]. Grounded on
//! `kimberlite-server`'s `http.rs` sidecar for the accept-and-dispatch
//! shape, but running as the primary ingress rather than a metrics-only
//! side listener, and without `mio` (see `lib.rs` for why).

use crate::error::{ServerError, ServerResult};
use crate::health::HealthState;
use crate::metrics::Metrics;
use crate::worker_pool::WorkerPool;
use blobcoord_client::{Coordinator, ReplicaTransport};
use blobcoord_cluster::ClusterMap;
use blobcoord_config::ServerConfig;
use blobcoord_pool::ConnectionPool;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

/// How long the boss thread blocks on each accept-loop poll before
/// rechecking the shutdown flag. Short enough that `ShutdownHandle::stop`
/// returns promptly, long enough to avoid spinning.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A handle the caller uses to request a graceful shutdown and wait for
/// it to complete.
pub struct ShutdownHandle {
    shutdown: Arc<AtomicBool>,
    boss: Option<JoinHandle<()>>,
}

impl ShutdownHandle {
    /// Requests shutdown and blocks until the boss thread has stopped
    /// accepting and every worker has drained (or the shutdown budget for
    /// the worker pool, owned by the boss thread, has been exhausted).
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(boss) = self.boss.take() {
            let _ = boss.join();
        }
    }
}

/// The bound ingress server, ready to start accepting connections.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds the listener without starting to accept. Splitting bind from
    /// run lets callers observe bind failures (e.g. port already in use)
    /// before standing up worker threads.
    pub fn bind(config: &ServerConfig) -> ServerResult<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
        let listener = bind_with_backlog(addr, config.so_backlog)?;
        listener.set_nonblocking(true).map_err(ServerError::Io)?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts the worker pool and the boss accept loop, signals
    /// readiness once the listener is confirmed live, and returns a
    /// [`ShutdownHandle`] for graceful termination.
    ///
    /// Blocks the calling thread until `startup_wait` has elapsed or the
    /// accept loop has confirmed it is running, whichever comes first;
    /// on timeout, increments `startup_errors` and returns
    /// `ServerError::StartupTimedOut`.
    pub fn run<C, P>(
        self,
        config: &ServerConfig,
        operation_timeout: Duration,
        coordinator: Arc<Coordinator<C, P>>,
        health: HealthState,
        startup_wait: Duration,
    ) -> ServerResult<ShutdownHandle>
    where
        C: ClusterMap + 'static,
        P: ConnectionPool + 'static,
        P::Connection: ReplicaTransport,
    {
        let pool = WorkerPool::start(
            config.worker_thread_count,
            config.so_backlog as usize,
            coordinator,
            operation_timeout,
            config.idle_time(),
            health.clone(),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let started = Arc::new(Barrier::new(2));
        let shutdown_budget = Duration::from_secs(30);

        let boss_shutdown = Arc::clone(&shutdown);
        let boss_started = Arc::clone(&started);
        let listener = self.listener;
        let addr = self.addr;
        let boss = std::thread::Builder::new()
            .name("blobcoord-boss".to_string())
            .spawn(move || accept_loop(&listener, &boss_shutdown, &boss_started, addr, pool, shutdown_budget))
            .map_err(ServerError::Io)?;

        if !wait_for_barrier(&started, startup_wait) {
            Metrics::global().startup_errors.inc();
            shutdown.store(true, Ordering::Release);
            let _ = boss.join();
            return Err(ServerError::StartupTimedOut);
        }

        health.mark_ready();
        info!(%addr, "ingress accepting connections");

        Ok(ShutdownHandle { shutdown, boss: Some(boss) })
    }
}

/// Owns the worker pool for the lifetime of the boss thread: accepts and
/// dispatches connections until `shutdown` is set, then drains the pool
/// before the thread exits, so `ShutdownHandle::stop`'s single `join`
/// covers both the accept loop and every worker.
fn accept_loop(listener: &TcpListener, shutdown: &AtomicBool, started: &Barrier, addr: SocketAddr, pool: WorkerPool, shutdown_budget: Duration) {
    started.wait();
    let mut pool = pool;
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::trace!(%peer, "accepted connection");
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                if pool.dispatch(stream).is_err() {
                    warn!("worker pool saturated, dropping connection");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!(%err, "accept failed");
            }
        }
    }
    info!(%addr, "boss thread stopping, draining workers");
    pool.shutdown(shutdown_budget);
}

fn wait_for_barrier(barrier: &Arc<Barrier>, timeout: Duration) -> bool {
    let barrier = Arc::clone(barrier);
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        barrier.wait();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}

fn bind_with_backlog(addr: SocketAddr, _backlog: u32) -> ServerResult<TcpListener> {
    // `std::net::TcpListener::bind` does not expose a backlog knob; the OS
    // default is used. Kept as a parameter so a future switch to a
    // socket2-based bind (which does expose `listen(backlog)`) is a
    // localized change.
    TcpListener::bind(addr).map_err(|source| ServerError::BindFailed { addr, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_an_ephemeral_port() {
        let config = ServerConfig {
            server_port: 0,
            ..Default::default()
        };
        let server = Server::bind(&config).unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }
}
