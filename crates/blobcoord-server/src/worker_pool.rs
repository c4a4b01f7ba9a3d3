//! A fixed pool of OS worker threads, each driving a dedicated
//! single-threaded tokio runtime and a bounded inbox of accepted
//! connections.
//!
//! Grounded on `kimberlite-server`'s `CoreRuntime` (`core_runtime.rs`):
//! same shape (spawn `worker_thread_count` named threads up front, each
//! with its own bounded inbox, join them all on shutdown), generalized
//! from that crate's lock-free `BoundedQueue<CoreRequest>` spin-loop to a
//! blocking `std::sync::mpsc::sync_channel`, since workers here block on
//! socket I/O between requests rather than busy-polling.

use crate::connection;
use crate::error::ServerError;
use crate::health::HealthState;
use crate::metrics::Metrics;
use blobcoord_client::{Coordinator, ReplicaTransport};
use blobcoord_cluster::ClusterMap;
use blobcoord_pool::ConnectionPool;
use std::net::TcpStream;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

/// A unit of work handed from the boss thread to a worker's inbox.
enum Job {
    Connection(TcpStream),
    Shutdown,
}

/// Round-robins accepted connections across a fixed set of worker
/// threads. Each worker processes its inbox sequentially: one
/// connection at a time, to completion, before popping the next.
pub struct WorkerPool {
    senders: Vec<SyncSender<Job>>,
    handles: Vec<Option<JoinHandle<()>>>,
    next: std::sync::atomic::AtomicUsize,
}

impl WorkerPool {
    /// Spawns `worker_count` threads, each with an inbox of `queue_capacity`
    /// pending connections.
    #[allow(clippy::too_many_arguments)]
    pub fn start<C, P>(
        worker_count: usize,
        queue_capacity: usize,
        coordinator: Arc<Coordinator<C, P>>,
        operation_timeout: Duration,
        idle_timeout: Duration,
        health: HealthState,
    ) -> Self
    where
        C: ClusterMap,
        P: ConnectionPool + 'static,
        P::Connection: ReplicaTransport,
    {
        assert!(worker_count > 0, "worker_count must be positive");

        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (tx, rx) = sync_channel(queue_capacity);
            let coordinator = Arc::clone(&coordinator);
            let health = health.clone();

            let handle = thread::Builder::new()
                .name(format!("blobcoord-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &rx, &coordinator, operation_timeout, idle_timeout, &health))
                .expect("failed to spawn worker thread");

            senders.push(tx);
            handles.push(Some(handle));
        }

        Self {
            senders,
            handles,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Hands `stream` to the next worker in round-robin order.
    /// `Err(stream)` means every worker's inbox is full: the caller
    /// (the boss accept loop) should drop the connection.
    pub fn dispatch(&self, stream: TcpStream) -> Result<(), TcpStream> {
        let index = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % self.senders.len();
        self.senders[index].try_send(Job::Connection(stream)).map_err(|err| match err {
            std::sync::mpsc::TrySendError::Full(Job::Connection(stream)) => stream,
            std::sync::mpsc::TrySendError::Disconnected(Job::Connection(stream)) => stream,
            _ => unreachable!("dispatch only ever sends Job::Connection"),
        })
    }

    /// Signals every worker to stop after draining its current inbox,
    /// then joins them, capping the total wait at `budget`. Workers still
    /// running past the budget are abandoned, and `shutdown_errors` is
    /// incremented once per straggler.
    pub fn shutdown(&mut self, budget: Duration) {
        for sender in &self.senders {
            let _ = sender.try_send(Job::Shutdown);
        }

        let deadline = std::time::Instant::now() + budget;
        for handle in &mut self.handles {
            let Some(h) = handle.take() else { continue };
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                warn!("shutdown budget exhausted, abandoning worker thread");
                Metrics::global().shutdown_errors.inc();
                continue;
            }
            // `JoinHandle` has no timed join; spawn a watcher so a wedged
            // worker cannot block the rest of shutdown indefinitely.
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = h.join();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(remaining).is_err() {
                warn!("worker thread did not exit within the shutdown budget");
                Metrics::global().shutdown_errors.inc();
            }
            let _ = joiner.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop<C, P>(
    worker_id: usize,
    inbox: &Receiver<Job>,
    coordinator: &Arc<Coordinator<C, P>>,
    operation_timeout: Duration,
    idle_timeout: Duration,
    health: &HealthState,
) where
    C: ClusterMap,
    P: ConnectionPool + 'static,
    P::Connection: ReplicaTransport,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build per-worker tokio runtime");
    let handle = runtime.handle().clone();

    while let Ok(job) = inbox.recv() {
        match job {
            Job::Shutdown => break,
            Job::Connection(stream) => {
                if let Err(err) = connection::serve(stream, &handle, coordinator, operation_timeout, idle_timeout, health) {
                    match err {
                        ServerError::ConnectionClosed => {}
                        other => error!(worker_id, %other, "connection ended with an error"),
                    }
                }
            }
        }
    }
}
