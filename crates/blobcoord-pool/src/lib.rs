//! Connection pool contract and a TCP-backed implementation.
//!
//! The pool is process-wide and shared across all operations; it is the
//! only cross-operation mutable resource and owns its own internal
//! synchronization. Fairness among operations contending for the same
//! replica's connections is a pool concern, not the caller's.

use blobcoord_types::ReplicaId;
use crossbeam_queue::ArrayQueue;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("checkout timed out after {0:?}")]
    Timeout(Duration),
    #[error("replica {0} is unreachable: {1}")]
    Unreachable(ReplicaId, std::io::Error),
    #[error("replica {0} has no known address")]
    UnknownReplica(ReplicaId),
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Borrow-and-return contract for replica connections. Implementations
/// must be safe to call concurrently from many in-flight operations.
pub trait ConnectionPool: Send + Sync {
    type Connection: Send;

    /// Borrows a connection to `replica`, dialing a fresh one if the
    /// free list is empty. Bounded by `timeout`.
    async fn checkout(&self, replica: ReplicaId, timeout: Duration) -> PoolResult<Self::Connection>;

    /// Returns a healthy connection to the pool for reuse.
    fn checkin(&self, replica: ReplicaId, connection: Self::Connection);

    /// Discards a connection that faulted; it is not returned to the pool.
    fn destroy(&self, replica: ReplicaId, connection: Self::Connection);
}

/// A TCP-backed connection pool keeping a bounded per-replica free list
/// of idle sockets. Replica addresses are resolved from a static map
/// supplied at construction (address discovery is a `ClusterMap` concern,
/// not this pool's).
pub struct TcpConnectionPool {
    addresses: HashMap<ReplicaId, SocketAddr>,
    max_idle_per_replica: usize,
    free: Mutex<HashMap<ReplicaId, Arc<ArrayQueue<TcpStream>>>>,
}

impl TcpConnectionPool {
    pub fn new(addresses: HashMap<ReplicaId, SocketAddr>, max_idle_per_replica: usize) -> Self {
        assert!(max_idle_per_replica > 0, "max_idle_per_replica must be positive");
        Self {
            addresses,
            max_idle_per_replica,
            free: Mutex::new(HashMap::new()),
        }
    }

    fn free_list(&self, replica: ReplicaId) -> Arc<ArrayQueue<TcpStream>> {
        let mut free = self.free.lock().expect("connection pool mutex poisoned");
        free.entry(replica)
            .or_insert_with(|| Arc::new(ArrayQueue::new(self.max_idle_per_replica)))
            .clone()
    }

    /// Number of idle connections currently held for `replica`. Exposed
    /// for tests and metrics; not part of the `ConnectionPool` contract.
    pub fn idle_count(&self, replica: ReplicaId) -> usize {
        self.free
            .lock()
            .expect("connection pool mutex poisoned")
            .get(&replica)
            .map_or(0, |q| q.len())
    }
}

impl ConnectionPool for TcpConnectionPool {
    type Connection = TcpStream;

    async fn checkout(&self, replica: ReplicaId, timeout: Duration) -> PoolResult<TcpStream> {
        let queue = self.free_list(replica);
        if let Some(stream) = queue.pop() {
            return Ok(stream);
        }

        let addr = *self
            .addresses
            .get(&replica)
            .ok_or(PoolError::UnknownReplica(replica))?;

        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(io_err)) => Err(PoolError::Unreachable(replica, io_err)),
            Err(_elapsed) => Err(PoolError::Timeout(timeout)),
        }
    }

    fn checkin(&self, replica: ReplicaId, connection: TcpStream) {
        let queue = self.free_list(replica);
        // After a traffic spike the free list may already be full; shed
        // the excess connection rather than growing memory indefinitely.
        let _ = queue.push(connection);
    }

    fn destroy(&self, _replica: ReplicaId, connection: TcpStream) {
        drop(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobcoord_types::DatacenterId;
    use tokio::net::TcpListener;

    async fn echo_listener() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        // keep the connection open; tests only check dial/reuse.
                        std::mem::forget(stream);
                    }
                    Err(_) => break,
                }
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn checkout_dials_when_pool_empty() {
        let (addr, _server) = echo_listener().await;
        let replica = ReplicaId::new(1, DatacenterId(1));
        let mut addresses = HashMap::new();
        addresses.insert(replica, addr);
        let pool = TcpConnectionPool::new(addresses, 4);

        let conn = pool.checkout(replica, Duration::from_secs(1)).await.unwrap();
        pool.checkin(replica, conn);
        assert_eq!(pool.idle_count(replica), 1);
    }

    #[tokio::test]
    async fn checkout_reuses_checked_in_connection() {
        let (addr, _server) = echo_listener().await;
        let replica = ReplicaId::new(1, DatacenterId(1));
        let mut addresses = HashMap::new();
        addresses.insert(replica, addr);
        let pool = TcpConnectionPool::new(addresses, 4);

        let conn = pool.checkout(replica, Duration::from_secs(1)).await.unwrap();
        pool.checkin(replica, conn);
        assert_eq!(pool.idle_count(replica), 1);

        let _conn = pool.checkout(replica, Duration::from_secs(1)).await.unwrap();
        assert_eq!(pool.idle_count(replica), 0, "reused connection should drain the free list");
    }

    #[tokio::test]
    async fn checkout_unknown_replica_errors() {
        let pool = TcpConnectionPool::new(HashMap::new(), 4);
        let replica = ReplicaId::new(1, DatacenterId(1));
        let err = pool.checkout(replica, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, PoolError::UnknownReplica(_)));
    }

    #[tokio::test]
    async fn destroy_drops_without_returning_to_pool() {
        let (addr, _server) = echo_listener().await;
        let replica = ReplicaId::new(1, DatacenterId(1));
        let mut addresses = HashMap::new();
        addresses.insert(replica, addr);
        let pool = TcpConnectionPool::new(addresses, 4);

        let conn = pool.checkout(replica, Duration::from_secs(1)).await.unwrap();
        pool.destroy(replica, conn);
        assert_eq!(pool.idle_count(replica), 0);
    }
}
