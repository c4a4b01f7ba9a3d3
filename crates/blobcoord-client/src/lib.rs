//! Coordinator read path: the client-side operation engine that contacts
//! a blob's replicas in parallel, applies a quorum policy to their
//! responses, and surfaces one definitive outcome.
//!
//! The public entry point is [`Coordinator`]; everything else in this
//! crate (`OperationPolicy`, `OperationRequest`, `Operation`,
//! `GetOperation`) is the machinery it drives.

pub mod error;
pub mod fakes;
pub mod operation;
pub mod policy;
pub mod request;
pub mod transport;

pub use error::{CoordinatorError, CoordinatorResult};
pub use operation::{ErrorDecision, GetOperation, Operation, OperationParams};
pub use policy::{Decision, GetOperationPolicy, OperationPolicy};
pub use request::{GetResult, OperationRequest, OperationResponse, ResponseOutcome};
pub use transport::{ReplicaTransport, TransportError};

use blobcoord_cluster::ClusterMap;
use blobcoord_pool::ConnectionPool;
use blobcoord_types::{BlobId, ClientId, GetFlags, MessageInfo, PartitionId, ReplicaId};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Splits a partition's replicas into local-DC-first, remote-DC-second
/// order, the order `OperationPolicy::next_replica` relies on.
fn split_by_datacenter(replicas: &[ReplicaId], local: blobcoord_types::DatacenterId) -> (Vec<ReplicaId>, Vec<ReplicaId>) {
    let mut local_replicas = Vec::new();
    let mut remote_replicas = Vec::new();
    for replica in replicas {
        if replica.datacenter == local {
            local_replicas.push(*replica);
        } else {
            remote_replicas.push(*replica);
        }
    }
    (local_replicas, remote_replicas)
}

/// The in-process facade the HTTP ingress calls: one method per
/// Coordinator API operation from spec.md §6.
pub struct Coordinator<C, P> {
    cluster_map: Arc<C>,
    pool: Arc<P>,
    client_id: ClientId,
    parallelism: usize,
    success_target: usize,
}

impl<C, P> Coordinator<C, P>
where
    C: ClusterMap,
    P: ConnectionPool + 'static,
    P::Connection: ReplicaTransport,
{
    pub fn new(cluster_map: Arc<C>, pool: Arc<P>, client_id: ClientId) -> Self {
        Self {
            cluster_map,
            pool,
            client_id,
            parallelism: 2,
            success_target: 1,
        }
    }

    /// Overrides `get_parallelism` (spec.md §6 default 2).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Overrides `get_success_target` (spec.md §6 default 1).
    pub fn with_success_target(mut self, success_target: usize) -> Self {
        self.success_target = success_target;
        self
    }

    fn operation_params(&self, blob_id: BlobId, flags: GetFlags, timeout: Duration) -> Result<OperationParams, CoordinatorError> {
        let partition_id: PartitionId = self.cluster_map.partition_for(blob_id);
        let replicas = self
            .cluster_map
            .replicas_for(partition_id)
            .map_err(|err| CoordinatorError::UnexpectedInternalError(err.to_string()))?;
        let (replicas_local, replicas_remote) = split_by_datacenter(replicas, self.cluster_map.local_datacenter());
        Ok(OperationParams {
            client_id: self.client_id,
            partition_id,
            blob_id,
            flags,
            replicas_local,
            replicas_remote,
            operation_timeout: timeout,
            parallelism: self.parallelism,
            success_target: self.success_target,
        })
    }

    /// Fetches the blob payload.
    #[instrument(skip(self), fields(%blob_id))]
    pub async fn get_blob(&self, blob_id: BlobId, timeout: Duration) -> Result<Bytes, CoordinatorError> {
        let params = self.operation_params(blob_id, GetFlags::Blob, timeout)?;
        match Operation::new(Arc::clone(&self.pool)).execute(params).await? {
            GetResult::Blob(bytes) => Ok(bytes),
            other => Err(unexpected_shape("Blob", &other)),
        }
    }

    /// Fetches blob properties (size, expiration) without the payload.
    #[instrument(skip(self), fields(%blob_id))]
    pub async fn get_blob_properties(&self, blob_id: BlobId, timeout: Duration) -> Result<MessageInfo, CoordinatorError> {
        let params = self.operation_params(blob_id, GetFlags::BlobProperties, timeout)?;
        match Operation::new(Arc::clone(&self.pool)).execute(params).await? {
            GetResult::BlobProperties(info) => Ok(info),
            other => Err(unexpected_shape("BlobProperties", &other)),
        }
    }

    /// Fetches the blob's opaque user metadata.
    #[instrument(skip(self), fields(%blob_id))]
    pub async fn get_user_metadata(&self, blob_id: BlobId, timeout: Duration) -> Result<Bytes, CoordinatorError> {
        let params = self.operation_params(blob_id, GetFlags::BlobUserMetadata, timeout)?;
        match Operation::new(Arc::clone(&self.pool)).execute(params).await? {
            GetResult::BlobUserMetadata(bytes) => Ok(bytes),
            other => Err(unexpected_shape("BlobUserMetadata", &other)),
        }
    }
}

/// A replica sent back a `GetResult` variant that does not match the
/// `GetFlags` the request asked for. Every replica in a partition is
/// expected to honor the same flags, so this is a protocol violation,
/// not a retryable condition.
fn unexpected_shape(expected: &str, got: &GetResult) -> CoordinatorError {
    CoordinatorError::UnexpectedInternalError(format!("expected {expected} result, got {got:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobcoord_cluster::StaticClusterMap;
    use blobcoord_types::{DatacenterId, PartitionId};
    use fakes::{FakeConnectionPool, ScriptedResponse};

    fn replica(node: u32, dc: u16) -> ReplicaId {
        ReplicaId::new(node, DatacenterId(dc))
    }

    #[tokio::test]
    async fn get_blob_resolves_through_cluster_map_and_pool() {
        let local_dc = DatacenterId(1);
        let r1 = replica(1, 1);
        let partition = PartitionId(7);
        let cluster_map = Arc::new(StaticClusterMap::new(local_dc).with_partition(partition, vec![r1]));

        let pool = Arc::new(FakeConnectionPool::new());
        pool.script(r1, ScriptedResponse::Blob(Bytes::from_static(b"payload")));

        let coordinator = Coordinator::new(cluster_map, pool, ClientId(1));
        let blob_id = BlobId::from_partition_and_local(partition, 1);
        let result = coordinator.get_blob(blob_id, Duration::from_millis(500)).await.unwrap();
        assert_eq!(result, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn get_blob_properties_resolves_through_cluster_map_and_pool() {
        let local_dc = DatacenterId(1);
        let r1 = replica(1, 1);
        let partition = PartitionId(7);
        let cluster_map = Arc::new(StaticClusterMap::new(local_dc).with_partition(partition, vec![r1]));
        let blob_id = BlobId::from_partition_and_local(partition, 1);

        let pool = Arc::new(FakeConnectionPool::new());
        let info = MessageInfo {
            blob_id,
            size: 42,
            expiration_time_ms: Some(9_000),
        };
        pool.script(r1, ScriptedResponse::BlobProperties(info.clone()));

        let coordinator = Coordinator::new(cluster_map, pool, ClientId(1));
        let result = coordinator.get_blob_properties(blob_id, Duration::from_millis(500)).await.unwrap();
        assert_eq!(result, info);
    }

    #[tokio::test]
    async fn unknown_partition_surfaces_as_unexpected_internal_error() {
        let cluster_map = Arc::new(StaticClusterMap::new(DatacenterId(1)));
        let pool = Arc::new(FakeConnectionPool::new());
        let coordinator = Coordinator::new(cluster_map, pool, ClientId(1));

        let blob_id = BlobId::from_partition_and_local(PartitionId(99), 1);
        let err = coordinator.get_blob(blob_id, Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::UnexpectedInternalError(_)));
    }
}
