//! Cluster membership and partition→replica topology.
//!
//! `ClusterMap` is a read-only lookup: given a blob id, find its
//! partition; given a partition, list its replicas. Membership is
//! immutable during an operation — readers never coordinate with each
//! other or with a writer.

use blobcoord_types::{BlobId, DatacenterId, PartitionId, ReplicaId};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("partition {0} not found in cluster map")]
    PartitionNotFound(PartitionId),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Read-only partition→replica topology lookup.
///
/// Implementations must be cheap to call from multiple operations
/// concurrently: the contract the rest of the coordinator relies on is
/// that this trait is effectively immutable for the lifetime of any one
/// `Operation`.
pub trait ClusterMap: Send + Sync {
    /// Resolves the partition that owns a blob id.
    fn partition_for(&self, blob_id: BlobId) -> PartitionId {
        blob_id.partition()
    }

    /// Lists the replicas of a partition, or `Err` if the partition is
    /// unknown to this map.
    fn replicas_for(&self, partition: PartitionId) -> ClusterResult<&[ReplicaId]>;

    /// The datacenter this coordinator instance runs in, used to order
    /// local-DC replicas ahead of remote ones.
    fn local_datacenter(&self) -> DatacenterId;
}

/// An immutable, in-memory topology built once at startup.
#[derive(Debug, Clone)]
pub struct StaticClusterMap {
    partitions: HashMap<PartitionId, Vec<ReplicaId>>,
    local_datacenter: DatacenterId,
}

impl StaticClusterMap {
    pub fn new(local_datacenter: DatacenterId) -> Self {
        Self {
            partitions: HashMap::new(),
            local_datacenter,
        }
    }

    /// Registers a partition's replica set. Replaces any prior entry for
    /// the same partition.
    pub fn with_partition(mut self, partition: PartitionId, replicas: Vec<ReplicaId>) -> Self {
        self.partitions.insert(partition, replicas);
        self
    }
}

impl ClusterMap for StaticClusterMap {
    fn replicas_for(&self, partition: PartitionId) -> ClusterResult<&[ReplicaId]> {
        self.partitions
            .get(&partition)
            .map(Vec::as_slice)
            .ok_or(ClusterError::PartitionNotFound(partition))
    }

    fn local_datacenter(&self) -> DatacenterId {
        self.local_datacenter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(node: u32, dc: u16) -> ReplicaId {
        ReplicaId::new(node, DatacenterId(dc))
    }

    #[test]
    fn looks_up_registered_partition() {
        let map = StaticClusterMap::new(DatacenterId(1))
            .with_partition(PartitionId(1), vec![replica(1, 1), replica(2, 2)]);

        let replicas = map.replicas_for(PartitionId(1)).unwrap();
        assert_eq!(replicas.len(), 2);
    }

    #[test]
    fn unknown_partition_is_an_error() {
        let map = StaticClusterMap::new(DatacenterId(1));
        let err = map.replicas_for(PartitionId(9)).unwrap_err();
        assert!(matches!(err, ClusterError::PartitionNotFound(PartitionId(9))));
    }

    #[test]
    fn blob_id_resolves_to_its_embedded_partition() {
        let map = StaticClusterMap::new(DatacenterId(1));
        let blob_id = BlobId::from_partition_and_local(PartitionId(42), 1);
        assert_eq!(map.partition_for(blob_id), PartitionId(42));
    }
}
