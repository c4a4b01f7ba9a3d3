//! Shared value types for the coordinator read path: entity identifiers,
//! server error codes, and the small enums the wire and client crates
//! build on.
//!
//! Identifiers follow the same shape throughout: `Copy`, fixed-width,
//! totally ordered, with a manual `Display` and `From`/`Into` conversions
//! to and from their underlying integer representation.

use std::fmt;

/// Number of bytes in a `BlobId`.
pub const BLOB_ID_LEN: usize = 16;

/// Opaque blob identifier. The high 4 bytes embed the owning
/// [`PartitionId`]; the remaining 12 bytes are a per-partition local id.
/// Stable across retries, totally ordered, encodable on the wire as-is.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId([u8; BLOB_ID_LEN]);

impl BlobId {
    /// Builds a `BlobId` from a partition and a local identifier.
    pub fn from_partition_and_local(partition: PartitionId, local: u128) -> Self {
        let mut bytes = [0u8; BLOB_ID_LEN];
        bytes[0..4].copy_from_slice(&partition.0.to_be_bytes());
        // local only has 12 bytes of room; truncate to the low 96 bits.
        let local_bytes = local.to_be_bytes();
        bytes[4..16].copy_from_slice(&local_bytes[4..16]);
        Self(bytes)
    }

    /// Raw byte representation, as it appears on the wire.
    pub fn as_bytes(&self) -> &[u8; BLOB_ID_LEN] {
        &self.0
    }

    /// Builds a `BlobId` from raw wire bytes.
    pub fn from_bytes(bytes: [u8; BLOB_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// The partition this blob id was minted for.
    pub fn partition(&self) -> PartitionId {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.0[0..4]);
        PartitionId(u32::from_be_bytes(buf))
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({self})")
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl serde::Serialize for BlobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&self.0, serializer)
    }
}

impl<'de> serde::Deserialize<'de> for BlobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <[u8; BLOB_ID_LEN]>::deserialize(deserializer)?;
        Ok(Self(bytes))
    }
}

/// Identifies a logical partition: a set of replicas jointly responsible
/// for a range of blob ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition-{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<PartitionId> for u32 {
    fn from(value: PartitionId) -> Self {
        value.0
    }
}

/// Identifies a datacenter by a short numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct DatacenterId(pub u16);

impl fmt::Display for DatacenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc-{}", self.0)
    }
}

impl From<u16> for DatacenterId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Addresses one replica server: a node id within a datacenter. Equality
/// compares both fields — two replicas in different datacenters never
/// compare equal even if their node id collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ReplicaId {
    pub node: u32,
    pub datacenter: DatacenterId,
}

impl ReplicaId {
    pub fn new(node: u32, datacenter: DatacenterId) -> Self {
        Self { node, datacenter }
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}@{}", self.node, self.datacenter)
    }
}

/// Per-attempt correlation id. Minted fresh for each `OperationRequest`
/// dispatch so retried attempts remain distinguishable in server logs
/// (see DESIGN.md's resolution of the correlation-id open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CorrelationId(pub u64);

impl CorrelationId {
    /// Mints a fresh, process-wide-random correlation id.
    pub fn generate() -> Self {
        Self(Self::from_random_bytes(random_u64_bytes()))
    }

    /// Pure constructor used by `generate()` and by tests that want a
    /// deterministic id from known bytes.
    pub fn from_random_bytes(bytes: [u8; 8]) -> u64 {
        u64::from_le_bytes(bytes)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn random_u64_bytes() -> [u8; 8] {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).expect("system RNG unavailable");
    buf
}

/// Identifies the client issuing an operation. Opaque to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// What portion of a blob's data a Get request wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GetFlags {
    Blob,
    BlobProperties,
    BlobUserMetadata,
    All,
}

/// Server-reported outcome of a single replica attempt, as carried on the
/// wire. Codes not in this list collapse to `Unknown` and are treated as
/// `UnexpectedInternalError` by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ServerErrorCode {
    NoError,
    IoError,
    DataCorrupt,
    BlobNotFound,
    BlobDeleted,
    BlobExpired,
    Unknown(u16),
}

/// Metadata about one blob message, as returned in a Get response's
/// `message_info_list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageInfo {
    pub blob_id: BlobId,
    pub size: u64,
    pub expiration_time_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn blob_id_round_trips_partition() {
        let partition = PartitionId(42);
        let blob_id = BlobId::from_partition_and_local(partition, 7);
        assert_eq!(blob_id.partition(), partition);
    }

    #[test]
    fn blob_id_display_is_hex() {
        let id = BlobId::from_bytes([0xab; BLOB_ID_LEN]);
        assert_eq!(id.to_string(), "ab".repeat(BLOB_ID_LEN));
    }

    #[test]
    fn blob_id_ordering_is_total() {
        let a = BlobId::from_partition_and_local(PartitionId(1), 1);
        let b = BlobId::from_partition_and_local(PartitionId(1), 2);
        assert!(a < b);
    }

    #[test_case(1, 2, false; "different node same dc")]
    #[test_case(1, 1, true; "same node same dc")]
    fn replica_id_equality(node_a: u32, node_b: u32, expect_eq: bool) {
        let dc = DatacenterId(1);
        let a = ReplicaId::new(node_a, dc);
        let b = ReplicaId::new(node_b, dc);
        assert_eq!(a == b, expect_eq);
    }

    #[test]
    fn replica_id_datacenter_distinguishes_equal_nodes() {
        let a = ReplicaId::new(1, DatacenterId(1));
        let b = ReplicaId::new(1, DatacenterId(2));
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_id_generate_is_not_constant() {
        let a = CorrelationId::generate();
        let b = CorrelationId::generate();
        assert_ne!(a, b, "two generated ids colliding is astronomically unlikely");
    }

    #[test]
    fn blob_id_serde_round_trip() {
        let id = BlobId::from_partition_and_local(PartitionId(9), 123);
        let json = serde_json::to_string(&id).unwrap();
        let back: BlobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
