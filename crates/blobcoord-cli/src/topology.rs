//! Cluster topology: which replicas back each partition, and where each
//! replica listens. Not part of `blobcoord-config`'s tuning knobs — this
//! describes cluster membership, which `kimberlite-cli`'s own `init`/
//! `start` commands likewise keep in a separate file from the server's
//! own `config.toml` (see `commands::init::Config` there).

use anyhow::{Context, Result};
use blobcoord_cluster::{ClusterMap, StaticClusterMap};
use blobcoord_types::{DatacenterId, PartitionId, ReplicaId};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct TopologyFile {
    pub local_datacenter: u16,
    #[serde(default)]
    pub partitions: Vec<PartitionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PartitionEntry {
    pub partition: u32,
    pub replicas: Vec<ReplicaEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ReplicaEntry {
    pub node: u32,
    pub datacenter: u16,
    pub address: SocketAddr,
}

impl TopologyFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read topology file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse topology file {}", path.display()))
    }

    /// Builds the `ClusterMap` every operation consults for partition
    /// routing.
    pub fn cluster_map(&self) -> StaticClusterMap {
        let mut map = StaticClusterMap::new(DatacenterId(self.local_datacenter));
        for entry in &self.partitions {
            let replicas = entry.replicas.iter().map(|r| ReplicaId::new(r.node, DatacenterId(r.datacenter))).collect();
            map = map.with_partition(PartitionId(entry.partition), replicas);
        }
        map
    }

    /// Builds the replica -> address table the connection pool dials.
    pub fn addresses(&self) -> HashMap<ReplicaId, SocketAddr> {
        let mut addresses = HashMap::new();
        for entry in &self.partitions {
            for replica in &entry.replicas {
                addresses.insert(ReplicaId::new(replica.node, DatacenterId(replica.datacenter)), replica.address);
            }
        }
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_topology() {
        let toml = r#"
            local_datacenter = 1

            [[partitions]]
            partition = 1
            replicas = [
                { node = 1, datacenter = 1, address = "127.0.0.1:9001" },
                { node = 2, datacenter = 2, address = "127.0.0.1:9002" },
            ]
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(&path, toml).unwrap();

        let topology = TopologyFile::load(&path).unwrap();
        let map = topology.cluster_map();
        assert_eq!(map.local_datacenter(), DatacenterId(1));
        assert_eq!(map.replicas_for(PartitionId(1)).unwrap().len(), 2);
        assert_eq!(topology.addresses().len(), 2);
    }
}
