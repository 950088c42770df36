//! Bridge Message Protocol
//!
//! Types that cross the cluster transport: the per-node `NodeInfo` record
//! published into the distributed state, and the closed set of RPC
//! operations carried on the bridge's handler channel.
//!
//! Both are encoded with bincode for compact binary payloads. The management
//! API uses serde_json for the same types where they are exposed.
use std::collections::BTreeSet;

use bincode::config::Config;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::NodeName;

/// Upper bound on a decoded payload. Length prefixes claiming more than this
/// are rejected before anything is allocated.
pub const MAX_WIRE_BYTES: usize = 4 * 1024 * 1024;

/// Encoding shared by every payload that crosses the transport
fn wire_config() -> impl Config {
    bincode::config::standard()
        .with_big_endian()
        .with_limit::<MAX_WIRE_BYTES>()
}

/// Name of a logical cache region that is invalidated as a unit
#[derive(
    Clone, Debug, Decode, Encode, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupName {
    fn from(name: &str) -> Self {
        GroupName::new(name.to_string())
    }
}

impl From<String> for GroupName {
    fn from(name: String) -> Self {
        GroupName::new(name)
    }
}

impl std::fmt::Display for GroupName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque cache key; the bridge never looks inside it
#[derive(
    Clone, Debug, Decode, Encode, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.as_bytes().to_vec())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key.into_bytes())
    }
}

impl From<Vec<u8>> for CacheKey {
    fn from(bytes: Vec<u8>) -> Self {
        CacheKey(bytes)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Whether an RPC waits for remote acknowledgment
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DispatchMode {
    #[default]
    Sync,
    Async,
}

impl DispatchMode {
    pub fn from_async_flag(asynchronous: bool) -> Self {
        if asynchronous {
            DispatchMode::Async
        } else {
            DispatchMode::Sync
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, DispatchMode::Async)
    }
}

/// Record of the invalidation groups active on one node.
///
/// Stored under the category named after the bridge's RPC handler, keyed by
/// `node_id`. An entry only exists while its node owns at least one group.
#[derive(Clone, Debug, Decode, Encode, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: NodeName,
    pub groups: BTreeSet<GroupName>,
}

impl NodeInfo {
    pub fn new(node_id: NodeName, groups: BTreeSet<GroupName>) -> Self {
        Self { node_id, groups }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, wire_config())?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let (info, _) = bincode::decode_from_slice(data, wire_config())?;
        Ok(info)
    }
}

/// One group's share of a batched invalidation
#[derive(Clone, Debug, Decode, Encode, Deserialize, Serialize, PartialEq, Eq)]
pub struct BatchInvalidation {
    pub group: GroupName,
    pub keys: Vec<CacheKey>,
}

impl BatchInvalidation {
    pub fn new(group: GroupName, keys: Vec<CacheKey>) -> Self {
        Self { group, keys }
    }
}

/// Operations carried on the bridge's handler channel
#[derive(Clone, Debug, Decode, Encode, PartialEq, Eq)]
pub enum BridgeRpc {
    InvalidateOne { group: GroupName, key: CacheKey },
    InvalidateMany { group: GroupName, keys: Vec<CacheKey> },
    InvalidateAll { group: GroupName },
    BatchInvalidate { items: Vec<BatchInvalidation> },
}

impl BridgeRpc {
    pub fn op_name(&self) -> &'static str {
        match self {
            BridgeRpc::InvalidateOne { .. } => "invalidate-one",
            BridgeRpc::InvalidateMany { .. } => "invalidate-many",
            BridgeRpc::InvalidateAll { .. } => "invalidate-all",
            BridgeRpc::BatchInvalidate { .. } => "batch-invalidate",
        }
    }
}

/// RpcPacket wraps an operation for network transmission
#[derive(Clone, Debug, Decode, Encode)]
pub struct RpcPacket {
    pub sender: NodeName,
    pub op: BridgeRpc,
}

impl RpcPacket {
    pub fn new(sender: NodeName, op: BridgeRpc) -> Self {
        Self { sender, op }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, wire_config())?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let (packet, _) = bincode::decode_from_slice(data, wire_config())?;
        Ok(packet)
    }
}

/// Channel and distributed-state category used by a bridge
pub fn rpc_handler_name(prefix: &str, bridge_name: &str) -> String {
    format!("{}-{}", prefix, bridge_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SerializationError, WrenError};

    #[test]
    fn test_rpc_handler_name() {
        assert_eq!(
            rpc_handler_name("DCacheBridge", "DefaultJGBridge"),
            "DCacheBridge-DefaultJGBridge"
        );
    }

    #[test]
    fn test_batch_packet_serialization() {
        let op = BridgeRpc::BatchInvalidate {
            items: vec![
                BatchInvalidation::new("Orders".into(), vec!["o-1".into(), "o-2".into()]),
                BatchInvalidation::new("Users".into(), vec![]),
            ],
        };
        let packet = RpcPacket::new("node-a".into(), op.clone());

        let serialized = packet.serialize().expect("Failed to serialize packet");
        let deserialized = RpcPacket::deserialize(&serialized).expect("Failed to deserialize");

        assert_eq!(deserialized.sender.as_str(), "node-a");
        assert_eq!(deserialized.op, op);
        assert_eq!(deserialized.op.op_name(), "batch-invalidate");
    }

    #[test]
    fn test_node_info_encoding_is_deterministic() {
        let groups: BTreeSet<GroupName> = ["Users", "Orders"].into_iter().map(Into::into).collect();
        let first = NodeInfo::new("node-b".into(), groups.clone()).encode().unwrap();
        let reversed: BTreeSet<GroupName> =
            ["Orders", "Users"].into_iter().map(Into::into).collect();
        let second = NodeInfo::new("node-b".into(), reversed).encode().unwrap();
        assert_eq!(first, second);

        let decoded = NodeInfo::decode(&first).unwrap();
        assert_eq!(decoded.groups, groups);
    }

    #[test]
    fn test_garbage_payload_is_a_decode_error() {
        let result = RpcPacket::deserialize(&[0xff, 0xff, 0xff]);
        assert!(matches!(
            result,
            Err(WrenError::Serialization(SerializationError::BinaryDecode(_)))
        ));
    }

    fn oversized_length_prefix() -> Vec<u8> {
        // varint marker for a u64 length, then 1 TiB in big-endian
        let mut data = vec![0xFD];
        data.extend_from_slice(&(1u64 << 40).to_be_bytes());
        data
    }

    #[test]
    fn test_oversized_length_prefix_is_rejected() {
        let data = oversized_length_prefix();
        assert!(matches!(
            RpcPacket::deserialize(&data),
            Err(WrenError::Serialization(SerializationError::BinaryDecode(_)))
        ));
        assert!(matches!(
            NodeInfo::decode(&data),
            Err(WrenError::Serialization(SerializationError::BinaryDecode(_)))
        ));
    }

    #[test]
    fn test_oversized_key_list_is_rejected() {
        // a valid sender and group followed by a key count far beyond the limit
        let packet = RpcPacket::new(
            "node-a".into(),
            BridgeRpc::InvalidateMany {
                group: "Orders".into(),
                keys: vec![],
            },
        );
        let mut data = packet.serialize().unwrap();
        assert_eq!(data.pop(), Some(0));
        data.extend_from_slice(&oversized_length_prefix());
        assert!(RpcPacket::deserialize(&data).is_err());
    }

    #[test]
    fn test_dispatch_mode_from_flag() {
        assert_eq!(DispatchMode::from_async_flag(true), DispatchMode::Async);
        assert_eq!(DispatchMode::from_async_flag(false), DispatchMode::Sync);
        assert!(!DispatchMode::default().is_async());
    }
}
