//! Cluster Transport
//!
//! The group-communication substrate the bridge runs on: membership of
//! replicants per service, a replicated key/value store scoped by category
//! with change notifications, and RPC dispatch to a handler registered on
//! every node under a service name.
//!
//! Notifications are delivered as typed event channels handed out at
//! registration time. Dropping the transport side of a channel (on
//! unregistration) ends the consumer's loop.

pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::bridge::messages::DispatchMode;
use crate::error::Result;
use crate::node::NodeName;

pub use local::{FrozenTransportStats, LocalPartition, LocalTransport, TransportStats};

/// Handle identifying a registered listener, used to unregister it
pub type ListenerId = u64;

/// An inbound RPC. Synchronous calls carry a channel for the acknowledgment.
#[derive(Debug)]
pub struct RpcRequest {
    pub origin: NodeName,
    pub payload: Bytes,
    pub resp_chan: Option<oneshot::Sender<Result<()>>>,
}

/// Change notification for a distributed-state category
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateEvent {
    ValueChanged { category: String, key: String },
    KeyRemoved { category: String, key: String },
}

impl StateEvent {
    pub fn category(&self) -> &str {
        match self {
            StateEvent::ValueChanged { category, .. } => category,
            StateEvent::KeyRemoved { category, .. } => category,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StateEvent::ValueChanged { key, .. } => key,
            StateEvent::KeyRemoved { key, .. } => key,
        }
    }
}

/// New replicant list for a service after a membership change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicantEvent {
    pub service: String,
    pub replicants: Vec<NodeName>,
    pub view_id: u64,
}

#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Identity of the local node
    fn node_name(&self) -> NodeName;

    /// Name of the partition this node belongs to
    fn partition_name(&self) -> String;

    /// Register the local handler for `service`; inbound calls arrive on the returned channel
    async fn register_rpc_handler(
        &self,
        service: &str,
    ) -> Result<mpsc::UnboundedReceiver<RpcRequest>>;

    async fn unregister_rpc_handler(&self, service: &str) -> Result<()>;

    /// Call the `service` handler on every other node. Sync waits for all acknowledgments.
    async fn call_method_on_cluster(
        &self,
        service: &str,
        payload: Bytes,
        mode: DispatchMode,
    ) -> Result<()>;

    async fn state_set(&self, category: &str, key: &str, value: Bytes) -> Result<()>;

    async fn state_get(&self, category: &str, key: &str) -> Result<Option<Bytes>>;

    /// Remove an entry, returning the previous value if there was one
    async fn state_remove(&self, category: &str, key: &str) -> Result<Option<Bytes>>;

    async fn state_keys(&self, category: &str) -> Result<Vec<String>>;

    async fn state_values(&self, category: &str) -> Result<Vec<Bytes>>;

    async fn register_state_listener(
        &self,
        category: &str,
    ) -> Result<(ListenerId, mpsc::UnboundedReceiver<StateEvent>)>;

    async fn unregister_state_listener(&self, category: &str, id: ListenerId) -> Result<()>;

    /// Announce the local node as a replicant of `service`
    async fn add_replicant(&self, service: &str) -> Result<()>;

    async fn remove_replicant(&self, service: &str) -> Result<()>;

    async fn register_replicant_listener(
        &self,
        service: &str,
    ) -> Result<(ListenerId, mpsc::UnboundedReceiver<ReplicantEvent>)>;

    async fn unregister_replicant_listener(&self, service: &str, id: ListenerId) -> Result<()>;

    /// Whether the local node is the elected master replica for `service`
    async fn is_master_replica(&self, service: &str) -> Result<bool>;
}
