//! Invalidation Relay
//!
//! Outbound, it decides per invalidation whether the target group exists on
//! any other node and only then sends it to the cluster. Inbound, it decodes
//! RPCs from peers and hands them to the local invalidation source as-is;
//! the sender already decided relevance.
//!
//! Delivery is best-effort: a failed dispatch is logged and dropped.
use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::directory::GroupDirectory;
use super::messages::{BatchInvalidation, BridgeRpc, CacheKey, DispatchMode, GroupName, RpcPacket};
use crate::dispatch_error;
use crate::error::Result;
use crate::invalidation::BridgeSubscription;
use crate::node::NodeName;
use crate::transport::{ClusterTransport, RpcRequest};

/// Keep only the batch items whose group is bridged
pub fn filter_bridged(
    items: Vec<BatchInvalidation>,
    bridged: &BTreeSet<GroupName>,
) -> Vec<BatchInvalidation> {
    items
        .into_iter()
        .filter(|item| bridged.contains(&item.group))
        .collect()
}

/// What happened to an outbound invalidation
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum RelayOutcome {
    /// No other node has the group; nothing was sent
    Skipped,
    /// Handed to the cluster transport
    Sent,
    /// The dispatch failed and was dropped
    Failed,
}

pub struct InvalidationRelay {
    node: NodeName,
    transport: Arc<dyn ClusterTransport>,
    directory: Arc<GroupDirectory>,
}

impl std::fmt::Debug for InvalidationRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationRelay")
            .field("node", &self.node)
            .field("handler_name", &self.directory.handler_name())
            .finish()
    }
}

impl InvalidationRelay {
    pub fn new(transport: Arc<dyn ClusterTransport>, directory: Arc<GroupDirectory>) -> Self {
        Self {
            node: transport.node_name(),
            transport,
            directory,
        }
    }

    pub async fn invalidate(
        &self,
        group: GroupName,
        key: CacheKey,
        mode: DispatchMode,
    ) -> RelayOutcome {
        if !self.directory.is_bridged(&group) {
            return RelayOutcome::Skipped;
        }
        self.send(BridgeRpc::InvalidateOne { group, key }, mode)
            .await
    }

    pub async fn invalidate_many(
        &self,
        group: GroupName,
        keys: Vec<CacheKey>,
        mode: DispatchMode,
    ) -> RelayOutcome {
        if !self.directory.is_bridged(&group) {
            return RelayOutcome::Skipped;
        }
        self.send(BridgeRpc::InvalidateMany { group, keys }, mode)
            .await
    }

    pub async fn invalidate_all(&self, group: GroupName, mode: DispatchMode) -> RelayOutcome {
        if !self.directory.is_bridged(&group) {
            return RelayOutcome::Skipped;
        }
        self.send(BridgeRpc::InvalidateAll { group }, mode).await
    }

    pub async fn batch_invalidate(
        &self,
        items: Vec<BatchInvalidation>,
        mode: DispatchMode,
    ) -> RelayOutcome {
        let items = filter_bridged(items, &self.directory.bridged_groups());
        if items.is_empty() {
            return RelayOutcome::Skipped;
        }
        self.send(BridgeRpc::BatchInvalidate { items }, mode)
            .await
    }

    async fn send(&self, op: BridgeRpc, mode: DispatchMode) -> RelayOutcome {
        let op_name = op.op_name();
        match self.dispatch(op, mode).await {
            Ok(()) => {
                debug!(
                    "[{}/{}] Sent {} ({:?})",
                    self.node,
                    self.directory.handler_name(),
                    op_name,
                    mode
                );
                RelayOutcome::Sent
            }
            Err(e) => {
                debug!(
                    "[{}/{}] Dropping {} after failed dispatch: {}",
                    self.node,
                    self.directory.handler_name(),
                    op_name,
                    e
                );
                RelayOutcome::Failed
            }
        }
    }

    async fn dispatch(&self, op: BridgeRpc, mode: DispatchMode) -> Result<()> {
        let payload = RpcPacket::new(self.node.clone(), op)
            .serialize()
            .map_err(|e| dispatch_error!("encoding failed: {}", e))?;
        self.transport
            .call_method_on_cluster(self.directory.handler_name(), Bytes::from(payload), mode)
            .await
            .map_err(|e| dispatch_error!(e))
    }

    /// Decode an inbound RPC, deliver it and acknowledge synchronous callers
    pub async fn handle_request(&self, request: RpcRequest, sink: &dyn BridgeSubscription) {
        let RpcRequest {
            origin,
            payload,
            resp_chan,
        } = request;

        let result = match RpcPacket::deserialize(&payload) {
            Ok(packet) => {
                debug!(
                    "[{}/{}] Received {} from {}",
                    self.node,
                    self.directory.handler_name(),
                    packet.op.op_name(),
                    packet.sender
                );
                if packet.sender != origin {
                    warn!(
                        "[{}/{}] Packet from {} arrived via {}",
                        self.node,
                        self.directory.handler_name(),
                        packet.sender,
                        origin
                    );
                }
                deliver(packet.op, sink).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    "[{}/{}] Undecodable RPC from {}: {}",
                    self.node,
                    self.directory.handler_name(),
                    origin,
                    e
                );
                Err(e)
            }
        };

        if let Some(resp_chan) = resp_chan {
            if resp_chan.send(result).is_err() {
                debug!(
                    "[{}/{}] Caller {} stopped waiting for acknowledgment",
                    self.node,
                    self.directory.handler_name(),
                    origin
                );
            }
        }
    }
}

/// Forward a remote operation to the local source without re-checking relevance
pub async fn deliver(op: BridgeRpc, sink: &dyn BridgeSubscription) {
    match op {
        BridgeRpc::InvalidateOne { group, key } => sink.invalidate(group, key).await,
        BridgeRpc::InvalidateMany { group, keys } => sink.invalidate_many(group, keys).await,
        BridgeRpc::InvalidateAll { group } => sink.invalidate_all(group).await,
        BridgeRpc::BatchInvalidate { items } => sink.batch_invalidate(items).await,
    }
}
