//! Membership Janitor
//!
//! After a membership change, the master replica of the bridge's channel
//! removes the distributed-state entries of nodes that are no longer
//! replicants. Every other node does nothing, so each change is cleaned up
//! exactly once. The removals in turn make every node recompute its bridged
//! groups.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::node::NodeName;
use crate::state_sync_error;
use crate::transport::{ClusterTransport, ReplicantEvent};

pub struct MembershipJanitor {
    node: NodeName,
    handler_name: String,
    transport: Arc<dyn ClusterTransport>,
}

impl std::fmt::Debug for MembershipJanitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipJanitor")
            .field("node", &self.node)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

impl MembershipJanitor {
    pub fn new(handler_name: String, transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            node: transport.node_name(),
            handler_name,
            transport,
        }
    }

    /// React to a replicant change; returns the keys this node pruned
    pub async fn on_replicants_changed(&self, event: ReplicantEvent) -> Vec<String> {
        if event.service != self.handler_name {
            return Vec::new();
        }

        match self.transport.is_master_replica(&self.handler_name).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    "[{}/{}] Not master replica, leaving view {} to the master",
                    self.node, self.handler_name, event.view_id
                );
                return Vec::new();
            }
            Err(e) => {
                warn!(
                    "[{}/{}] Master replica check failed: {}",
                    self.node, self.handler_name, e
                );
                return Vec::new();
            }
        }

        match self.prune(&event.replicants).await {
            Ok(pruned) => {
                if !pruned.is_empty() {
                    info!(
                        "[{}/{}] Pruned entries of departed nodes {:?} (view {})",
                        self.node, self.handler_name, pruned, event.view_id
                    );
                }
                pruned
            }
            Err(e) => {
                warn!("[{}/{}] Pruning skipped: {}", self.node, self.handler_name, e);
                Vec::new()
            }
        }
    }

    /// Remove every entry whose key is not among `replicants`.
    /// A failed removal is logged and does not stop the others.
    pub async fn prune(&self, replicants: &[NodeName]) -> Result<Vec<String>> {
        let keys = self
            .transport
            .state_keys(&self.handler_name)
            .await
            .map_err(|e| state_sync_error!("listing {} failed: {}", self.handler_name, e))?;

        let mut pruned = Vec::new();
        for key in keys {
            if replicants.iter().any(|node| node.as_str() == key) {
                continue;
            }
            match self.transport.state_remove(&self.handler_name, &key).await {
                Ok(_) => pruned.push(key),
                Err(e) => warn!(
                    "[{}/{}] Failed removing stale entry {}: {}",
                    self.node, self.handler_name, key, e
                ),
            }
        }
        Ok(pruned)
    }
}
