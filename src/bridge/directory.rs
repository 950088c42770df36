//! Group Directory
//!
//! Publishes the local node's invalidation groups into the distributed state
//! and folds every other node's published groups into the "bridged groups"
//! snapshot the relay gates on.
//!
//! The snapshot is an immutable set swapped wholesale on every recompute, so
//! readers never lock and never see a half-built set. Each recompute is
//! derived from the store alone, never from the previous snapshot, which is
//! what lets group removals propagate.
use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use tracing::{debug, warn};

use super::messages::{GroupName, NodeInfo};
use crate::error::Result;
use crate::invalidation::InvalidationSource;
use crate::node::NodeName;
use crate::state_sync_error;
use crate::transport::ClusterTransport;

/// Union of the groups published by every node other than `local`
pub fn union_remote_groups<I>(local: &NodeName, infos: I) -> BTreeSet<GroupName>
where
    I: IntoIterator<Item = NodeInfo>,
{
    infos
        .into_iter()
        .filter(|info| info.node_id != *local)
        .flat_map(|info| info.groups)
        .collect()
}

pub struct GroupDirectory {
    node: NodeName,
    handler_name: String,
    transport: Arc<dyn ClusterTransport>,
    source: Arc<dyn InvalidationSource>,
    bridged: ArcSwap<BTreeSet<GroupName>>,
}

impl std::fmt::Debug for GroupDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupDirectory")
            .field("node", &self.node)
            .field("handler_name", &self.handler_name)
            .field("bridged", &self.bridged.load_full())
            .finish()
    }
}

impl GroupDirectory {
    pub fn new(
        handler_name: String,
        transport: Arc<dyn ClusterTransport>,
        source: Arc<dyn InvalidationSource>,
    ) -> Self {
        Self {
            node: transport.node_name(),
            handler_name,
            transport,
            source,
            bridged: ArcSwap::from_pointee(BTreeSet::new()),
        }
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Current snapshot of the groups known to exist on other nodes
    pub fn bridged_groups(&self) -> Arc<BTreeSet<GroupName>> {
        self.bridged.load_full()
    }

    pub fn is_bridged(&self, group: &GroupName) -> bool {
        self.bridged.load().contains(group)
    }

    /// Publish this node's groups, or withdraw its entry when it has none
    pub async fn publish_local_groups(&self) -> Result<()> {
        let groups: BTreeSet<GroupName> = self
            .source
            .invalidation_groups()
            .await
            .into_iter()
            .collect();
        let key = self.node.as_str();

        if groups.is_empty() {
            debug!(
                "[{}/{}] No local groups, withdrawing node entry",
                self.node, self.handler_name
            );
            self.transport
                .state_remove(&self.handler_name, key)
                .await
                .map_err(|e| state_sync_error!("withdraw of {} failed: {}", key, e))?;
            return Ok(());
        }

        debug!(
            "[{}/{}] Publishing {} local groups",
            self.node,
            self.handler_name,
            groups.len()
        );
        let info = NodeInfo::new(self.node.clone(), groups);
        let value = Bytes::from(info.encode()?);
        self.transport
            .state_set(&self.handler_name, key, value)
            .await
            .map_err(|e| state_sync_error!("publish of {} failed: {}", key, e))
    }

    /// Rebuild the bridged-groups snapshot from the distributed state.
    /// On a read failure the previous snapshot stays in place.
    pub async fn recompute_bridged_groups(&self) -> Result<()> {
        let values = self
            .transport
            .state_values(&self.handler_name)
            .await
            .map_err(|e| state_sync_error!("read of {} failed: {}", self.handler_name, e))?;

        let infos = values
            .iter()
            .filter_map(|value| match NodeInfo::decode(value) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(
                        "[{}/{}] Skipping undecodable node entry: {}",
                        self.node, self.handler_name, e
                    );
                    None
                }
            });
        let bridged = union_remote_groups(&self.node, infos);

        debug!(
            "[{}/{}] Bridged groups now {:?}",
            self.node, self.handler_name, bridged
        );
        self.bridged.store(Arc::new(bridged));
        Ok(())
    }

    /// Put this node's entry back after someone else removed it.
    /// Returns false when the node owns no groups and so has no entry.
    pub async fn restore_local_entry(&self) -> Result<bool> {
        let groups = self.source.invalidation_groups().await;
        if groups.is_empty() {
            return Ok(false);
        }
        warn!(
            "[{}/{}] Own node entry was removed while live, republishing",
            self.node, self.handler_name
        );
        self.publish_local_groups().await?;
        Ok(true)
    }

    /// Remove this node's own entry from the distributed state
    pub async fn withdraw_local_entry(&self) -> Result<()> {
        self.transport
            .state_remove(&self.handler_name, self.node.as_str())
            .await
            .map(|_| ())
            .map_err(|e| state_sync_error!("withdraw of {} failed: {}", self.node, e))
    }

    /// Forget the snapshot
    pub fn clear(&self) {
        self.bridged.store(Arc::new(BTreeSet::new()));
    }
}
