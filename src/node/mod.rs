use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub mod node_name;

use crate::bridge::{BridgeStatus, DispatchMode, GroupName, InvalidationBridge};
use crate::error::{Result, WrenError};
use crate::invalidation::{GroupStats, InvalidationManager};
use crate::settings;
use crate::transport::{FrozenTransportStats, LocalPartition, LocalTransport};
pub use node_name::NodeName;

/// Everything the management API reports about one node
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: NodeName,
    pub bridge: BridgeStatus,
    pub groups: BTreeMap<GroupName, GroupStats>,
    pub transport: FrozenTransportStats,
}

/// One cluster member: its transport handle, its local invalidation
/// groups and the bridge between them
#[derive(Debug)]
pub struct ClusterNode {
    name: NodeName,
    transport: Arc<LocalTransport>,
    manager: InvalidationManager,
    bridge: Arc<InvalidationBridge>,
}

impl ClusterNode {
    /// Join `partition`, create the boot groups and start the bridge
    pub async fn join(
        partition: &Arc<LocalPartition>,
        name: NodeName,
        settings: &settings::Settings,
    ) -> Result<Self> {
        let transport = partition.join(name.clone())?;
        let manager = InvalidationManager::new();
        for group in &settings.groups {
            manager.create_group(group.clone()).await;
        }

        let bridge = Arc::new(InvalidationBridge::new(
            settings.bridge_config(transport.clone(), Arc::new(manager.clone())),
        ));
        bridge.start().await?;
        info!(
            "[{}] Joined partition {} with groups {:?}",
            name,
            partition.name(),
            settings.groups
        );

        Ok(Self {
            name,
            transport,
            manager,
            bridge,
        })
    }

    pub fn name(&self) -> &NodeName {
        &self.name
    }

    pub fn transport(&self) -> &Arc<LocalTransport> {
        &self.transport
    }

    pub fn manager(&self) -> &InvalidationManager {
        &self.manager
    }

    pub fn bridge(&self) -> &Arc<InvalidationBridge> {
        &self.bridge
    }

    pub async fn status(&self) -> NodeStatus {
        NodeStatus {
            name: self.name.clone(),
            bridge: self.bridge.status(),
            groups: self.manager.group_stats().await,
            transport: self.transport.stats(),
        }
    }
}

/// The nodes hosted by this process, all members of one partition
#[derive(Clone, Debug)]
pub struct NodeRegistry {
    partition: Arc<LocalPartition>,
    settings: settings::Settings,
    nodes: Arc<RwLock<BTreeMap<NodeName, Arc<ClusterNode>>>>,
}

impl NodeRegistry {
    pub async fn new(settings: settings::Settings) -> Result<Self> {
        settings.validate()?;
        let partition = LocalPartition::new(settings.partition_name.clone(), settings.rpc_timeout());
        let registry = Self {
            partition,
            settings: settings.clone(),
            nodes: Arc::new(RwLock::new(BTreeMap::new())),
        };
        for name in &settings.nodes {
            registry.add_node(name.clone()).await?;
        }
        info!(
            "[{}] Hosting {} nodes",
            registry.partition.name(),
            settings.nodes.len()
        );
        Ok(registry)
    }

    pub fn partition(&self) -> &Arc<LocalPartition> {
        &self.partition
    }

    pub fn settings(&self) -> &settings::Settings {
        &self.settings
    }

    /// Dispatch mode used when a request does not choose one
    pub fn default_mode(&self) -> DispatchMode {
        self.settings.dispatch_mode()
    }

    pub async fn node(&self, name: &NodeName) -> Result<Arc<ClusterNode>> {
        self.nodes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WrenError::Api(format!("Unknown node {}", name)))
    }

    pub async fn nodes(&self) -> Vec<Arc<ClusterNode>> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Host a new node in the partition
    pub async fn add_node(&self, name: NodeName) -> Result<Arc<ClusterNode>> {
        if name.is_empty() {
            return Err(crate::config_error!("node names must not be empty"));
        }
        let mut nodes = self.nodes.write().await;
        if let Some(existing) = nodes.get(&name) {
            return Ok(existing.clone());
        }
        let node = Arc::new(ClusterNode::join(&self.partition, name.clone(), &self.settings).await?);
        nodes.insert(name, node.clone());
        Ok(node)
    }

    /// Simulate the node disappearing: it drops out of the partition without
    /// stopping its bridge, leaving its state entry for the janitor.
    pub async fn remove_node(&self, name: &NodeName) -> Result<()> {
        let removed = self.nodes.write().await.remove(name);
        if removed.is_none() {
            return Err(WrenError::Api(format!("Unknown node {}", name)));
        }
        if !self.partition.leave(name)? {
            warn!("[{}] Node {} was not a partition member", self.partition.name(), name);
        }
        Ok(())
    }

    /// Stop every hosted bridge
    pub async fn shutdown(&self) {
        for node in self.nodes().await {
            if let Err(e) = node.bridge().stop().await {
                warn!("[{}] Bridge stop failed: {}", node.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeState;

    fn settings(nodes: &[&str], groups: &[&str]) -> settings::Settings {
        settings::Settings {
            nodes: nodes.iter().map(|n| NodeName::from(*n)).collect(),
            groups: groups.iter().map(|g| GroupName::from(*g)).collect(),
            rpc_timeout_ms: 500,
            ..settings::Settings::default()
        }
    }

    #[tokio::test]
    async fn test_registry_starts_every_bridge() {
        let registry = NodeRegistry::new(settings(&["node-a", "node-b"], &["Orders"]))
            .await
            .unwrap();
        let nodes = registry.nodes().await;
        assert_eq!(nodes.len(), 2);
        for node in nodes {
            assert_eq!(node.bridge().state(), BridgeState::Started);
            assert_eq!(node.manager().group_names().await, vec![GroupName::from("Orders")]);
        }
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_node_is_an_api_error() {
        let registry = NodeRegistry::new(settings(&["node-a"], &[])).await.unwrap();
        assert!(matches!(
            registry.node(&"node-z".into()).await,
            Err(WrenError::Api(_))
        ));
        assert!(matches!(
            registry.remove_node(&"node-z".into()).await,
            Err(WrenError::Api(_))
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_node_leaves_partition() {
        let registry = NodeRegistry::new(settings(&["node-a", "node-b"], &[])).await.unwrap();
        registry.remove_node(&"node-b".into()).await.unwrap();
        assert_eq!(registry.partition().members().unwrap(), vec![NodeName::from("node-a")]);
        assert_eq!(registry.nodes().await.len(), 1);
        registry.shutdown().await;
    }
}
