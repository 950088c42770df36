//! Wren application settings
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::bridge::{BridgeConfig, DispatchMode, GroupName};
use crate::config_error;
use crate::error::Result;
use crate::invalidation::InvalidationSource;
use crate::node::NodeName;
use crate::transport::ClusterTransport;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8420;
pub const DEFAULT_PORT_HTTP: &str = "8420";
pub const DEFAULT_PARTITION_NAME: &str = "DefaultPartition";
pub const DEFAULT_BRIDGE_NAME: &str = "DefaultJGBridge";
pub const DEFAULT_HANDLER_PREFIX: &str = "DCacheBridge";
pub const DEFAULT_RPC_TIMEOUT_MS: &str = "5000";
pub const DEFAULT_NODES: &str = "node-a,node-b";

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port: u16,

    // Cluster partition every hosted node joins
    pub partition_name: String,

    // Bridge identity: the handler name is "<handler_prefix>-<bridge_name>"
    pub bridge_name: String,
    pub handler_prefix: String,

    // Nodes hosted in this process, in join order
    pub nodes: Vec<NodeName>,

    // Invalidation groups created on every node at boot
    pub groups: Vec<GroupName>,

    // Transport-owned timeout for synchronous RPCs
    pub rpc_timeout_ms: u64,

    // Dispatch mode for API-triggered invalidations that do not pick one
    pub async_invalidation: bool,

    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: STANDARD_PORT_HTTP,
            partition_name: DEFAULT_PARTITION_NAME.to_string(),
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
            handler_prefix: DEFAULT_HANDLER_PREFIX.to_string(),
            nodes: DEFAULT_NODES.split(',').map(NodeName::from).collect(),
            groups: Vec::new(),
            rpc_timeout_ms: 5000,
            async_invalidation: false,
            log_json: false,
        }
    }
}

impl Settings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        DispatchMode::from_async_flag(self.async_invalidation)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge_name.trim().is_empty() {
            return Err(config_error!("bridge name must not be empty"));
        }
        if self.handler_prefix.trim().is_empty() {
            return Err(config_error!("handler prefix must not be empty"));
        }
        if self.nodes.is_empty() {
            return Err(config_error!("at least one node is required"));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(config_error!("rpc timeout must be positive"));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.is_empty() {
                return Err(config_error!("node names must not be empty"));
            }
            if !seen.insert(node) {
                return Err(config_error!("node {} listed twice", node));
            }
        }
        Ok(())
    }

    /// Bridge configuration for one hosted node
    pub fn bridge_config(
        &self,
        transport: Arc<dyn ClusterTransport>,
        source: Arc<dyn InvalidationSource>,
    ) -> BridgeConfig {
        BridgeConfig::new(self.bridge_name.clone())
            .with_handler_prefix(self.handler_prefix.clone())
            .with_transport(transport)
            .with_invalidation_source(source)
    }
}
