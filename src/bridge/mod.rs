//! Lifecycle Controller
//!
//! `InvalidationBridge` wires the Group Directory, the Invalidation Relay and
//! the Membership Janitor onto a cluster transport and a local invalidation
//! source. While started it owns three background loops, one per
//! notification stream coming from the transport (state changes, replicant
//! changes, inbound RPCs), and a subscription on the local source through
//! which local invalidations reach the relay.
//!
//! State machine: `Stopped -> Starting -> Started -> Stopping -> Stopped`.
//! Configuration can only change while `Stopped`.
pub mod directory;
pub mod janitor;
pub mod messages;
pub mod relay;

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config_error;
use crate::error::{Result, WrenError};
use crate::invalidation::{
    BridgeListener, BridgeSubscription, InvalidationSource, LocalInvalidation,
};
use crate::node::NodeName;
use crate::settings;
use crate::transport::{ClusterTransport, ListenerId, ReplicantEvent, RpcRequest, StateEvent};

pub use directory::GroupDirectory;
pub use janitor::MembershipJanitor;
pub use messages::{
    rpc_handler_name, BatchInvalidation, BridgeRpc, CacheKey, DispatchMode, GroupName, NodeInfo,
    RpcPacket,
};
pub use relay::{InvalidationRelay, RelayOutcome};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeState::Stopped => write!(f, "stopped"),
            BridgeState::Starting => write!(f, "starting"),
            BridgeState::Started => write!(f, "started"),
            BridgeState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Everything a bridge needs to start
#[derive(Clone)]
pub struct BridgeConfig {
    pub bridge_name: String,
    pub handler_prefix: String,
    pub transport: Option<Arc<dyn ClusterTransport>>,
    pub invalidation_source: Option<Arc<dyn InvalidationSource>>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_name: settings::DEFAULT_BRIDGE_NAME.to_string(),
            handler_prefix: settings::DEFAULT_HANDLER_PREFIX.to_string(),
            transport: None,
            invalidation_source: None,
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("bridge_name", &self.bridge_name)
            .field("handler_prefix", &self.handler_prefix)
            .field(
                "transport",
                &self.transport.as_ref().map(|t| t.node_name()),
            )
            .field("invalidation_source", &self.invalidation_source.is_some())
            .finish()
    }
}

impl BridgeConfig {
    pub fn new(bridge_name: impl Into<String>) -> Self {
        Self {
            bridge_name: bridge_name.into(),
            ..Self::default()
        }
    }

    pub fn with_handler_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.handler_prefix = prefix.into();
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ClusterTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_invalidation_source(mut self, source: Arc<dyn InvalidationSource>) -> Self {
        self.invalidation_source = Some(source);
        self
    }

    pub fn handler_name(&self) -> String {
        rpc_handler_name(&self.handler_prefix, &self.bridge_name)
    }

    fn validate(&self) -> Result<(Arc<dyn ClusterTransport>, Arc<dyn InvalidationSource>)> {
        if self.bridge_name.trim().is_empty() {
            return Err(config_error!("bridge name must not be empty"));
        }
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| config_error!("no cluster transport configured"))?;
        let source = self
            .invalidation_source
            .clone()
            .ok_or_else(|| config_error!("no invalidation source configured"))?;
        Ok((transport, source))
    }
}

/// Point-in-time view of a bridge, as served by the management API
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BridgeStatus {
    pub node: Option<NodeName>,
    pub bridge_name: String,
    pub handler_name: String,
    pub partition_name: Option<String>,
    pub state: BridgeState,
    pub bridged_groups: Vec<GroupName>,
    pub started_at: Option<DateTime<Utc>>,
}

/// What has been registered so far, so a failed start or a stop can undo it
#[derive(Default)]
struct Registrations {
    rpc_handler: bool,
    state_listener: Option<ListenerId>,
    replicant_listener: Option<ListenerId>,
    replicant: bool,
    subscription: Option<Arc<dyn BridgeSubscription>>,
}

struct Channels {
    subscription: Arc<dyn BridgeSubscription>,
    rpc: mpsc::UnboundedReceiver<RpcRequest>,
    state: mpsc::UnboundedReceiver<StateEvent>,
    replicants: mpsc::UnboundedReceiver<ReplicantEvent>,
}

struct Running {
    transport: Arc<dyn ClusterTransport>,
    directory: Arc<GroupDirectory>,
    registrations: Registrations,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
struct Active {
    directory: Arc<GroupDirectory>,
    started_at: DateTime<Utc>,
}

pub struct InvalidationBridge {
    config: RwLock<BridgeConfig>,
    state: RwLock<BridgeState>,
    active: RwLock<Option<Active>>,
    // serializes start and stop
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for InvalidationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBridge")
            .field("handler_name", &self.handler_name())
            .field("state", &self.state())
            .finish()
    }
}

impl InvalidationBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: RwLock::new(config),
            state: RwLock::new(BridgeState::Stopped),
            active: RwLock::new(None),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BridgeState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, next: BridgeState) {
        match self.state.write() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn config(&self) -> Result<BridgeConfig> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|e| WrenError::Concurrency(format!("RwLock read fail {}", e)))
    }

    fn active(&self) -> Option<Active> {
        match self.active.read() {
            Ok(active) => active.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_active(&self, next: Option<Active>) {
        match self.active.write() {
            Ok(mut active) => *active = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn update_config<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut BridgeConfig),
    {
        // start moves to Starting under the write guard, so holding the read
        // guard here keeps the config frozen from then on
        let state = self
            .state
            .read()
            .map_err(|e| WrenError::Concurrency(format!("RwLock read fail {}", e)))?;
        if *state != BridgeState::Stopped {
            return Err(config_error!(
                "bridge configuration can only change while stopped (currently {})",
                *state
            ));
        }
        let mut config = self
            .config
            .write()
            .map_err(|e| WrenError::Concurrency(format!("RwLock write fail {}", e)))?;
        update(&mut config);
        Ok(())
    }

    pub fn bridge_name(&self) -> String {
        self.config()
            .map(|config| config.bridge_name)
            .unwrap_or_default()
    }

    pub fn set_bridge_name(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.update_config(|config| config.bridge_name = name)
    }

    pub fn handler_name(&self) -> String {
        self.config()
            .map(|config| config.handler_name())
            .unwrap_or_default()
    }

    pub fn transport(&self) -> Option<Arc<dyn ClusterTransport>> {
        self.config().ok().and_then(|config| config.transport)
    }

    pub fn set_transport(&self, transport: Arc<dyn ClusterTransport>) -> Result<()> {
        self.update_config(|config| config.transport = Some(transport))
    }

    pub fn invalidation_source(&self) -> Option<Arc<dyn InvalidationSource>> {
        self.config().ok().and_then(|config| config.invalidation_source)
    }

    pub fn set_invalidation_source(&self, source: Arc<dyn InvalidationSource>) -> Result<()> {
        self.update_config(|config| config.invalidation_source = Some(source))
    }

    /// Name of the partition the configured transport belongs to
    pub fn partition_name(&self) -> Option<String> {
        self.transport().map(|transport| transport.partition_name())
    }

    pub fn node_name(&self) -> Option<NodeName> {
        self.transport().map(|transport| transport.node_name())
    }

    /// Groups known to exist on other nodes; empty unless started
    pub fn bridged_groups(&self) -> Arc<BTreeSet<GroupName>> {
        self.active()
            .map(|active| active.directory.bridged_groups())
            .unwrap_or_default()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active().map(|active| active.started_at)
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            node: self.node_name(),
            bridge_name: self.bridge_name(),
            handler_name: self.handler_name(),
            partition_name: self.partition_name(),
            state: self.state(),
            bridged_groups: self.bridged_groups().iter().cloned().collect(),
            started_at: self.started_at(),
        }
    }

    /// Register on the transport and the local source, publish, recompute and
    /// spawn the event loops. Any registration failure undoes what was
    /// already registered and leaves the bridge `Stopped`.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("[{}] Bridge already started", self.handler_name());
            return Ok(());
        }

        // the config read and the move to Starting happen under one state
        // guard, so a setter cannot change the config in between
        let config = {
            let mut state = self
                .state
                .write()
                .map_err(|e| WrenError::Concurrency(format!("RwLock write fail {}", e)))?;
            if *state != BridgeState::Stopped {
                return Err(config_error!("bridge cannot start while {}", *state));
            }
            let config = self.config()?;
            *state = BridgeState::Starting;
            config
        };
        let (transport, source) = match config.validate() {
            Ok(handles) => handles,
            Err(e) => {
                self.set_state(BridgeState::Stopped);
                return Err(e);
            }
        };
        let handler_name = config.handler_name();
        let node = transport.node_name();

        info!(
            "[{}/{}] Starting bridge on partition {}",
            node,
            handler_name,
            transport.partition_name()
        );

        let directory = Arc::new(GroupDirectory::new(
            handler_name.clone(),
            transport.clone(),
            source.clone(),
        ));
        let relay = Arc::new(InvalidationRelay::new(transport.clone(), directory.clone()));

        let mut registrations = Registrations::default();
        let channels = match Self::register(
            &transport,
            &source,
            &directory,
            &relay,
            &mut registrations,
        )
        .await
        {
            Ok(channels) => channels,
            Err(e) => {
                warn!(
                    "[{}/{}] Start failed, rolling back: {}",
                    node, handler_name, e
                );
                Self::teardown(&transport, &directory, registrations).await;
                directory.clear();
                self.set_state(BridgeState::Stopped);
                return Err(e);
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let janitor = MembershipJanitor::new(handler_name.clone(), transport.clone());
        let tasks = vec![
            tokio::spawn(run_state_loop(
                node.clone(),
                directory.clone(),
                channels.state,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_replicant_loop(
                node.clone(),
                janitor,
                channels.replicants,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_rpc_loop(
                relay,
                channels.subscription,
                channels.rpc,
                shutdown_rx,
            )),
        ];

        let started_at = Utc::now();
        self.set_active(Some(Active {
            directory: directory.clone(),
            started_at,
        }));
        *running = Some(Running {
            transport,
            directory,
            registrations,
            shutdown,
            tasks,
        });
        self.set_state(BridgeState::Started);
        info!("[{}/{}] Bridge started", node, handler_name);
        Ok(())
    }

    async fn register(
        transport: &Arc<dyn ClusterTransport>,
        source: &Arc<dyn InvalidationSource>,
        directory: &Arc<GroupDirectory>,
        relay: &Arc<InvalidationRelay>,
        registrations: &mut Registrations,
    ) -> Result<Channels> {
        let handler_name = directory.handler_name();
        let node = transport.node_name();

        let rpc = transport
            .register_rpc_handler(handler_name)
            .await
            .map_err(|e| registration_error("RPC handler", handler_name, e))?;
        registrations.rpc_handler = true;

        let (state_id, state) = transport
            .register_state_listener(handler_name)
            .await
            .map_err(|e| registration_error("state listener", handler_name, e))?;
        registrations.state_listener = Some(state_id);

        let (replicant_id, replicants) = transport
            .register_replicant_listener(handler_name)
            .await
            .map_err(|e| registration_error("replicant listener", handler_name, e))?;
        registrations.replicant_listener = Some(replicant_id);

        transport
            .add_replicant(handler_name)
            .await
            .map_err(|e| registration_error("replicant", handler_name, e))?;
        registrations.replicant = true;

        // a failed publish is retried on the next group change
        if let Err(e) = directory.publish_local_groups().await {
            warn!("[{}/{}] Initial publish failed: {}", node, handler_name, e);
        }
        if let Err(e) = directory.recompute_bridged_groups().await {
            warn!("[{}/{}] Initial recompute failed: {}", node, handler_name, e);
        }

        let hooks = Arc::new(BridgeHooks {
            node,
            directory: directory.clone(),
            relay: relay.clone(),
        });
        let subscription = source
            .register_bridge(hooks)
            .await
            .map_err(|e| registration_error("invalidation source listener", handler_name, e))?;
        registrations.subscription = Some(subscription.clone());

        Ok(Channels {
            subscription,
            rpc,
            state,
            replicants,
        })
    }

    /// Undo registrations; every failure is logged and the rest still runs
    async fn teardown(
        transport: &Arc<dyn ClusterTransport>,
        directory: &GroupDirectory,
        registrations: Registrations,
    ) {
        let node = transport.node_name();
        let handler_name = directory.handler_name();

        if registrations.rpc_handler {
            if let Err(e) = transport.unregister_rpc_handler(handler_name).await {
                warn!("[{}/{}] Unregistering RPC handler failed: {}", node, handler_name, e);
            }
        }
        if let Some(id) = registrations.state_listener {
            if let Err(e) = transport.unregister_state_listener(handler_name, id).await {
                warn!("[{}/{}] Unregistering state listener failed: {}", node, handler_name, e);
            }
        }
        if let Some(id) = registrations.replicant_listener {
            if let Err(e) = transport.unregister_replicant_listener(handler_name, id).await {
                warn!(
                    "[{}/{}] Unregistering replicant listener failed: {}",
                    node, handler_name, e
                );
            }
        }
        if let Some(subscription) = registrations.subscription {
            if let Err(e) = subscription.unsubscribe().await {
                warn!("[{}/{}] Unsubscribing from source failed: {}", node, handler_name, e);
            }
        }
        // not retried: a leftover entry is overwritten on restart or pruned by the janitor
        if let Err(e) = directory.withdraw_local_entry().await {
            warn!("[{}/{}] Removing own node entry failed: {}", node, handler_name, e);
        }
        if registrations.replicant {
            if let Err(e) = transport.remove_replicant(handler_name).await {
                warn!("[{}/{}] Leaving replicant list failed: {}", node, handler_name, e);
            }
        }
    }

    /// Tear down in reverse. Never fails on unregistration problems, and
    /// stopping a stopped bridge does nothing.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(current) = running.take() else {
            debug!("[{}] Bridge already stopped", self.handler_name());
            return Ok(());
        };
        self.set_state(BridgeState::Stopping);

        let Running {
            transport,
            directory,
            registrations,
            shutdown,
            tasks,
        } = current;
        let node = transport.node_name();
        info!("[{}/{}] Stopping bridge", node, directory.handler_name());

        Self::teardown(&transport, &directory, registrations).await;

        if shutdown.send(true).is_err() {
            debug!(
                "[{}/{}] Event loops already gone",
                node,
                directory.handler_name()
            );
        }
        for task in tasks {
            if let Err(e) = task.await {
                warn!(
                    "[{}/{}] Event loop ended abnormally: {}",
                    node,
                    directory.handler_name(),
                    e
                );
            }
        }

        directory.clear();
        self.set_active(None);
        self.set_state(BridgeState::Stopped);
        info!("[{}/{}] Bridge stopped", node, directory.handler_name());
        Ok(())
    }
}

fn registration_error(what: &str, handler_name: &str, err: WrenError) -> WrenError {
    WrenError::Registration(format!("{} for {}: {}", what, handler_name, err))
}

/// The bridge's listener on the local invalidation source
struct BridgeHooks {
    node: NodeName,
    directory: Arc<GroupDirectory>,
    relay: Arc<InvalidationRelay>,
}

#[async_trait]
impl BridgeListener for BridgeHooks {
    async fn on_local_event(&self, event: LocalInvalidation) {
        match event {
            LocalInvalidation::Invalidate { group, key, mode } => {
                self.relay.invalidate(group, key, mode).await;
            }
            LocalInvalidation::InvalidateMany { group, keys, mode } => {
                self.relay.invalidate_many(group, keys, mode).await;
            }
            LocalInvalidation::InvalidateAll { group, mode } => {
                self.relay.invalidate_all(group, mode).await;
            }
            LocalInvalidation::BatchInvalidate { items, mode } => {
                self.relay.batch_invalidate(items, mode).await;
            }
            LocalInvalidation::GroupCreated(group) | LocalInvalidation::GroupDropped(group) => {
                debug!(
                    "[{}/{}] Local groups changed ({}), republishing",
                    self.node,
                    self.directory.handler_name(),
                    group
                );
                if let Err(e) = self.directory.publish_local_groups().await {
                    warn!(
                        "[{}/{}] Publish failed: {}",
                        self.node,
                        self.directory.handler_name(),
                        e
                    );
                }
            }
        }
    }
}

async fn run_state_loop(
    node: NodeName,
    directory: Arc<GroupDirectory>,
    mut events: mpsc::UnboundedReceiver<StateEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => {
                    // a recompute reads the whole store, so a burst needs only one
                    let mut own_entry_removed = is_own_removal(&node, &event);
                    let mut coalesced = 0;
                    while let Ok(next) = events.try_recv() {
                        own_entry_removed |= is_own_removal(&node, &next);
                        coalesced += 1;
                    }
                    debug!(
                        "[{}/{}] {:?} (+{} more), recomputing",
                        node,
                        directory.handler_name(),
                        event,
                        coalesced
                    );
                    // a janitor acting on an outdated view may prune a live node
                    if own_entry_removed {
                        if let Err(e) = directory.restore_local_entry().await {
                            warn!(
                                "[{}/{}] Restoring own node entry failed: {}",
                                node,
                                directory.handler_name(),
                                e
                            );
                        }
                    }
                    if let Err(e) = directory.recompute_bridged_groups().await {
                        warn!(
                            "[{}/{}] Keeping previous bridged groups: {}",
                            node,
                            directory.handler_name(),
                            e
                        );
                    }
                }
                None => break,
            },
        }
    }
    debug!("[{}/{}] State loop exiting", node, directory.handler_name());
}

fn is_own_removal(node: &NodeName, event: &StateEvent) -> bool {
    matches!(event, StateEvent::KeyRemoved { .. }) && event.key() == node.as_str()
}

async fn run_replicant_loop(
    node: NodeName,
    janitor: MembershipJanitor,
    mut events: mpsc::UnboundedReceiver<ReplicantEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(mut event) => {
                    // only the newest view matters
                    while let Ok(next) = events.try_recv() {
                        event = next;
                    }
                    janitor.on_replicants_changed(event).await;
                }
                None => break,
            },
        }
    }
    debug!("[{}] Replicant loop exiting", node);
}

async fn run_rpc_loop(
    relay: Arc<InvalidationRelay>,
    subscription: Arc<dyn BridgeSubscription>,
    mut requests: mpsc::UnboundedReceiver<RpcRequest>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            request = requests.recv() => match request {
                Some(request) => relay.handle_request(request, subscription.as_ref()).await,
                None => break,
            },
        }
    }
    debug!("{:?} RPC loop exiting", relay);
}
