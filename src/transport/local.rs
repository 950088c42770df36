//! In-process cluster partition
//!
//! A `LocalPartition` is a hub shared by every node that joined it. Each node
//! talks to it through its own `LocalTransport`, which implements
//! `ClusterTransport` with the same observable semantics a networked
//! group-communication layer provides: last-writer-wins replicated state,
//! notifications to every registered listener (the writer's own included),
//! replicant lists in join order and RPC fan-out that excludes the caller.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ClusterTransport, ListenerId, ReplicantEvent, RpcRequest, StateEvent};
use crate::bridge::messages::DispatchMode;
use crate::error::{Result, WrenError};
use crate::node::NodeName;
use crate::transport_error;

type Listeners<E> = Vec<(ListenerId, NodeName, mpsc::UnboundedSender<E>)>;

#[derive(Default)]
struct PartitionInner {
    // join order; also the order replicants are announced in
    members: Vec<NodeName>,
    transports: HashMap<NodeName, Arc<LocalTransport>>,
    state: HashMap<String, BTreeMap<String, Bytes>>,
    rpc_handlers: HashMap<String, HashMap<NodeName, mpsc::UnboundedSender<RpcRequest>>>,
    state_listeners: HashMap<String, Listeners<StateEvent>>,
    replicants: HashMap<String, Vec<NodeName>>,
    replicant_listeners: HashMap<String, Listeners<ReplicantEvent>>,
}

impl PartitionInner {
    fn notify_state(&mut self, event: StateEvent) {
        if let Some(listeners) = self.state_listeners.get_mut(event.category()) {
            listeners.retain(|(_, _, tx)| tx.send(event.clone()).is_ok());
        }
    }

    fn notify_replicants(&mut self, service: &str, view_id: u64) {
        let replicants = self.replicants.get(service).cloned().unwrap_or_default();
        if let Some(listeners) = self.replicant_listeners.get_mut(service) {
            let event = ReplicantEvent {
                service: service.to_string(),
                replicants,
                view_id,
            };
            listeners.retain(|(_, _, tx)| tx.send(event.clone()).is_ok());
        }
    }
}

/// Shared hub for the nodes of one partition
pub struct LocalPartition {
    name: String,
    rpc_timeout: Duration,
    inner: Mutex<PartitionInner>,
    next_listener_id: AtomicU64,
    view_id: AtomicU64,
}

impl std::fmt::Debug for LocalPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPartition")
            .field("name", &self.name)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("view_id", &self.view_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl LocalPartition {
    pub fn new(name: impl Into<String>, rpc_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            rpc_timeout,
            inner: Mutex::new(PartitionInner::default()),
            next_listener_id: AtomicU64::new(1),
            view_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, PartitionInner>> {
        self.inner
            .lock()
            .map_err(|e| WrenError::Concurrency(format!("Mutex lock fail {}", e)))
    }

    fn next_view(&self) -> u64 {
        self.view_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Join the partition, returning the node's transport handle.
    /// Joining again with a name that is already a member returns the existing handle.
    pub fn join(self: &Arc<Self>, node: NodeName) -> Result<Arc<LocalTransport>> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.transports.get(&node) {
            return Ok(existing.clone());
        }
        let transport = Arc::new(LocalTransport {
            node: node.clone(),
            partition: Arc::clone(self),
            stats: Arc::new(TransportStats::default()),
            fail_rpc: AtomicBool::new(false),
            fail_state: AtomicBool::new(false),
            fail_removals: Mutex::new(BTreeSet::new()),
        });
        inner.members.push(node.clone());
        inner.transports.insert(node.clone(), transport.clone());
        info!("[{}] Node {} joined partition", self.name, node);
        Ok(transport)
    }

    /// Remove a node from the partition as if it had crashed.
    ///
    /// The node disappears from every replicant list (firing replicant events
    /// on the survivors) and loses its handlers and listeners. Its
    /// distributed-state entries stay behind until someone prunes them.
    pub fn leave(&self, node: &NodeName) -> Result<bool> {
        let mut inner = self.lock()?;
        let was_member = inner.members.contains(node);
        inner.members.retain(|n| n != node);
        inner.transports.remove(node);

        for handlers in inner.rpc_handlers.values_mut() {
            handlers.remove(node);
        }
        for listeners in inner.state_listeners.values_mut() {
            listeners.retain(|(_, owner, _)| owner != node);
        }
        for listeners in inner.replicant_listeners.values_mut() {
            listeners.retain(|(_, owner, _)| owner != node);
        }

        let affected: Vec<String> = inner
            .replicants
            .iter()
            .filter(|(_, nodes)| nodes.contains(node))
            .map(|(service, _)| service.clone())
            .collect();
        for service in affected {
            if let Some(nodes) = inner.replicants.get_mut(&service) {
                nodes.retain(|n| n != node);
            }
            let view_id = self.next_view();
            inner.notify_replicants(&service, view_id);
        }

        if was_member {
            info!("[{}] Node {} left partition", self.name, node);
        }
        Ok(was_member)
    }

    pub fn members(&self) -> Result<Vec<NodeName>> {
        Ok(self.lock()?.members.clone())
    }

    pub fn transport(&self, node: &NodeName) -> Result<Option<Arc<LocalTransport>>> {
        Ok(self.lock()?.transports.get(node).cloned())
    }

    pub fn replicants(&self, service: &str) -> Result<Vec<NodeName>> {
        Ok(self
            .lock()?
            .replicants
            .get(service)
            .cloned()
            .unwrap_or_default())
    }

    /// Copy of a category's contents, for inspection
    pub fn state_snapshot(&self, category: &str) -> Result<BTreeMap<String, Bytes>> {
        Ok(self
            .lock()?
            .state
            .get(category)
            .cloned()
            .unwrap_or_default())
    }

    fn register_listener<E>(
        &self,
        listeners: &mut HashMap<String, Listeners<E>>,
        key: &str,
        owner: NodeName,
    ) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        listeners
            .entry(key.to_string())
            .or_default()
            .push((id, owner, tx));
        (id, rx)
    }
}

/// Statistics for a node's transport handle
#[derive(Debug, Default)]
pub struct TransportStats {
    pub rpc_dispatched: AtomicU64,
    pub rpc_delivered: AtomicU64,
    pub rpc_failures: AtomicU64,
    pub state_writes: AtomicU64,
    pub state_removals: AtomicU64,
}

/// Point-in-time copy of `TransportStats`
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FrozenTransportStats {
    pub rpc_dispatched: u64,
    pub rpc_delivered: u64,
    pub rpc_failures: u64,
    pub state_writes: u64,
    pub state_removals: u64,
}

impl TransportStats {
    pub fn freeze(&self) -> FrozenTransportStats {
        FrozenTransportStats {
            rpc_dispatched: self.rpc_dispatched.load(Ordering::Relaxed),
            rpc_delivered: self.rpc_delivered.load(Ordering::Relaxed),
            rpc_failures: self.rpc_failures.load(Ordering::Relaxed),
            state_writes: self.state_writes.load(Ordering::Relaxed),
            state_removals: self.state_removals.load(Ordering::Relaxed),
        }
    }
}

/// A node's view of a `LocalPartition`
pub struct LocalTransport {
    node: NodeName,
    partition: Arc<LocalPartition>,
    stats: Arc<TransportStats>,
    fail_rpc: AtomicBool,
    fail_state: AtomicBool,
    // state keys whose removal from this node fails
    fail_removals: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("node", &self.node)
            .field("partition", &self.partition.name)
            .finish()
    }
}

impl LocalTransport {
    pub fn stats(&self) -> FrozenTransportStats {
        self.stats.freeze()
    }

    /// Make every RPC dispatch from this node fail
    pub fn set_fail_rpc(&self, fail: bool) {
        self.fail_rpc.store(fail, Ordering::SeqCst);
    }

    /// Make every distributed-state operation from this node fail
    pub fn set_fail_state(&self, fail: bool) {
        self.fail_state.store(fail, Ordering::SeqCst);
    }

    pub fn partition(&self) -> &Arc<LocalPartition> {
        &self.partition
    }

    /// Make removals of `key` from this node fail, in any category
    pub fn set_fail_removal(&self, key: &str, fail: bool) -> Result<()> {
        let mut keys = self
            .fail_removals
            .lock()
            .map_err(|e| WrenError::Concurrency(format!("Mutex lock fail {}", e)))?;
        if fail {
            keys.insert(key.to_string());
        } else {
            keys.remove(key);
        }
        Ok(())
    }

    fn check_removal(&self, key: &str) -> Result<()> {
        let failing = self
            .fail_removals
            .lock()
            .map_err(|e| WrenError::Concurrency(format!("Mutex lock fail {}", e)))?
            .contains(key);
        if failing {
            return Err(transport_error!(
                "[{}] removal of {} refused",
                self.node,
                key
            ));
        }
        Ok(())
    }

    fn check_state(&self) -> Result<()> {
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(transport_error!(
                "[{}] distributed state unavailable",
                self.node
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterTransport for LocalTransport {
    fn node_name(&self) -> NodeName {
        self.node.clone()
    }

    fn partition_name(&self) -> String {
        self.partition.name.clone()
    }

    async fn register_rpc_handler(
        &self,
        service: &str,
    ) -> Result<mpsc::UnboundedReceiver<RpcRequest>> {
        let mut inner = self.partition.lock()?;
        let handlers = inner.rpc_handlers.entry(service.to_string()).or_default();
        if handlers.contains_key(&self.node) {
            return Err(transport_error!(
                "[{}] RPC handler {} already registered",
                self.node,
                service
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        handlers.insert(self.node.clone(), tx);
        Ok(rx)
    }

    async fn unregister_rpc_handler(&self, service: &str) -> Result<()> {
        let mut inner = self.partition.lock()?;
        let removed = inner
            .rpc_handlers
            .get_mut(service)
            .and_then(|handlers| handlers.remove(&self.node));
        match removed {
            Some(_) => Ok(()),
            None => Err(transport_error!(
                "[{}] RPC handler {} not registered",
                self.node,
                service
            )),
        }
    }

    async fn call_method_on_cluster(
        &self,
        service: &str,
        payload: Bytes,
        mode: DispatchMode,
    ) -> Result<()> {
        self.stats.rpc_dispatched.fetch_add(1, Ordering::Relaxed);
        if self.fail_rpc.load(Ordering::SeqCst) {
            self.stats.rpc_failures.fetch_add(1, Ordering::Relaxed);
            return Err(transport_error!("[{}] cluster unreachable", self.node));
        }

        let targets: Vec<(NodeName, mpsc::UnboundedSender<RpcRequest>)> = {
            let inner = self.partition.lock()?;
            inner
                .rpc_handlers
                .get(service)
                .map(|handlers| {
                    handlers
                        .iter()
                        .filter(|(node, _)| **node != self.node)
                        .map(|(node, tx)| (node.clone(), tx.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut pending = Vec::new();
        let mut failures = Vec::new();
        for (target, tx) in targets {
            let (resp_chan, resp_rx) = match mode {
                DispatchMode::Sync => {
                    let (resp_tx, resp_rx) = oneshot::channel();
                    (Some(resp_tx), Some(resp_rx))
                }
                DispatchMode::Async => (None, None),
            };
            let request = RpcRequest {
                origin: self.node.clone(),
                payload: payload.clone(),
                resp_chan,
            };
            if tx.send(request).is_err() {
                failures.push(format!("{} unreachable", target));
                continue;
            }
            self.stats.rpc_delivered.fetch_add(1, Ordering::Relaxed);
            if let Some(resp_rx) = resp_rx {
                pending.push((target, resp_rx));
            }
        }

        for (target, resp_rx) in pending {
            match tokio::time::timeout(self.partition.rpc_timeout, resp_rx).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => failures.push(format!("{} failed: {}", target, e)),
                Ok(Err(_)) => failures.push(format!("{} dropped the call", target)),
                Err(_) => failures.push(format!("{} timed out", target)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            self.stats.rpc_failures.fetch_add(1, Ordering::Relaxed);
            debug!("[{}] RPC on {} failed: {:?}", self.node, service, failures);
            Err(transport_error!(
                "[{}] {} call(s) failed: {}",
                self.node,
                failures.len(),
                failures.join(", ")
            ))
        }
    }

    async fn state_set(&self, category: &str, key: &str, value: Bytes) -> Result<()> {
        self.check_state()?;
        self.stats.state_writes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.partition.lock()?;
        inner
            .state
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value);
        inner.notify_state(StateEvent::ValueChanged {
            category: category.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn state_get(&self, category: &str, key: &str) -> Result<Option<Bytes>> {
        self.check_state()?;
        let inner = self.partition.lock()?;
        Ok(inner
            .state
            .get(category)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn state_remove(&self, category: &str, key: &str) -> Result<Option<Bytes>> {
        self.check_state()?;
        self.check_removal(key)?;
        self.stats.state_removals.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.partition.lock()?;
        let removed = inner
            .state
            .get_mut(category)
            .and_then(|entries| entries.remove(key));
        if removed.is_some() {
            inner.notify_state(StateEvent::KeyRemoved {
                category: category.to_string(),
                key: key.to_string(),
            });
        }
        Ok(removed)
    }

    async fn state_keys(&self, category: &str) -> Result<Vec<String>> {
        self.check_state()?;
        let inner = self.partition.lock()?;
        Ok(inner
            .state
            .get(category)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn state_values(&self, category: &str) -> Result<Vec<Bytes>> {
        self.check_state()?;
        let inner = self.partition.lock()?;
        Ok(inner
            .state
            .get(category)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn register_state_listener(
        &self,
        category: &str,
    ) -> Result<(ListenerId, mpsc::UnboundedReceiver<StateEvent>)> {
        let mut inner = self.partition.lock()?;
        Ok(self
            .partition
            .register_listener(&mut inner.state_listeners, category, self.node.clone()))
    }

    async fn unregister_state_listener(&self, category: &str, id: ListenerId) -> Result<()> {
        let mut inner = self.partition.lock()?;
        let listeners = inner.state_listeners.entry(category.to_string()).or_default();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        if listeners.len() == before {
            return Err(transport_error!(
                "[{}] state listener {} not registered on {}",
                self.node,
                id,
                category
            ));
        }
        Ok(())
    }

    async fn add_replicant(&self, service: &str) -> Result<()> {
        let mut inner = self.partition.lock()?;
        let replicants = inner.replicants.entry(service.to_string()).or_default();
        if replicants.contains(&self.node) {
            return Ok(());
        }
        replicants.push(self.node.clone());
        let view_id = self.partition.next_view();
        inner.notify_replicants(service, view_id);
        Ok(())
    }

    async fn remove_replicant(&self, service: &str) -> Result<()> {
        let mut inner = self.partition.lock()?;
        let removed = match inner.replicants.get_mut(service) {
            Some(replicants) => {
                let before = replicants.len();
                replicants.retain(|n| *n != self.node);
                replicants.len() != before
            }
            None => false,
        };
        if removed {
            let view_id = self.partition.next_view();
            inner.notify_replicants(service, view_id);
        } else {
            warn!(
                "[{}] Not a replicant of {}, nothing to remove",
                self.node, service
            );
        }
        Ok(())
    }

    async fn register_replicant_listener(
        &self,
        service: &str,
    ) -> Result<(ListenerId, mpsc::UnboundedReceiver<ReplicantEvent>)> {
        let mut inner = self.partition.lock()?;
        Ok(self.partition.register_listener(
            &mut inner.replicant_listeners,
            service,
            self.node.clone(),
        ))
    }

    async fn unregister_replicant_listener(&self, service: &str, id: ListenerId) -> Result<()> {
        let mut inner = self.partition.lock()?;
        let listeners = inner
            .replicant_listeners
            .entry(service.to_string())
            .or_default();
        let before = listeners.len();
        listeners.retain(|(listener_id, _, _)| *listener_id != id);
        if listeners.len() == before {
            return Err(transport_error!(
                "[{}] replicant listener {} not registered on {}",
                self.node,
                id,
                service
            ));
        }
        Ok(())
    }

    async fn is_master_replica(&self, service: &str) -> Result<bool> {
        let inner = self.partition.lock()?;
        Ok(inner
            .replicants
            .get(service)
            .and_then(|replicants| replicants.first())
            .map(|first| *first == self.node)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> Arc<LocalPartition> {
        LocalPartition::new("TestPartition", Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_state_changes_notify_every_listener() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let b = partition.join("node-b".into()).unwrap();

        let (_, mut a_events) = a.register_state_listener("cat").await.unwrap();
        let (_, mut b_events) = b.register_state_listener("cat").await.unwrap();

        a.state_set("cat", "node-a", Bytes::from_static(b"v1"))
            .await
            .unwrap();

        let expected = StateEvent::ValueChanged {
            category: "cat".to_string(),
            key: "node-a".to_string(),
        };
        assert_eq!(a_events.recv().await.unwrap(), expected);
        assert_eq!(b_events.recv().await.unwrap(), expected);

        assert_eq!(
            b.state_get("cat", "node-a").await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
        assert_eq!(b.state_keys("cat").await.unwrap(), vec!["node-a"]);
    }

    #[tokio::test]
    async fn test_removing_missing_key_is_silent() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let (_, mut events) = a.register_state_listener("cat").await.unwrap();

        assert!(a.state_remove("cat", "ghost").await.unwrap().is_none());
        assert!(events.try_recv().is_err());
        assert_eq!(a.stats().state_removals, 1);
    }

    #[tokio::test]
    async fn test_master_is_first_replicant() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let b = partition.join("node-b".into()).unwrap();

        a.add_replicant("svc").await.unwrap();
        b.add_replicant("svc").await.unwrap();
        assert!(a.is_master_replica("svc").await.unwrap());
        assert!(!b.is_master_replica("svc").await.unwrap());

        partition.leave(&"node-a".into()).unwrap();
        assert!(b.is_master_replica("svc").await.unwrap());
        assert_eq!(
            partition.replicants("svc").unwrap(),
            vec![NodeName::from("node-b")]
        );
    }

    #[tokio::test]
    async fn test_leave_fires_replicant_event_and_keeps_state() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let b = partition.join("node-b".into()).unwrap();
        a.add_replicant("svc").await.unwrap();
        b.add_replicant("svc").await.unwrap();
        b.state_set("svc", "node-b", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let (_, mut events) = a.register_replicant_listener("svc").await.unwrap();
        partition.leave(&"node-b".into()).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.replicants, vec![NodeName::from("node-a")]);
        assert!(partition.state_snapshot("svc").unwrap().contains_key("node-b"));
    }

    #[tokio::test]
    async fn test_sync_call_excludes_caller_and_waits_for_ack() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let b = partition.join("node-b".into()).unwrap();

        let mut a_inbox = a.register_rpc_handler("svc").await.unwrap();
        let mut b_inbox = b.register_rpc_handler("svc").await.unwrap();

        tokio::spawn(async move {
            while let Some(req) = b_inbox.recv().await {
                assert_eq!(req.origin.as_str(), "node-a");
                if let Some(resp) = req.resp_chan {
                    let _ = resp.send(Ok(()));
                }
            }
        });

        a.call_method_on_cluster("svc", Bytes::from_static(b"ping"), DispatchMode::Sync)
            .await
            .unwrap();
        assert!(a_inbox.try_recv().is_err());

        let stats = a.stats();
        assert_eq!(stats.rpc_dispatched, 1);
        assert_eq!(stats.rpc_delivered, 1);
        assert_eq!(stats.rpc_failures, 0);
    }

    #[tokio::test]
    async fn test_sync_call_times_out() {
        let partition = LocalPartition::new("TestPartition", Duration::from_millis(20));
        let a = partition.join("node-a".into()).unwrap();
        let b = partition.join("node-b".into()).unwrap();
        // registered but never answered
        let _b_inbox = b.register_rpc_handler("svc").await.unwrap();

        let result = a
            .call_method_on_cluster("svc", Bytes::from_static(b"ping"), DispatchMode::Sync)
            .await;
        assert!(matches!(result, Err(WrenError::Transport(_))));
        assert_eq!(a.stats().rpc_failures, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();

        a.set_fail_state(true);
        assert!(a.state_keys("cat").await.is_err());
        a.set_fail_state(false);
        assert!(a.state_keys("cat").await.is_ok());

        a.set_fail_rpc(true);
        let result = a
            .call_method_on_cluster("svc", Bytes::new(), DispatchMode::Async)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_injected_removal_failure_is_per_key() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        for key in ["k1", "k2"] {
            a.state_set("cat", key, Bytes::from_static(b"v")).await.unwrap();
        }

        a.set_fail_removal("k1", true).unwrap();
        assert!(a.state_remove("cat", "k1").await.is_err());
        assert!(a.state_remove("cat", "k2").await.unwrap().is_some());

        a.set_fail_removal("k1", false).unwrap();
        assert!(a.state_remove("cat", "k1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_handler_registration_fails() {
        let partition = partition();
        let a = partition.join("node-a".into()).unwrap();
        let _inbox = a.register_rpc_handler("svc").await.unwrap();
        assert!(a.register_rpc_handler("svc").await.is_err());
        a.unregister_rpc_handler("svc").await.unwrap();
        assert!(a.unregister_rpc_handler("svc").await.is_err());
    }
}
