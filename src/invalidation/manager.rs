//! In-memory invalidation manager
//!
//! Keeps the node's invalidation groups, applies invalidations to local
//! subscribers and fans every local invalidation out to the registered
//! bridges. Invalidations delivered by one bridge are applied locally and
//! re-relayed to every other bridge, so a node bridging several partitions
//! forwards across them without echoing back to the origin.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{BridgeListener, BridgeSubscription, InvalidationSource, LocalInvalidation};
use crate::bridge::messages::{BatchInvalidation, CacheKey, DispatchMode, GroupName};
use crate::error::{Result, WrenError};

const GROUP_CHANNEL_CAPACITY: usize = 256;

/// What a local cache subscribed to a group is told
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidationEvent {
    Keys { keys: Vec<CacheKey>, remote: bool },
    All { remote: bool },
}

#[derive(Debug, Default)]
struct GroupCounters {
    keys_invalidated: AtomicU64,
    full_invalidations: AtomicU64,
    remote_deliveries: AtomicU64,
}

/// Snapshot of a group's counters
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct GroupStats {
    pub keys_invalidated: u64,
    pub full_invalidations: u64,
    pub remote_deliveries: u64,
}

/// A named cache region and its local subscribers
#[derive(Debug)]
pub struct InvalidationGroup {
    name: GroupName,
    counters: GroupCounters,
    events: broadcast::Sender<InvalidationEvent>,
}

impl InvalidationGroup {
    fn new(name: GroupName) -> Self {
        let (events, _) = broadcast::channel(GROUP_CHANNEL_CAPACITY);
        Self {
            name,
            counters: GroupCounters::default(),
            events,
        }
    }

    pub fn name(&self) -> &GroupName {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> GroupStats {
        GroupStats {
            keys_invalidated: self.counters.keys_invalidated.load(Ordering::Relaxed),
            full_invalidations: self.counters.full_invalidations.load(Ordering::Relaxed),
            remote_deliveries: self.counters.remote_deliveries.load(Ordering::Relaxed),
        }
    }

    fn apply_keys(&self, keys: Vec<CacheKey>, remote: bool) {
        self.counters
            .keys_invalidated
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
        if remote {
            self.counters.remote_deliveries.fetch_add(1, Ordering::Relaxed);
        }
        // no subscribers is fine
        let _ = self.events.send(InvalidationEvent::Keys { keys, remote });
    }

    fn apply_all(&self, remote: bool) {
        self.counters
            .full_invalidations
            .fetch_add(1, Ordering::Relaxed);
        if remote {
            self.counters.remote_deliveries.fetch_add(1, Ordering::Relaxed);
        }
        let _ = self.events.send(InvalidationEvent::All { remote });
    }
}

#[derive(Default)]
struct ManagerInner {
    groups: RwLock<BTreeMap<GroupName, Arc<InvalidationGroup>>>,
    bridges: RwLock<Vec<(u64, Arc<dyn BridgeListener>)>>,
    next_bridge_id: AtomicU64,
}

/// Local invalidation source backed by in-memory groups
#[derive(Clone, Default)]
pub struct InvalidationManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for InvalidationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationManager")
            .field("next_bridge_id", &self.inner.next_bridge_id)
            .finish()
    }
}

impl InvalidationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group, announcing it to the bridges if it did not exist yet
    pub async fn create_group(&self, name: impl Into<GroupName>) -> Arc<InvalidationGroup> {
        let name = name.into();
        let group = {
            let mut groups = self.inner.groups.write().await;
            if let Some(existing) = groups.get(&name) {
                return existing.clone();
            }
            let group = Arc::new(InvalidationGroup::new(name.clone()));
            groups.insert(name.clone(), group.clone());
            group
        };
        debug!("Created invalidation group {}", name);
        self.notify_bridges(LocalInvalidation::GroupCreated(name), None)
            .await;
        group
    }

    /// Drop a group, announcing it to the bridges. Returns false if it did not exist.
    pub async fn drop_group(&self, name: &GroupName) -> bool {
        let removed = self.inner.groups.write().await.remove(name).is_some();
        if removed {
            debug!("Dropped invalidation group {}", name);
            self.notify_bridges(LocalInvalidation::GroupDropped(name.clone()), None)
                .await;
        }
        removed
    }

    pub async fn group(&self, name: &GroupName) -> Option<Arc<InvalidationGroup>> {
        self.inner.groups.read().await.get(name).cloned()
    }

    pub async fn group_names(&self) -> Vec<GroupName> {
        self.inner.groups.read().await.keys().cloned().collect()
    }

    pub async fn group_stats(&self) -> BTreeMap<GroupName, GroupStats> {
        self.inner
            .groups
            .read()
            .await
            .iter()
            .map(|(name, group)| (name.clone(), group.stats()))
            .collect()
    }

    pub async fn bridge_count(&self) -> usize {
        self.inner.bridges.read().await.len()
    }

    async fn require_group(&self, name: &GroupName) -> Result<Arc<InvalidationGroup>> {
        self.group(name)
            .await
            .ok_or_else(|| WrenError::Api(format!("Unknown invalidation group {}", name)))
    }

    pub async fn invalidate(
        &self,
        group: &GroupName,
        key: CacheKey,
        mode: DispatchMode,
    ) -> Result<()> {
        self.require_group(group)
            .await?
            .apply_keys(vec![key.clone()], false);
        self.notify_bridges(
            LocalInvalidation::Invalidate {
                group: group.clone(),
                key,
                mode,
            },
            None,
        )
        .await;
        Ok(())
    }

    pub async fn invalidate_many(
        &self,
        group: &GroupName,
        keys: Vec<CacheKey>,
        mode: DispatchMode,
    ) -> Result<()> {
        self.require_group(group)
            .await?
            .apply_keys(keys.clone(), false);
        self.notify_bridges(
            LocalInvalidation::InvalidateMany {
                group: group.clone(),
                keys,
                mode,
            },
            None,
        )
        .await;
        Ok(())
    }

    pub async fn invalidate_all(&self, group: &GroupName, mode: DispatchMode) -> Result<()> {
        self.require_group(group).await?.apply_all(false);
        self.notify_bridges(
            LocalInvalidation::InvalidateAll {
                group: group.clone(),
                mode,
            },
            None,
        )
        .await;
        Ok(())
    }

    /// Apply a batch locally and hand the whole batch to the bridges.
    /// Items for unknown groups are skipped locally.
    pub async fn batch_invalidate(
        &self,
        items: Vec<BatchInvalidation>,
        mode: DispatchMode,
    ) -> Result<()> {
        self.apply_batch(&items, false).await;
        self.notify_bridges(LocalInvalidation::BatchInvalidate { items, mode }, None)
            .await;
        Ok(())
    }

    async fn apply_batch(&self, items: &[BatchInvalidation], remote: bool) {
        for item in items {
            match self.group(&item.group).await {
                Some(group) => group.apply_keys(item.keys.clone(), remote),
                None => debug!("Skipping batch item for unknown group {}", item.group),
            }
        }
    }

    async fn notify_bridges(&self, event: LocalInvalidation, exclude: Option<u64>) {
        let bridges: Vec<Arc<dyn BridgeListener>> = self
            .inner
            .bridges
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(_, listener)| listener.clone())
            .collect();
        for bridge in bridges {
            bridge.on_local_event(event.clone()).await;
        }
    }

    async fn remove_bridge(&self, id: u64) -> bool {
        let mut bridges = self.inner.bridges.write().await;
        let before = bridges.len();
        bridges.retain(|(bridge_id, _)| *bridge_id != id);
        bridges.len() != before
    }
}

#[async_trait]
impl InvalidationSource for InvalidationManager {
    async fn invalidation_groups(&self) -> Vec<GroupName> {
        self.group_names().await
    }

    async fn register_bridge(
        &self,
        listener: Arc<dyn BridgeListener>,
    ) -> Result<Arc<dyn BridgeSubscription>> {
        let id = self.inner.next_bridge_id.fetch_add(1, Ordering::Relaxed);
        self.inner.bridges.write().await.push((id, listener));
        debug!("Registered bridge subscription {}", id);
        Ok(Arc::new(ManagerSubscription {
            id,
            manager: self.clone(),
        }))
    }
}

/// A bridge's subscription on an `InvalidationManager`
struct ManagerSubscription {
    id: u64,
    manager: InvalidationManager,
}

impl ManagerSubscription {
    async fn deliver_keys(&self, group: &GroupName, keys: Vec<CacheKey>) -> bool {
        match self.manager.group(group).await {
            Some(local) => {
                local.apply_keys(keys, true);
                true
            }
            None => {
                debug!(
                    "[bridge {}] Ignoring remote invalidation for unknown group {}",
                    self.id, group
                );
                false
            }
        }
    }

    async fn relay(&self, event: LocalInvalidation) {
        self.manager.notify_bridges(event, Some(self.id)).await;
    }
}

#[async_trait]
impl BridgeSubscription for ManagerSubscription {
    async fn invalidate(&self, group: GroupName, key: CacheKey) {
        if self.deliver_keys(&group, vec![key.clone()]).await {
            self.relay(LocalInvalidation::Invalidate {
                group,
                key,
                mode: DispatchMode::Async,
            })
            .await;
        }
    }

    async fn invalidate_many(&self, group: GroupName, keys: Vec<CacheKey>) {
        if self.deliver_keys(&group, keys.clone()).await {
            self.relay(LocalInvalidation::InvalidateMany {
                group,
                keys,
                mode: DispatchMode::Async,
            })
            .await;
        }
    }

    async fn invalidate_all(&self, group: GroupName) {
        match self.manager.group(&group).await {
            Some(local) => {
                local.apply_all(true);
                self.relay(LocalInvalidation::InvalidateAll {
                    group,
                    mode: DispatchMode::Async,
                })
                .await;
            }
            None => debug!(
                "[bridge {}] Ignoring remote invalidate-all for unknown group {}",
                self.id, group
            ),
        }
    }

    async fn batch_invalidate(&self, items: Vec<BatchInvalidation>) {
        self.manager.apply_batch(&items, true).await;
        self.relay(LocalInvalidation::BatchInvalidate {
            items,
            mode: DispatchMode::Async,
        })
        .await;
    }

    async fn unsubscribe(&self) -> Result<()> {
        if self.manager.remove_bridge(self.id).await {
            debug!("Unregistered bridge subscription {}", self.id);
            Ok(())
        } else {
            Err(WrenError::Unregistration(format!(
                "bridge subscription {} is not registered",
                self.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<LocalInvalidation>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<LocalInvalidation> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BridgeListener for RecordingListener {
        async fn on_local_event(&self, event: LocalInvalidation) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_group_lifecycle_events_fire_once() {
        let manager = InvalidationManager::new();
        let listener = Arc::new(RecordingListener::default());
        manager.register_bridge(listener.clone()).await.unwrap();

        manager.create_group("Orders").await;
        manager.create_group("Orders").await;
        assert!(manager.drop_group(&"Orders".into()).await);
        assert!(!manager.drop_group(&"Orders".into()).await);

        assert_eq!(
            listener.events(),
            vec![
                LocalInvalidation::GroupCreated("Orders".into()),
                LocalInvalidation::GroupDropped("Orders".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_local_invalidation_reaches_subscribers_and_bridges() {
        let manager = InvalidationManager::new();
        let group = manager.create_group("Orders").await;
        let mut cache = group.subscribe();
        let listener = Arc::new(RecordingListener::default());
        manager.register_bridge(listener.clone()).await.unwrap();

        manager
            .invalidate(&"Orders".into(), "o-1".into(), DispatchMode::Async)
            .await
            .unwrap();

        assert_eq!(
            cache.recv().await.unwrap(),
            InvalidationEvent::Keys {
                keys: vec!["o-1".into()],
                remote: false
            }
        );
        assert_eq!(
            listener.events(),
            vec![LocalInvalidation::Invalidate {
                group: "Orders".into(),
                key: "o-1".into(),
                mode: DispatchMode::Async,
            }]
        );
        assert_eq!(group.stats().keys_invalidated, 1);
    }

    #[tokio::test]
    async fn test_unknown_group_is_rejected_locally() {
        let manager = InvalidationManager::new();
        let result = manager
            .invalidate_all(&"Nope".into(), DispatchMode::Sync)
            .await;
        assert!(matches!(result, Err(WrenError::Api(_))));
    }

    #[tokio::test]
    async fn test_remote_delivery_skips_origin_bridge() {
        let manager = InvalidationManager::new();
        manager.create_group("Orders").await;

        let origin = Arc::new(RecordingListener::default());
        let other = Arc::new(RecordingListener::default());
        let subscription = manager.register_bridge(origin.clone()).await.unwrap();
        manager.register_bridge(other.clone()).await.unwrap();

        subscription
            .invalidate_many("Orders".into(), vec!["a".into(), "b".into()])
            .await;

        assert!(origin.events().is_empty());
        assert_eq!(other.events().len(), 1);

        let stats = manager.group(&"Orders".into()).await.unwrap().stats();
        assert_eq!(stats.keys_invalidated, 2);
        assert_eq!(stats.remote_deliveries, 1);
    }

    #[tokio::test]
    async fn test_remote_delivery_for_unknown_group_is_ignored() {
        let manager = InvalidationManager::new();
        let other = Arc::new(RecordingListener::default());
        let subscription = manager
            .register_bridge(Arc::new(RecordingListener::default()))
            .await
            .unwrap();
        manager.register_bridge(other.clone()).await.unwrap();

        subscription.invalidate_all("Ghost".into()).await;
        assert!(other.events().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_twice_fails() {
        let manager = InvalidationManager::new();
        let subscription = manager
            .register_bridge(Arc::new(RecordingListener::default()))
            .await
            .unwrap();
        assert_eq!(manager.bridge_count().await, 1);
        subscription.unsubscribe().await.unwrap();
        assert_eq!(manager.bridge_count().await, 0);
        assert!(matches!(
            subscription.unsubscribe().await,
            Err(WrenError::Unregistration(_))
        ));
    }
}
