//! Local Invalidation Source
//!
//! The per-node authority over which invalidation groups exist, and the sink
//! for invalidations arriving from other nodes. Bridges plug into a source by
//! registering a `BridgeListener`; the source hands back a
//! `BridgeSubscription` the bridge uses to deliver remote events and to
//! unsubscribe.
pub mod manager;

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::messages::{BatchInvalidation, CacheKey, DispatchMode, GroupName};
use crate::error::Result;

pub use manager::{GroupStats, InvalidationEvent, InvalidationGroup, InvalidationManager};

/// Events a source raises towards its registered bridges
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalInvalidation {
    Invalidate {
        group: GroupName,
        key: CacheKey,
        mode: DispatchMode,
    },
    InvalidateMany {
        group: GroupName,
        keys: Vec<CacheKey>,
        mode: DispatchMode,
    },
    InvalidateAll {
        group: GroupName,
        mode: DispatchMode,
    },
    BatchInvalidate {
        items: Vec<BatchInvalidation>,
        mode: DispatchMode,
    },
    GroupCreated(GroupName),
    GroupDropped(GroupName),
}

/// Bridge-side callback invoked by the source on local events
#[async_trait]
pub trait BridgeListener: Send + Sync {
    async fn on_local_event(&self, event: LocalInvalidation);
}

/// Handle a bridge holds on its source while subscribed
#[async_trait]
pub trait BridgeSubscription: Send + Sync {
    async fn invalidate(&self, group: GroupName, key: CacheKey);

    async fn invalidate_many(&self, group: GroupName, keys: Vec<CacheKey>);

    async fn invalidate_all(&self, group: GroupName);

    async fn batch_invalidate(&self, items: Vec<BatchInvalidation>);

    async fn unsubscribe(&self) -> Result<()>;
}

#[async_trait]
pub trait InvalidationSource: Send + Sync {
    /// Names of the invalidation groups currently active on this node
    async fn invalidation_groups(&self) -> Vec<GroupName>;

    async fn register_bridge(
        &self,
        listener: Arc<dyn BridgeListener>,
    ) -> Result<Arc<dyn BridgeSubscription>>;
}
