//! Wren: a distributed cache-invalidation bridge
//!
//! Each node publishes the invalidation groups it owns into the cluster's
//! replicated state and only broadcasts an invalidation when some other node
//! owns the same group.
pub mod api;
pub mod bridge;
pub mod cli;
pub mod error;
pub mod invalidation;
pub mod node;
pub mod settings;
pub mod transport;
