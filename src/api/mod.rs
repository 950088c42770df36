mod base;
mod groups;
mod nodes;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use base::AboutResponse;
pub use groups::{
    BatchInvalidateRequest, BatchInvalidateResponse, BatchItem, GroupResponse, InvalidateRequest,
    InvalidateResponse,
};
pub use nodes::RenameBridgeRequest;

use crate::error::Result;
use crate::node::NodeRegistry;

/// Build the management API over the hosted nodes
pub async fn api(registry: NodeRegistry) -> Result<Router> {
    let api = Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        // Nodes and their bridges
        .route(paths::nodes::LIST, routing::get(nodes::list_nodes))
        .route(
            paths::nodes::NODE,
            routing::get(nodes::node_status)
                .post(nodes::join_node)
                .delete(nodes::leave_node),
        )
        .route(paths::nodes::BRIDGE, routing::get(nodes::bridge_status))
        .route(paths::nodes::BRIDGE_NAME, routing::put(nodes::rename_bridge))
        .route(paths::nodes::BRIDGE_START, routing::post(nodes::start_bridge))
        .route(paths::nodes::BRIDGE_STOP, routing::post(nodes::stop_bridge))
        // Invalidation groups
        .route(paths::groups::LIST, routing::get(groups::list_groups))
        .route(
            paths::groups::GROUP,
            routing::post(groups::create_group).delete(groups::drop_group),
        )
        .route(paths::groups::INVALIDATE, routing::post(groups::invalidate))
        .route(
            paths::groups::BATCH_INVALIDATE,
            routing::post(groups::batch_invalidate),
        )
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(registry);

    Ok(api)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
