use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::bridge::BridgeStatus;
use crate::error::Result;
use crate::node::{NodeName, NodeRegistry, NodeStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct RenameBridgeRequest {
    pub name: String,
}

#[instrument(skip(state), level = "debug")]
pub async fn list_nodes(State(state): State<NodeRegistry>) -> Json<Vec<NodeStatus>> {
    let mut statuses = Vec::new();
    for node in state.nodes().await {
        statuses.push(node.status().await);
    }
    Json(statuses)
}

#[instrument(skip(state), level = "debug")]
pub async fn node_status(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<Json<NodeStatus>> {
    let node = state.node(&NodeName::from(node)).await?;
    Ok(Json(node.status().await))
}

#[instrument(skip(state), level = "debug")]
pub async fn join_node(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<(StatusCode, Json<NodeStatus>)> {
    let node = state.add_node(NodeName::from(node)).await?;
    Ok((StatusCode::CREATED, Json(node.status().await)))
}

#[instrument(skip(state), level = "debug")]
pub async fn leave_node(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<StatusCode> {
    state.remove_node(&NodeName::from(node)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state), level = "debug")]
pub async fn bridge_status(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<Json<BridgeStatus>> {
    let node = state.node(&NodeName::from(node)).await?;
    Ok(Json(node.bridge().status()))
}

#[instrument(skip(state), level = "debug")]
pub async fn rename_bridge(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
    Json(request): Json<RenameBridgeRequest>,
) -> Result<Json<BridgeStatus>> {
    let node = state.node(&NodeName::from(node)).await?;
    node.bridge().set_bridge_name(request.name)?;
    Ok(Json(node.bridge().status()))
}

#[instrument(skip(state), level = "debug")]
pub async fn start_bridge(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<Json<BridgeStatus>> {
    let node = state.node(&NodeName::from(node)).await?;
    node.bridge().start().await.map_err(|err| {
        event!(
            Level::ERROR,
            message = "Failed starting bridge",
            err = format!("{:?}", err)
        );
        err
    })?;
    Ok(Json(node.bridge().status()))
}

#[instrument(skip(state), level = "debug")]
pub async fn stop_bridge(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<Json<BridgeStatus>> {
    let node = state.node(&NodeName::from(node)).await?;
    node.bridge().stop().await?;
    Ok(Json(node.bridge().status()))
}
