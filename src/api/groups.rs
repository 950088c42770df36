use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::bridge::{BatchInvalidation, CacheKey, DispatchMode, GroupName};
use crate::config_error;
use crate::error::{Result, WrenError};
use crate::invalidation::GroupStats;
use crate::node::{NodeName, NodeRegistry};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub all: bool,
    // falls back to the service-wide default when absent
    #[serde(default)]
    pub async_mode: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub node: NodeName,
    pub group: GroupName,
    pub keys: usize,
    pub all: bool,
    pub mode: DispatchMode,
    /// Whether the group is known on another node, i.e. whether the bridge relayed it
    pub bridged: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItem {
    pub group: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchInvalidateRequest {
    pub items: Vec<BatchItem>,
    #[serde(default)]
    pub async_mode: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchInvalidateResponse {
    pub node: NodeName,
    pub items: usize,
    pub mode: DispatchMode,
    /// Groups of the batch that were relayed
    pub bridged: Vec<GroupName>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupResponse {
    pub node: NodeName,
    pub group: GroupName,
}

fn mode_for(state: &NodeRegistry, async_mode: Option<bool>) -> DispatchMode {
    async_mode
        .map(DispatchMode::from_async_flag)
        .unwrap_or_else(|| state.default_mode())
}

#[instrument(skip(state), level = "debug")]
pub async fn list_groups(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
) -> Result<Json<BTreeMap<GroupName, GroupStats>>> {
    let node = state.node(&NodeName::from(node)).await?;
    Ok(Json(node.manager().group_stats().await))
}

#[instrument(skip(state), level = "debug")]
pub async fn create_group(
    Path((node, group)): Path<(String, String)>,
    State(state): State<NodeRegistry>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    let node = state.node(&NodeName::from(node)).await?;
    let group = GroupName::from(group);
    let status = if node.manager().group(&group).await.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    node.manager().create_group(group.clone()).await;
    Ok((
        status,
        Json(GroupResponse {
            node: node.name().clone(),
            group,
        }),
    ))
}

#[instrument(skip(state), level = "debug")]
pub async fn drop_group(
    Path((node, group)): Path<(String, String)>,
    State(state): State<NodeRegistry>,
) -> Result<StatusCode> {
    let node = state.node(&NodeName::from(node)).await?;
    let group = GroupName::from(group);
    if node.manager().drop_group(&group).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(WrenError::Api(format!(
            "Unknown invalidation group {} on {}",
            group,
            node.name()
        )))
    }
}

#[instrument(skip(state), level = "debug")]
pub async fn invalidate(
    Path((node, group)): Path<(String, String)>,
    State(state): State<NodeRegistry>,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let node = state.node(&NodeName::from(node)).await?;
    let group = GroupName::from(group);
    let mode = mode_for(&state, request.async_mode);
    let bridged = node.bridge().bridged_groups().contains(&group);
    let mut keys: Vec<CacheKey> = request.keys.into_iter().map(CacheKey::from).collect();
    let key_count = keys.len();

    if request.all {
        node.manager().invalidate_all(&group, mode).await?;
    } else if key_count == 1 {
        if let Some(key) = keys.pop() {
            node.manager().invalidate(&group, key, mode).await?;
        }
    } else if key_count > 1 {
        node.manager().invalidate_many(&group, keys, mode).await?;
    } else {
        return Err(config_error!("either keys or all must be given"));
    }

    Ok(Json(InvalidateResponse {
        node: node.name().clone(),
        group,
        keys: key_count,
        all: request.all,
        mode,
        bridged,
    }))
}

#[instrument(skip(state), level = "debug")]
pub async fn batch_invalidate(
    Path(node): Path<String>,
    State(state): State<NodeRegistry>,
    Json(request): Json<BatchInvalidateRequest>,
) -> Result<Json<BatchInvalidateResponse>> {
    let node = state.node(&NodeName::from(node)).await?;
    let mode = mode_for(&state, request.async_mode);
    let items: Vec<BatchInvalidation> = request
        .items
        .into_iter()
        .map(|item| {
            BatchInvalidation::new(
                item.group.into(),
                item.keys.into_iter().map(CacheKey::from).collect(),
            )
        })
        .collect();
    if items.is_empty() {
        return Err(config_error!("batch must not be empty"));
    }

    let snapshot = node.bridge().bridged_groups();
    let bridged = items
        .iter()
        .filter(|item| snapshot.contains(&item.group))
        .map(|item| item.group.clone())
        .collect();
    let count = items.len();
    node.manager().batch_invalidate(items, mode).await?;

    Ok(Json(BatchInvalidateResponse {
        node: node.name().clone(),
        items: count,
        mode,
        bridged,
    }))
}
