//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod nodes {
    pub const LIST: &str = "/nodes";
    pub const NODE: &str = "/nodes/:node";
    pub const BRIDGE: &str = "/nodes/:node/bridge";
    pub const BRIDGE_NAME: &str = "/nodes/:node/bridge/name";
    pub const BRIDGE_START: &str = "/nodes/:node/bridge/start";
    pub const BRIDGE_STOP: &str = "/nodes/:node/bridge/stop";
}

pub mod groups {
    pub const LIST: &str = "/nodes/:node/groups";
    pub const GROUP: &str = "/nodes/:node/groups/:group";
    pub const INVALIDATE: &str = "/nodes/:node/groups/:group/invalidate";
    pub const BATCH_INVALIDATE: &str = "/nodes/:node/batch-invalidate";
}

pub fn drop_leading_slash(path: &str) -> &str {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped
    } else {
        path
    }
}

/// Fill a route template with a node name
pub fn node_path(template: &str, node: &str) -> String {
    template.replace(":node", node)
}

/// Fill a route template with a node and a group name
pub fn group_path(template: &str, node: &str, group: &str) -> String {
    node_path(template, node).replace(":group", group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_filled() {
        assert_eq!(node_path(nodes::BRIDGE_START, "node-a"), "/nodes/node-a/bridge/start");
        assert_eq!(
            group_path(groups::INVALIDATE, "node-a", "Orders"),
            "/nodes/node-a/groups/Orders/invalidate"
        );
        assert_eq!(drop_leading_slash(base::HEALTH), "health");
    }
}
