//! CLI for this application
//!
use crate::node::NodeName;
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("WREN_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // HTTP API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("WREN_HTTP_LISTEN_PORT"),
        help = "Port to bind the Wren management API to"
    )]
    pub listen_port: u16,

    #[clap(
        long,
        default_value = settings::DEFAULT_PARTITION_NAME,
        env("WREN_PARTITION_NAME"),
        help = "Cluster partition the hosted nodes join"
    )]
    pub partition_name: String,

    #[clap(
        long,
        default_value = settings::DEFAULT_BRIDGE_NAME,
        env("WREN_BRIDGE_NAME"),
        help = "Bridge name; bridges with the same name on one partition share a channel"
    )]
    pub bridge_name: String,

    #[clap(
        long,
        default_value = settings::DEFAULT_HANDLER_PREFIX,
        env("WREN_HANDLER_PREFIX"),
        help = "Prefix of the RPC handler name (<prefix>-<bridge-name>)"
    )]
    pub handler_prefix: String,

    // Cluster configuration information: hosted nodes
    #[clap(
        long,
        default_value = settings::DEFAULT_NODES,
        value_delimiter = ',',
        env("WREN_NODES"),
        help = "Comma separated names of the nodes hosted in this process"
    )]
    pub nodes: Vec<String>,

    #[clap(
        long,
        value_delimiter = ',',
        env("WREN_GROUPS"),
        help = "Comma separated invalidation groups created on every node at boot"
    )]
    pub groups: Vec<String>,

    #[clap(
        long,
        default_value = settings::DEFAULT_RPC_TIMEOUT_MS,
        env("WREN_RPC_TIMEOUT_MS"),
        help = "Timeout in milliseconds for synchronous invalidation RPCs"
    )]
    pub rpc_timeout_ms: u64,

    #[clap(
        long,
        env("WREN_ASYNC_INVALIDATION"),
        help = "Dispatch API-triggered invalidations fire-and-forget unless a request says otherwise"
    )]
    pub async_invalidation: bool,

    #[clap(long, env("WREN_LOG_JSON"), help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            partition_name: self.partition_name,
            bridge_name: self.bridge_name,
            handler_prefix: self.handler_prefix,
            nodes: trimmed(self.nodes).map(NodeName::from).collect(),
            groups: trimmed(self.groups).map(Into::into).collect(),
            rpc_timeout_ms: self.rpc_timeout_ms,
            async_invalidation: self.async_invalidation,
            log_json: self.log_json,
        }
    }
}

fn trimmed(values: Vec<String>) -> impl Iterator<Item = String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_lists_are_split_and_trimmed() {
        let cli = Cli::try_parse_from([
            "wren",
            "--nodes",
            "alpha, beta,gamma",
            "--groups",
            "Orders,,Users",
        ])
        .unwrap();
        let settings = cli.into_settings();
        let nodes: Vec<&str> = settings.nodes.iter().map(|n| n.as_str()).collect();
        assert_eq!(nodes, vec!["alpha", "beta", "gamma"]);
        let groups: Vec<&str> = settings.groups.iter().map(|g| g.as_str()).collect();
        assert_eq!(groups, vec!["Orders", "Users"]);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "wren",
            "--async-invalidation",
            "--bridge-name",
            "Catalog",
            "--rpc-timeout-ms",
            "250",
        ])
        .unwrap();
        let settings = cli.into_settings();
        assert!(settings.async_invalidation);
        assert_eq!(settings.bridge_name, "Catalog");
        assert_eq!(settings.rpc_timeout_ms, 250);
    }
}
