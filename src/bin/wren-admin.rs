use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::Value;

use wren::api::paths::{self, group_path, node_path};
use wren::api::{InvalidateRequest, RenameBridgeRequest};

#[derive(Parser)]
#[command(name = "wren-admin")]
#[command(about = "Wren invalidation bridge administration tool")]
struct Cli {
    /// Base URL of the Wren management API
    #[arg(long, env = "WREN_ADMIN_SERVER", default_value = "http://127.0.0.1:8420")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every node, or one node's bridge
    Status {
        #[arg(long)]
        node: Option<String>,
    },
    /// Start a node's bridge
    Start {
        #[arg(long)]
        node: String,
    },
    /// Stop a node's bridge
    Stop {
        #[arg(long)]
        node: String,
    },
    /// Rename a stopped bridge
    Rename {
        #[arg(long)]
        node: String,
        #[arg(long)]
        name: String,
    },
    /// Create an invalidation group on a node
    CreateGroup {
        #[arg(long)]
        node: String,
        #[arg(long)]
        group: String,
    },
    /// Drop an invalidation group from a node
    DropGroup {
        #[arg(long)]
        node: String,
        #[arg(long)]
        group: String,
    },
    /// Invalidate keys (e.g., "k1,k2") or a whole group on a node
    Invalidate {
        #[arg(long)]
        node: String,
        #[arg(long)]
        group: String,
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
        #[arg(long)]
        all: bool,
        /// Fire-and-forget instead of waiting for peers
        #[arg(long = "async")]
        async_mode: bool,
    },
    /// Make a node leave the partition
    Leave {
        #[arg(long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = Client::new();
    let url = |path: String| format!("{}/{}", server, paths::drop_leading_slash(&path));

    let response = match cli.command {
        Commands::Status { node: None } => {
            client.get(url(paths::nodes::LIST.to_string())).send().await?
        }
        Commands::Status { node: Some(node) } => {
            client
                .get(url(node_path(paths::nodes::BRIDGE, &node)))
                .send()
                .await?
        }
        Commands::Start { node } => {
            client
                .post(url(node_path(paths::nodes::BRIDGE_START, &node)))
                .send()
                .await?
        }
        Commands::Stop { node } => {
            client
                .post(url(node_path(paths::nodes::BRIDGE_STOP, &node)))
                .send()
                .await?
        }
        Commands::Rename { node, name } => {
            client
                .put(url(node_path(paths::nodes::BRIDGE_NAME, &node)))
                .json(&RenameBridgeRequest { name })
                .send()
                .await?
        }
        Commands::CreateGroup { node, group } => {
            client
                .post(url(group_path(paths::groups::GROUP, &node, &group)))
                .send()
                .await?
        }
        Commands::DropGroup { node, group } => {
            client
                .delete(url(group_path(paths::groups::GROUP, &node, &group)))
                .send()
                .await?
        }
        Commands::Invalidate {
            node,
            group,
            keys,
            all,
            async_mode,
        } => {
            if keys.is_empty() && !all {
                return Err("Pass --keys or --all".into());
            }
            let request = InvalidateRequest {
                keys,
                all,
                async_mode: async_mode.then_some(true),
            };
            client
                .post(url(group_path(paths::groups::INVALIDATE, &node, &group)))
                .json(&request)
                .send()
                .await?
        }
        Commands::Leave { node } => {
            client
                .delete(url(node_path(paths::nodes::NODE, &node)))
                .send()
                .await?
        }
    };

    print_response(response).await
}

async fn print_response(response: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = response.status();
    let body = response.text().await?;
    let rendered = match serde_json::from_str::<Value>(&body) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => body,
    };

    if status.is_success() {
        println!("✅ {}", status);
        if !rendered.is_empty() {
            println!("{}", rendered);
        }
        Ok(())
    } else {
        println!("❌ {}", status);
        println!("{}", rendered);
        Err(format!("Request failed with status {}", status).into())
    }
}
