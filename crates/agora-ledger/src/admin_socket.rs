//! Unix socket server for admin commands.
//!
//! The node catalog publishes version changes through this socket. Commands
//! only touch the node registry; ledger entries are never edited here.

use crate::error::Result;
use crate::models::NodeRecord;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Register a node at its initial version
    RegisterNode { node_id: String, version: u64 },
    /// Advance a node to its next version
    BumpVersion { node_id: String },
    /// Move a node to an explicit, greater version
    SetVersion { node_id: String, version: u64 },
    /// Show a node's registry record
    GetNode { node_id: String },
    /// List all registered nodes
    ListNodes,
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Error { error: String },
    Node { node: NodeRecord },
    Nodes { items: Vec<NodeRecord> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    storage: Arc<Storage>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(storage: Arc<Storage>, socket_path: &Path) -> Self {
        Self {
            storage,
            socket_path: socket_path.to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let storage = Arc::clone(&self.storage);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, storage).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

}

async fn handle_connection(stream: UnixStream, storage: Arc<Storage>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => {
                let storage = Arc::clone(&storage);
                tokio::task::spawn_blocking(move || execute_command(cmd, &storage)).await?
            }
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn node_response(result: Result<NodeRecord>, action: &str) -> AdminResponse {
    match result {
        Ok(node) => {
            tracing::info!(node_id = %node.node_id, version = node.version, "{}", action);
            AdminResponse::Node { node }
        }
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

pub(crate) fn execute_command(cmd: AdminCommand, storage: &Storage) -> AdminResponse {
    match cmd {
        AdminCommand::RegisterNode { node_id, version } => {
            node_response(storage.register_node(&node_id, version), "Registered node")
        }

        AdminCommand::BumpVersion { node_id } => {
            node_response(storage.bump_version(&node_id), "Node version advanced")
        }

        AdminCommand::SetVersion { node_id, version } => {
            node_response(storage.set_version(&node_id, version), "Node version set")
        }

        AdminCommand::GetNode { node_id } => match storage.get_node(&node_id) {
            Ok(Some(node)) => AdminResponse::Node { node },
            Ok(None) => AdminResponse::Error {
                error: format!("Not found: node {}", node_id),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::ListNodes => match storage.list_nodes() {
            Ok(items) => AdminResponse::Nodes { items },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}

/// Socket path for admin clients, read from the environment.
pub fn default_socket_path() -> PathBuf {
    socket_path_from(|key| std::env::var(key).ok())
}

/// Resolve the admin socket the same way the node does: `LEDGER_SOCKET`
/// (client override), then `LEDGER_ADMIN_SOCKET`, then
/// `$LEDGER_DATA_DIR/admin.sock`.
pub fn socket_path_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("LEDGER_SOCKET")
        .or_else(|| lookup("LEDGER_ADMIN_SOCKET"))
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let data_dir = lookup("LEDGER_DATA_DIR").unwrap_or_else(|| "./ledger-data".to_string());
            PathBuf::from(data_dir).join("admin.sock")
        })
}
