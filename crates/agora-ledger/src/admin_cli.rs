//! ledger-admin CLI tool
//!
//! Publishes node versions to a running ledger node.
//!
//! Usage:
//!   ledger-admin register <node_id> [version]
//!   ledger-admin bump <node_id>
//!   ledger-admin set-version <node_id> <version>
//!   ledger-admin get <node_id>
//!   ledger-admin list
//!   ledger-admin ping

use agora_ledger::admin_socket::default_socket_path;
use agora_ledger::NodeRecord;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    RegisterNode { node_id: String, version: u64 },
    BumpVersion { node_id: String },
    SetVersion { node_id: String, version: u64 },
    GetNode { node_id: String },
    ListNodes,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Error { error: String },
    Node { node: NodeRecord },
    Nodes { items: Vec<NodeRecord> },
    Pong,
}

fn print_usage() {
    eprintln!("ledger-admin - Publish node versions to a ledger node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  ledger-admin register <node_id> [version]     Register a node (default version 1)");
    eprintln!("  ledger-admin bump <node_id>                   Advance a node to its next version");
    eprintln!("  ledger-admin set-version <node_id> <version>  Move a node to a greater version");
    eprintln!("  ledger-admin get <node_id>                    Show a node's current version");
    eprintln!("  ledger-admin list                             List all nodes");
    eprintln!("  ledger-admin ping                             Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEDGER_SOCKET        Path to admin socket");
    eprintln!("  LEDGER_ADMIN_SOCKET  Socket path the node was started with");
    eprintln!("  LEDGER_DATA_DIR      Used for the default socket path ($LEDGER_DATA_DIR/admin.sock)");
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = default_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to ledger-node at {:?}: {}\n\
             Is the ledger-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn node_arg(args: &[String], cmd: &str) -> String {
    match args.get(2) {
        Some(node_id) => node_id.clone(),
        None => {
            eprintln!("Error: {} requires a node_id argument", cmd);
            std::process::exit(1);
        }
    }
}

fn version_arg(arg: Option<&String>, default: Option<u64>) -> u64 {
    match (arg, default) {
        (Some(v), _) => v.parse().unwrap_or_else(|_| {
            eprintln!("Error: version must be a non-negative integer, got '{}'", v);
            std::process::exit(1);
        }),
        (None, Some(d)) => d,
        (None, None) => {
            eprintln!("Error: a version argument is required");
            std::process::exit(1);
        }
    }
}

fn print_node(node: &NodeRecord) {
    println!("{}\tversion {}\tupdated {}", node.node_id, node.version, node.updated_at);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "register" => AdminCommand::RegisterNode {
            node_id: node_arg(&args, "register"),
            version: version_arg(args.get(3), Some(1)),
        },
        "bump" => AdminCommand::BumpVersion {
            node_id: node_arg(&args, "bump"),
        },
        "set-version" => AdminCommand::SetVersion {
            node_id: node_arg(&args, "set-version"),
            version: version_arg(args.get(3), None),
        },
        "get" => AdminCommand::GetNode {
            node_id: node_arg(&args, "get"),
        },
        "list" => AdminCommand::ListNodes,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Node { node } => print_node(&node),
            AdminResponse::Nodes { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for node in &items {
                        print_node(node);
                    }
                }
            }
            AdminResponse::Pong => {
                println!("pong - ledger-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
