//! mcp-hub: serves the tools of several MCP servers as one MCP server.
//!
//! Configured servers are mounted in a tool registry and their tools are
//! exposed over stdio under `server_id:tool_name` names.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_hub::builtin;
use mcp_hub::config::{self, Config};
use mcp_hub::mcp::protocol::JsonRpcNotification;
use mcp_hub::mcp::server::McpServer;
use mcp_hub::mcp::types::ServerMetadata;
use mcp_hub::mcp::ProtocolHandler;
use mcp_hub::registry::{RegistrySurface, ToolRegistry, ToolsChangedEvent};

/// Model Context Protocol hub.
///
/// Aggregates the tools of the configured MCP servers and serves them over
/// stdio as a single MCP server.
#[derive(Parser, Debug)]
#[command(name = "mcp-hub")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Mounts every configured server. Failures are logged and skipped.
async fn mount_servers(registry: &ToolRegistry, cfg: &Config) {
    for entry in &cfg.servers {
        let connection = match builtin::connect(entry.kind).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(server_id = %entry.id, error = %e, "Failed to start server");
                continue;
            }
        };

        if let Err(e) = registry.register_server(entry.id.clone(), connection).await {
            warn!(server_id = %entry.id, error = %e, "Failed to register server");
        }
    }
}

async fn run(cfg: Config) -> io::Result<()> {
    let registry = Arc::new(ToolRegistry::new());
    mount_servers(&registry, &cfg).await;
    info!(stats = %registry.stats(), "Registry ready");

    let (tx, rx) = mpsc::unbounded_channel();
    registry.add_listener(move |_: &ToolsChangedEvent| {
        // The receiver is gone once the server loop has exited.
        let _ = tx.send(JsonRpcNotification::tools_list_changed());
    });

    let mut surface = RegistrySurface::new(Arc::clone(&registry))
        .with_server_info(ServerMetadata::new(
            cfg.server.name.clone(),
            env!("CARGO_PKG_VERSION"),
        ));
    if let Some(instructions) = &cfg.server.instructions {
        surface = surface.with_instructions(instructions.clone());
    }

    let handler = Arc::new(ProtocolHandler::new(Arc::new(surface)));
    let mut server = McpServer::stdio(handler).with_notifications(rx);

    info!("MCP server ready, waiting for client connection...");
    let result = server.run().await;

    registry.close().await;
    result
}

/// Entry point for the mcp-hub server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "mcp-hub {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        servers = cfg.servers.len(),
        "Starting mcp-hub"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    match runtime.block_on(run(cfg)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
