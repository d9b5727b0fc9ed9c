//! mcp-hub: an MCP server core and multi-server tool registry.
//!
//! The crate has two halves:
//!
//! - **Protocol layer**: JSON-RPC 2.0 message model, MCP lifecycle and
//!   method dispatch onto a pluggable capability surface, served over a
//!   line-delimited transport.
//! - **Tool registry**: aggregates tools from many MCP server connections
//!   under qualified `server_id:tool_name` names and routes calls back to
//!   the owning server.
//!
//! The `mcp-hub` binary combines both: it mounts the configured servers in a
//! registry and serves the registry's tools over stdio.
//!
//! # Modules
//!
//! - [`builtin`]: In-process servers that can be mounted from config
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Configuration error types
//! - [`mcp`]: MCP protocol implementation
//! - [`registry`]: Multi-server tool registry

pub mod builtin;
pub mod config;
pub mod error;
pub mod mcp;
pub mod registry;
