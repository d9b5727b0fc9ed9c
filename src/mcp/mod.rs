//! Model Context Protocol (MCP) server core.
//!
//! Messages arrive as JSON-RPC 2.0 lines, are decoded into
//! [`JsonRpcMessage`] values, and are dispatched by the
//! [`ProtocolHandler`] to a [`CapabilitySurface`] implemented by a concrete
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         McpServer                           │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────────┐    ┌────────────┐  │
//! │   │  Transport  │───▶│ ProtocolHandler │───▶│ Capability │  │
//! │   │   (lines)   │    │   (lifecycle)   │    │  Surface   │  │
//! │   └─────────────┘    └─────────────────┘    └────────────┘  │
//! │          │                   │                              │
//! │          ▼                   ▼                              │
//! │   ┌─────────────────────────────────────────────────┐       │
//! │   │              JSON-RPC Messages                  │       │
//! │   └─────────────────────────────────────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! The preferred protocol version is 2025-06-18; older versions listed in
//! [`protocol::SUPPORTED_PROTOCOL_VERSIONS`] are accepted during
//! negotiation.

pub mod capability;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod types;

pub use capability::{CapabilityError, CapabilitySurface};
pub use handler::{LifecycleState, Method, ProtocolHandler};
pub use protocol::{
    parse_message, ErrorCode, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
};
pub use server::McpServer;
pub use transport::{LineTransport, StdioTransport};
