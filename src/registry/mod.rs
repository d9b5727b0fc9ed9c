//! Multi-server tool aggregation.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 ToolRegistry                 │
//! │  servers:    id → Connection                 │
//! │  tool_index: "id:tool" → ToolDescriptor      │
//! └──────┬──────────────────┬────────────────────┘
//!        │ list_tools       │ call_tool(bare name)
//!        ▼                  ▼
//!   Connection "s1"    Connection "s2"   ...
//! ```
//!
//! [`RegistrySurface`] serves the whole registry as one MCP server.

pub mod connection;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod listener;
pub mod stats;
pub mod tool_registry;

pub use connection::{Connection, LocalConnection};
pub use descriptor::{qualify, split_qualified, ToolDescriptor, QUALIFIED_NAME_SEPARATOR};
pub use error::{ConnectionError, RegistryError};
pub use gateway::RegistrySurface;
pub use listener::{ChangeKind, ListenerId, ToolsChangedEvent, ToolsChangedListener};
pub use stats::RegistryStats;
pub use tool_registry::{ToolCallHandle, ToolRegistry};
