//! Serving a registry as a single MCP server.
//!
//! [`RegistrySurface`] exposes every indexed tool under its qualified name,
//! so a client talking to one [`ProtocolHandler`](crate::mcp::ProtocolHandler)
//! reaches tools on all registered servers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::mcp::capability::{CapabilityError, CapabilitySurface};
use crate::mcp::types::{
    ClientCapabilities, ClientInfo, InitializeResult, ServerCapabilities, ServerMetadata, Tool,
    ToolArguments, ToolResult, ToolsCapability,
};
use crate::registry::error::RegistryError;
use crate::registry::tool_registry::ToolRegistry;

/// Capability surface backed by a [`ToolRegistry`].
#[derive(Debug)]
pub struct RegistrySurface {
    registry: Arc<ToolRegistry>,
    info: ServerMetadata,
    instructions: Option<String>,
}

impl RegistrySurface {
    /// Wraps `registry` under the default server identity.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            info: ServerMetadata::default(),
            instructions: None,
        }
    }

    /// Overrides the reported server identity.
    #[must_use]
    pub fn with_server_info(mut self, info: ServerMetadata) -> Self {
        self.info = info;
        self
    }

    /// Sets the instructions returned from `initialize`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// The wrapped registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

#[async_trait]
impl CapabilitySurface for RegistrySurface {
    fn server_info(&self) -> ServerMetadata {
        self.info.clone()
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: true }),
            ..ServerCapabilities::default()
        }
    }

    async fn initialize(
        &self,
        client: &ClientInfo,
        _capabilities: &ClientCapabilities,
    ) -> Result<InitializeResult, CapabilityError> {
        tracing::info!(
            client = %client.name,
            servers = self.registry.server_count(),
            tools = self.registry.tool_count(),
            "Gateway session starting"
        );
        let mut result = InitializeResult::new(self.server_info(), self.capabilities());
        result.instructions.clone_from(&self.instructions);
        Ok(result)
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, CapabilityError> {
        Ok(self
            .registry
            .all_tools()
            .iter()
            .map(|descriptor| descriptor.to_qualified_tool())
            .collect())
    }

    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, CapabilityError> {
        self.registry
            .call_tool(&call.name, call.arguments)
            .await
            .map_err(|error| match error {
                RegistryError::ToolNotFound { qualified_name } => CapabilityError::NotFound {
                    kind: "tool",
                    name: qualified_name,
                },
                other => CapabilityError::failed(other.to_string()),
            })
    }
}
