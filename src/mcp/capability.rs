//! The capability surface a concrete MCP server implements.
//!
//! A [`ProtocolHandler`](crate::mcp::handler::ProtocolHandler) calls into a
//! [`CapabilitySurface`]; the surface never calls back into the handler.
//! Every resource, tool and prompt operation is optional: the default
//! implementations fail with [`CapabilityError::Unsupported`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::mcp::types::{
    ClientCapabilities, ClientInfo, InitializeResult, Prompt, PromptResult, Resource,
    ResourceContents, ResourceTemplate, ServerCapabilities, ServerMetadata, Tool, ToolArguments,
    ToolResult,
};

/// Failure of a capability operation.
///
/// Only the display text of these errors ever reaches the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The server does not implement this operation.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// MCP method name of the operation.
        operation: &'static str,
    },

    /// The named item does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of item (tool, resource, prompt).
        kind: &'static str,
        /// The name or URI that was requested.
        name: String,
    },

    /// Arguments were rejected by the capability.
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// Why the arguments were rejected.
        reason: String,
    },

    /// The operation ran and failed.
    #[error("{message}")]
    Failed {
        /// Failure description.
        message: String,
    },
}

impl CapabilityError {
    /// Creates a generic failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Operations a concrete MCP server exposes.
#[async_trait]
pub trait CapabilitySurface: Send + Sync {
    /// Server name and version.
    fn server_info(&self) -> ServerMetadata;

    /// Capabilities advertised during initialisation.
    fn capabilities(&self) -> ServerCapabilities;

    /// Handles the initialize handshake.
    ///
    /// The handler overrides `protocol_version` in the returned value with
    /// the negotiated version.
    async fn initialize(
        &self,
        client: &ClientInfo,
        capabilities: &ClientCapabilities,
    ) -> Result<InitializeResult, CapabilityError> {
        let _ = (client, capabilities);
        Ok(InitializeResult::new(
            self.server_info(),
            self.capabilities(),
        ))
    }

    /// Called when the client confirms initialisation.
    async fn initialized(&self) {}

    /// Called once when the handler shuts down.
    async fn shutdown(&self) {}

    /// `resources/list`
    async fn list_resources(&self) -> Result<Vec<Resource>, CapabilityError> {
        Err(CapabilityError::Unsupported {
            operation: "resources/list",
        })
    }

    /// `resources/read`
    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, CapabilityError> {
        let _ = uri;
        Err(CapabilityError::Unsupported {
            operation: "resources/read",
        })
    }

    /// `resources/templates/list`
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, CapabilityError> {
        Err(CapabilityError::Unsupported {
            operation: "resources/templates/list",
        })
    }

    /// `resources/subscribe`
    async fn subscribe(&self, uri: &str) -> Result<(), CapabilityError> {
        let _ = uri;
        Err(CapabilityError::Unsupported {
            operation: "resources/subscribe",
        })
    }

    /// `resources/unsubscribe`
    async fn unsubscribe(&self, uri: &str) -> Result<(), CapabilityError> {
        let _ = uri;
        Err(CapabilityError::Unsupported {
            operation: "resources/unsubscribe",
        })
    }

    /// `tools/list`
    async fn list_tools(&self) -> Result<Vec<Tool>, CapabilityError> {
        Err(CapabilityError::Unsupported {
            operation: "tools/list",
        })
    }

    /// `tools/call`
    ///
    /// An `Err` here is reported to the client in-band, as a tool result
    /// with `isError: true`.
    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, CapabilityError> {
        let _ = call;
        Err(CapabilityError::Unsupported {
            operation: "tools/call",
        })
    }

    /// `prompts/list`
    async fn list_prompts(&self) -> Result<Vec<Prompt>, CapabilityError> {
        Err(CapabilityError::Unsupported {
            operation: "prompts/list",
        })
    }

    /// `prompts/get`
    async fn get_prompt(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<PromptResult, CapabilityError> {
        let _ = (name, arguments);
        Err(CapabilityError::Unsupported {
            operation: "prompts/get",
        })
    }
}
