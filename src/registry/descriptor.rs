//! Indexed tool descriptors and qualified naming.
//!
//! Tools are indexed as `<server_id>:<tool_name>`. The `:` separator is
//! reserved: server IDs containing it are rejected at registration and tools
//! whose names contain it are skipped during discovery. No escaping scheme
//! is applied.

use serde::Serialize;
use serde_json::Value;

use crate::mcp::types::Tool;
use crate::registry::error::RegistryError;

/// Separator between server ID and tool name.
pub const QUALIFIED_NAME_SEPARATOR: char = ':';

/// Builds the qualified name of a tool.
#[must_use]
pub fn qualify(server_id: &str, tool_name: &str) -> String {
    format!("{server_id}{QUALIFIED_NAME_SEPARATOR}{tool_name}")
}

/// Splits a qualified name into `(server_id, tool_name)`.
///
/// Returns `None` if the separator is missing or either side is empty.
#[must_use]
pub fn split_qualified(qualified_name: &str) -> Option<(&str, &str)> {
    let (server_id, tool_name) = qualified_name.split_once(QUALIFIED_NAME_SEPARATOR)?;
    if server_id.is_empty() || tool_name.is_empty() {
        return None;
    }
    Some((server_id, tool_name))
}

/// Checks that a server ID can be used in qualified names.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidServerId`] if the ID is empty or contains
/// the separator.
pub fn validate_server_id(server_id: &str) -> Result<(), RegistryError> {
    let reason = if server_id.trim().is_empty() {
        "server id must not be empty"
    } else if server_id.contains(QUALIFIED_NAME_SEPARATOR) {
        "server id must not contain ':'"
    } else {
        return Ok(());
    };

    Err(RegistryError::InvalidServerId {
        server_id: server_id.to_string(),
        reason,
    })
}

/// A tool as indexed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// `server_id:name`, unique across the registry.
    pub qualified_name: String,
    /// Owning server.
    pub server_id: String,
    /// Bare tool name as reported by the server.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Builds a descriptor for a tool discovered on `server_id`.
    ///
    /// Returns `None` if the tool name is empty or contains the separator.
    #[must_use]
    pub fn from_tool(server_id: &str, tool: Tool) -> Option<Self> {
        if tool.name.is_empty() || tool.name.contains(QUALIFIED_NAME_SEPARATOR) {
            return None;
        }
        Some(Self {
            qualified_name: qualify(server_id, &tool.name),
            server_id: server_id.to_string(),
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
        })
    }

    /// Returns the tool definition under its qualified name.
    #[must_use]
    pub fn to_qualified_tool(&self) -> Tool {
        Tool {
            name: self.qualified_name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    /// Case-insensitive substring match against bare and qualified names.
    ///
    /// `needle` must already be lowercase.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.qualified_name.to_lowercase().contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qualify_and_split() {
        assert_eq!(qualify("s1", "search"), "s1:search");
        assert_eq!(split_qualified("s1:search"), Some(("s1", "search")));
        assert_eq!(split_qualified("nosep"), None);
        assert_eq!(split_qualified(":tool"), None);
        assert_eq!(split_qualified("s1:"), None);
    }

    #[test]
    fn server_id_validation() {
        assert!(validate_server_id("github").is_ok());
        assert!(matches!(
            validate_server_id("a:b"),
            Err(RegistryError::InvalidServerId { .. })
        ));
        assert!(validate_server_id("  ").is_err());
    }

    #[test]
    fn descriptor_from_tool() {
        let tool = Tool::new("search", "Search things", json!({"type": "object"}));
        let desc = ToolDescriptor::from_tool("s1", tool).unwrap();
        assert_eq!(desc.qualified_name, "s1:search");
        assert_eq!(desc.server_id, "s1");
        assert_eq!(desc.name, "search");
        assert_eq!(desc.to_qualified_tool().name, "s1:search");
    }

    #[test]
    fn descriptor_rejects_reserved_separator() {
        let tool = Tool::new("ns:search", "", json!({}));
        assert!(ToolDescriptor::from_tool("s1", tool).is_none());
    }

    #[test]
    fn matches_is_case_insensitive() {
        let desc =
            ToolDescriptor::from_tool("S1", Tool::new("Search", "", json!({}))).unwrap();
        assert!(desc.matches_lowercase("sea"));
        assert!(desc.matches_lowercase("s1:s"));
        assert!(!desc.matches_lowercase("fetch"));
    }
}
