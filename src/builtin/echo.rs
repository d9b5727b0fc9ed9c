//! A small server exercising every capability group.
//!
//! Tools: `echo`, `reverse`, `fail`. Resources: `echo://readme`, plus the
//! `echo://text/{value}` template. Prompts: `greeting`.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::mcp::capability::{CapabilityError, CapabilitySurface};
use crate::mcp::types::{
    Content, Prompt, PromptArgument, PromptMessage, PromptResult, PromptsCapability, Resource,
    ResourceContents, ResourceTemplate, ResourcesCapability, Role, ServerCapabilities,
    ServerMetadata, Tool, ToolArguments, ToolResult, ToolsCapability,
};

const README_URI: &str = "echo://readme";
const TEXT_URI_PREFIX: &str = "echo://text/";
const README: &str = "The echo server repeats what it is given.";

/// Built-in echo server.
#[derive(Debug, Default)]
pub struct EchoSurface {
    subscriptions: Mutex<HashSet<String>>,
}

impl EchoSurface {
    /// Creates an echo server with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `uri` has an active subscription.
    #[must_use]
    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.lock().contains(uri)
    }

    fn text_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to process" }
            },
            "required": ["text"]
        })
    }

    fn require_text(call: &ToolArguments) -> Result<&str, CapabilityError> {
        call.str_arg("text")
            .ok_or_else(|| CapabilityError::InvalidArguments {
                reason: "missing string argument 'text'".to_string(),
            })
    }

    fn known_resource(uri: &str) -> bool {
        uri == README_URI || uri.starts_with(TEXT_URI_PREFIX)
    }
}

#[async_trait]
impl CapabilitySurface for EchoSurface {
    fn server_info(&self) -> ServerMetadata {
        ServerMetadata::new("echo", env!("CARGO_PKG_VERSION"))
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: true,
                list_changed: false,
            }),
            tools: Some(ToolsCapability::default()),
            prompts: Some(PromptsCapability::default()),
            logging: None,
        }
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, CapabilityError> {
        Ok(vec![Resource {
            uri: README_URI.to_string(),
            name: "readme".to_string(),
            description: Some("About this server".to_string()),
            mime_type: Some("text/plain".to_string()),
        }])
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, CapabilityError> {
        if uri == README_URI {
            return Ok(vec![ResourceContents::text(uri, "text/plain", README)]);
        }
        if let Some(value) = uri.strip_prefix(TEXT_URI_PREFIX) {
            return Ok(vec![ResourceContents::text(uri, "text/plain", value)]);
        }
        Err(CapabilityError::NotFound {
            kind: "resource",
            name: uri.to_string(),
        })
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>, CapabilityError> {
        Ok(vec![ResourceTemplate {
            uri_template: format!("{TEXT_URI_PREFIX}{{value}}"),
            name: "text".to_string(),
            description: Some("Returns the value embedded in the URI".to_string()),
            mime_type: Some("text/plain".to_string()),
        }])
    }

    async fn subscribe(&self, uri: &str) -> Result<(), CapabilityError> {
        if !Self::known_resource(uri) {
            return Err(CapabilityError::NotFound {
                kind: "resource",
                name: uri.to_string(),
            });
        }
        self.subscriptions.lock().insert(uri.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, uri: &str) -> Result<(), CapabilityError> {
        self.subscriptions.lock().remove(uri);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, CapabilityError> {
        Ok(vec![
            Tool::new("echo", "Returns the given text unchanged", Self::text_schema()),
            Tool::new("reverse", "Returns the given text reversed", Self::text_schema()),
            Tool::new(
                "fail",
                "Always fails; useful for testing error reporting",
                json!({ "type": "object" }),
            ),
        ])
    }

    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, CapabilityError> {
        match call.name.as_str() {
            "echo" => Ok(ToolResult::text(Self::require_text(&call)?)),
            "reverse" => Ok(ToolResult::text(
                Self::require_text(&call)?.chars().rev().collect::<String>(),
            )),
            "fail" => Err(CapabilityError::failed("requested failure")),
            other => Err(CapabilityError::NotFound {
                kind: "tool",
                name: other.to_string(),
            }),
        }
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>, CapabilityError> {
        Ok(vec![Prompt {
            name: "greeting".to_string(),
            description: Some("Greets someone by name".to_string()),
            arguments: vec![PromptArgument {
                name: "name".to_string(),
                description: Some("Who to greet".to_string()),
                required: false,
            }],
        }])
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<PromptResult, CapabilityError> {
        if name != "greeting" {
            return Err(CapabilityError::NotFound {
                kind: "prompt",
                name: name.to_string(),
            });
        }

        let who = arguments
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("there");
        Ok(PromptResult {
            description: Some("A friendly greeting".to_string()),
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(format!("Say hello to {who}.")),
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, text: Option<&str>) -> ToolArguments {
        let mut args = Map::new();
        if let Some(text) = text {
            args.insert("text".to_string(), Value::from(text));
        }
        ToolArguments::new(name, args)
    }

    #[test]
    fn echo_and_reverse() {
        let surface = EchoSurface::new();
        let echoed = tokio_test::block_on(surface.call_tool(call("echo", Some("abc")))).unwrap();
        assert_eq!(echoed.joined_text(), "abc");
        let reversed =
            tokio_test::block_on(surface.call_tool(call("reverse", Some("abc")))).unwrap();
        assert_eq!(reversed.joined_text(), "cba");
    }

    #[test]
    fn missing_text_is_invalid() {
        let surface = EchoSurface::new();
        let err = tokio_test::block_on(surface.call_tool(call("echo", None))).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let surface = EchoSurface::new();
        let err = tokio_test::block_on(surface.call_tool(call("nope", None))).unwrap_err();
        assert_eq!(err.to_string(), "tool not found: nope");
    }

    #[test]
    fn reads_templated_resource() {
        let surface = EchoSurface::new();
        let contents =
            tokio_test::block_on(surface.read_resource("echo://text/hello")).unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("hello"));
        assert!(tokio_test::block_on(surface.read_resource("file:///etc")).is_err());
    }

    #[test]
    fn subscriptions_tracked() {
        let surface = EchoSurface::new();
        tokio_test::block_on(surface.subscribe(README_URI)).unwrap();
        assert!(surface.is_subscribed(README_URI));
        tokio_test::block_on(surface.unsubscribe(README_URI)).unwrap();
        assert!(!surface.is_subscribed(README_URI));
        assert!(tokio_test::block_on(surface.subscribe("other://x")).is_err());
    }

    #[test]
    fn greeting_uses_name() {
        let surface = EchoSurface::new();
        let mut args = Map::new();
        args.insert("name".to_string(), Value::from("Ada"));
        let prompt = tokio_test::block_on(surface.get_prompt("greeting", &args)).unwrap();
        assert_eq!(prompt.messages[0].content.as_text(), Some("Say hello to Ada."));
    }
}
