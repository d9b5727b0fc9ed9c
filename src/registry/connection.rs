//! Live links to MCP servers.
//!
//! A [`Connection`] is supplied by the transport layer and represents one
//! server endpoint. [`LocalConnection`] is the in-process implementation:
//! it speaks JSON-RPC directly to a [`ProtocolHandler`] without any framing.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::mcp::capability::CapabilitySurface;
use crate::mcp::handler::{Method, ProtocolHandler};
use crate::mcp::protocol::{
    ErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::mcp::types::{ClientCapabilities, ClientInfo, InitializeResult, Tool, ToolArguments, ToolResult};
use crate::registry::error::ConnectionError;

/// One live server endpoint.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the endpoint is ready to serve requests.
    fn is_connected(&self) -> bool;

    /// Lists the server's tools.
    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError>;

    /// Invokes one tool.
    ///
    /// A tool that ran and failed is an `Ok` result with `is_error` set.
    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, ConnectionError>;

    /// Closes the endpoint.
    async fn close(&self);
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    tools: Vec<Tool>,
}

/// In-process connection to a [`ProtocolHandler`].
#[derive(Debug)]
pub struct LocalConnection {
    handler: Arc<ProtocolHandler>,
    client: ClientInfo,
    next_id: AtomicI64,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl LocalConnection {
    /// Creates an unconnected link to `handler`.
    #[must_use]
    pub fn new(handler: Arc<ProtocolHandler>) -> Self {
        Self {
            handler,
            client: ClientInfo::new(SERVER_NAME, env!("CARGO_PKG_VERSION")),
            next_id: AtomicI64::new(1),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an unconnected link to a fresh handler over `surface`.
    #[must_use]
    pub fn for_surface(surface: Arc<dyn CapabilitySurface>) -> Self {
        Self::new(Arc::new(ProtocolHandler::new(surface)))
    }

    /// Overrides the client identity sent during the handshake.
    #[must_use]
    pub fn with_client_info(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Returns the handler this connection talks to.
    #[must_use]
    pub const fn handler(&self) -> &Arc<ProtocolHandler> {
        &self.handler
    }

    /// Performs the initialize handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is closed or the server rejects
    /// the handshake.
    pub async fn connect(&self) -> Result<InitializeResult, ConnectionError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ClientCapabilities::default(),
            "clientInfo": self.client,
        });

        let result: InitializeResult = self.request(Method::Initialize, into_object(params)).await?;
        self.handler
            .handle_notification(&JsonRpcNotification::initialized())
            .await;
        self.connected.store(true, Ordering::SeqCst);

        tracing::debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "Local connection established"
        );
        Ok(result)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        params: Option<Map<String, Value>>,
    ) -> Result<T, ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method.as_str(), params);

        match self.handler.handle_request(&request).await {
            JsonRpcMessage::Response(response) => serde_json::from_value(response.result)
                .map_err(|source| ConnectionError::Decode {
                    method: method.as_str(),
                    source,
                }),
            JsonRpcMessage::Error(error) => Err(ConnectionError::Rpc {
                code: error.error.code,
                message: error.error.message,
            }),
            JsonRpcMessage::Request(_) | JsonRpcMessage::Notification(_) => {
                Err(ConnectionError::Rpc {
                    code: ErrorCode::InternalError.code(),
                    message: format!("unexpected reply to {method}"),
                })
            }
        }
    }

    fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ConnectionError::Closed)
        } else if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn is_connected(&self) -> bool {
        self.ensure_connected().is_ok()
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError> {
        self.ensure_connected()?;
        let result: ToolsListResult = self.request(Method::ToolsList, None).await?;
        Ok(result.tools)
    }

    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, ConnectionError> {
        self.ensure_connected()?;
        let params = json!({ "name": call.name, "arguments": call.arguments });
        self.request(Method::ToolsCall, into_object(params)).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.handler.shutdown().await;
    }
}

fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::EchoSurface;
    use crate::mcp::handler::LifecycleState;

    fn echo() -> LocalConnection {
        LocalConnection::for_surface(Arc::new(EchoSurface::new()))
    }

    #[tokio::test]
    async fn not_connected_until_handshake() {
        let conn = echo();
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.list_tools().await,
            Err(ConnectionError::NotConnected)
        ));

        let init = conn.connect().await.unwrap();
        assert_eq!(init.protocol_version, MCP_PROTOCOL_VERSION);
        assert!(conn.is_connected());
        assert_eq!(conn.handler().state(), LifecycleState::Initialized);
        assert_eq!(conn.handler().client_info().unwrap().name, SERVER_NAME);
    }

    #[tokio::test]
    async fn lists_and_calls_tools() {
        let conn = echo();
        conn.connect().await.unwrap();

        let tools = conn.list_tools().await.unwrap();
        assert!(tools.iter().any(|t| t.name == "echo"));

        let mut args = Map::new();
        args.insert("text".to_string(), Value::from("ping"));
        let result = conn.call_tool(ToolArguments::new("echo", args)).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.joined_text(), "ping");
    }

    #[tokio::test]
    async fn tool_failure_stays_in_band() {
        let conn = echo();
        conn.connect().await.unwrap();
        let result = conn
            .call_tool(ToolArguments::new("does_not_exist", Map::new()))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn close_shuts_down_handler_once() {
        let conn = echo();
        conn.connect().await.unwrap();
        conn.close().await;
        conn.close().await;

        assert!(!conn.is_connected());
        assert_eq!(conn.handler().state(), LifecycleState::Shutdown);
        assert!(matches!(
            conn.call_tool(ToolArguments::default()).await,
            Err(ConnectionError::Closed)
        ));
        assert!(matches!(conn.connect().await, Err(ConnectionError::Closed)));
    }
}
