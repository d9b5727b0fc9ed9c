//! Per-server JSON-RPC dispatch.
//!
//! The [`ProtocolHandler`] owns one server's lifecycle state and translates
//! wire requests into [`CapabilitySurface`] calls:
//!
//! 1. **Uninitialized**: only `initialize` and `ping` are accepted
//! 2. **Initialized**: every method in [`Method`] is accepted
//! 3. **Shutdown**: every request is rejected with `InvalidRequest`
//!
//! Every request gets exactly one response carrying the request's ID.
//! Capability failures become `InternalError` with the message text only,
//! except for `tools/call`, where a failing tool is reported in-band as a
//! successful response whose result has `isError: true`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::mcp::capability::{CapabilityError, CapabilitySurface};
use crate::mcp::protocol::{
    parse_message, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::types::{ClientCapabilities, ClientInfo, InitializeParams, ToolArguments, ToolResult};

/// Handler state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Waiting for the initialize request.
    Uninitialized,
    /// Ready for normal operation.
    Initialized,
    /// Shut down; all requests are rejected.
    Shutdown,
}

/// Every request method the handler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `ping`
    Ping,
    /// `resources/list`
    ResourcesList,
    /// `resources/read`
    ResourcesRead,
    /// `resources/templates/list`
    ResourcesTemplatesList,
    /// `resources/subscribe`
    ResourcesSubscribe,
    /// `resources/unsubscribe`
    ResourcesUnsubscribe,
    /// `tools/list`
    ToolsList,
    /// `tools/call`
    ToolsCall,
    /// `prompts/list`
    PromptsList,
    /// `prompts/get`
    PromptsGet,
}

impl Method {
    /// All methods, in table order.
    pub const ALL: [Self; 11] = [
        Self::Initialize,
        Self::Ping,
        Self::ResourcesList,
        Self::ResourcesRead,
        Self::ResourcesTemplatesList,
        Self::ResourcesSubscribe,
        Self::ResourcesUnsubscribe,
        Self::ToolsList,
        Self::ToolsCall,
        Self::PromptsList,
        Self::PromptsGet,
    ];

    /// Looks up a method by its wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Ping => "ping",
            Self::ResourcesList => "resources/list",
            Self::ResourcesRead => "resources/read",
            Self::ResourcesTemplatesList => "resources/templates/list",
            Self::ResourcesSubscribe => "resources/subscribe",
            Self::ResourcesUnsubscribe => "resources/unsubscribe",
            Self::ToolsList => "tools/list",
            Self::ToolsCall => "tools/call",
            Self::PromptsList => "prompts/list",
            Self::PromptsGet => "prompts/get",
        }
    }

    /// Whether the method may run before initialisation.
    #[must_use]
    pub const fn allowed_before_init(self) -> bool {
        matches!(self, Self::Initialize | Self::Ping)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct UriParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    arguments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct PromptGetParams {
    name: String,
    arguments: Map<String, Value>,
}

#[derive(Debug)]
struct Session {
    state: LifecycleState,
    protocol_version: Option<String>,
    client_info: Option<ClientInfo>,
    client_capabilities: Option<ClientCapabilities>,
}

/// Dispatches JSON-RPC messages for one server.
pub struct ProtocolHandler {
    surface: Arc<dyn CapabilitySurface>,
    session: RwLock<Session>,
}

impl fmt::Debug for ProtocolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolHandler")
            .field("server", &self.surface.server_info().name)
            .field("session", &*self.session.read())
            .finish()
    }
}

impl ProtocolHandler {
    /// Creates an uninitialised handler over a capability surface.
    #[must_use]
    pub fn new(surface: Arc<dyn CapabilitySurface>) -> Self {
        Self {
            surface,
            session: RwLock::new(Session {
                state: LifecycleState::Uninitialized,
                protocol_version: None,
                client_info: None,
                client_capabilities: None,
            }),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.session.read().state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<String> {
        self.session.read().protocol_version.clone()
    }

    /// Returns the client information recorded during initialisation.
    #[must_use]
    pub fn client_info(&self) -> Option<ClientInfo> {
        self.session.read().client_info.clone()
    }

    /// Returns the client capabilities recorded during initialisation.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.session.read().client_capabilities.clone()
    }

    /// Moves the handler to `Shutdown` and notifies the surface once.
    pub async fn shutdown(&self) {
        {
            let mut session = self.session.write();
            if session.state == LifecycleState::Shutdown {
                return;
            }
            session.state = LifecycleState::Shutdown;
        }
        tracing::info!(server = %self.surface.server_info().name, "Protocol handler shut down");
        self.surface.shutdown().await;
    }

    /// Parses and handles one raw line.
    ///
    /// Returns the reply to write, if any. Malformed input always yields an
    /// error reply.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        match parse_message(line) {
            Ok(message) => self.handle_message(message).await,
            Err(error) => Some(JsonRpcMessage::Error(error)),
        }
    }

    /// Handles any incoming message.
    ///
    /// Requests always produce a reply; notifications, responses and errors
    /// never do.
    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(req) => Some(self.handle_request(&req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(&notif).await;
                None
            }
            JsonRpcMessage::Response(resp) => {
                tracing::debug!(id = %resp.id, "Ignoring unsolicited response");
                None
            }
            JsonRpcMessage::Error(err) => {
                tracing::warn!(
                    id = ?err.id,
                    code = err.error.code,
                    message = %err.error.message,
                    "Peer reported an error"
                );
                None
            }
        }
    }

    /// Handles a request, returning a `Response` or `Error` message with the
    /// request's ID.
    pub async fn handle_request(&self, req: &JsonRpcRequest) -> JsonRpcMessage {
        let id = &req.id;
        let state = self.state();

        if state == LifecycleState::Shutdown {
            return JsonRpcError::invalid_request_with(Some(id.clone()), "Server has shut down")
                .into();
        }

        let Some(method) = Method::parse(&req.method) else {
            tracing::debug!(method = %req.method, "Unknown method");
            return JsonRpcError::method_not_found(id.clone(), &req.method).into();
        };

        if state == LifecycleState::Uninitialized && !method.allowed_before_init() {
            return JsonRpcError::invalid_request_with(Some(id.clone()), "Server not initialised")
                .into();
        }

        tracing::debug!(%method, %id, "Dispatching request");

        match self.dispatch(method, id, req.params.as_ref()).await {
            Ok(result) => JsonRpcResponse::success(id.clone(), result).into(),
            Err(error) => error.into(),
        }
    }

    /// Handles an incoming notification.
    pub async fn handle_notification(&self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                if self.state() == LifecycleState::Initialized {
                    self.surface.initialized().await;
                }
            }
            "notifications/cancelled" => {
                tracing::debug!(params = ?notif.params, "Client cancelled a request");
            }
            other => tracing::trace!(method = %other, "Ignoring notification"),
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        id: &RequestId,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value, JsonRpcError> {
        let surface = &self.surface;
        match method {
            Method::Initialize => self.initialize(id, params).await,
            Method::Ping => Ok(json!({ "pong": true })),
            Method::ResourcesList => {
                let resources = invoke(id, method, surface.list_resources()).await?;
                to_result(id, &json!({ "resources": resources }))
            }
            Method::ResourcesRead => {
                let p: UriParams = decode_params(id, method, params)?;
                let contents = invoke(id, method, surface.read_resource(&p.uri)).await?;
                to_result(id, &json!({ "contents": contents }))
            }
            Method::ResourcesTemplatesList => {
                let templates = invoke(id, method, surface.list_resource_templates()).await?;
                to_result(id, &json!({ "resourceTemplates": templates }))
            }
            Method::ResourcesSubscribe => {
                let p: UriParams = decode_params(id, method, params)?;
                invoke(id, method, surface.subscribe(&p.uri)).await?;
                Ok(json!({}))
            }
            Method::ResourcesUnsubscribe => {
                let p: UriParams = decode_params(id, method, params)?;
                invoke(id, method, surface.unsubscribe(&p.uri)).await?;
                Ok(json!({}))
            }
            Method::ToolsList => {
                let tools = invoke(id, method, surface.list_tools()).await?;
                to_result(id, &json!({ "tools": tools }))
            }
            Method::ToolsCall => {
                let p: ToolCallParams = decode_params(id, method, params)?;
                let result = self.call_tool(ToolArguments::new(p.name, p.arguments)).await;
                to_result(id, &result)
            }
            Method::PromptsList => {
                let prompts = invoke(id, method, surface.list_prompts()).await?;
                to_result(id, &json!({ "prompts": prompts }))
            }
            Method::PromptsGet => {
                let p: PromptGetParams = decode_params(id, method, params)?;
                let prompt = invoke(id, method, surface.get_prompt(&p.name, &p.arguments)).await?;
                to_result(id, &prompt)
            }
        }
    }

    async fn initialize(
        &self,
        id: &RequestId,
        params: Option<&Map<String, Value>>,
    ) -> Result<Value, JsonRpcError> {
        if self.state() != LifecycleState::Uninitialized {
            return Err(JsonRpcError::invalid_request_with(
                Some(id.clone()),
                "Server already initialised",
            ));
        }

        let params: InitializeParams = decode_params(id, Method::Initialize, params)?;
        let negotiated = negotiate_version(&params.protocol_version);

        let mut result = invoke(
            id,
            Method::Initialize,
            self.surface
                .initialize(&params.client_info, &params.capabilities),
        )
        .await?;
        result.protocol_version = negotiated.to_string();

        {
            let mut session = self.session.write();
            if session.state != LifecycleState::Uninitialized {
                return Err(JsonRpcError::invalid_request_with(
                    Some(id.clone()),
                    "Server already initialised",
                ));
            }
            session.state = LifecycleState::Initialized;
            session.protocol_version = Some(negotiated.to_string());
            session.client_info = Some(params.client_info.clone());
            session.client_capabilities = Some(params.capabilities);
        }

        tracing::info!(
            client = %params.client_info.name,
            requested = %params.protocol_version,
            negotiated = %negotiated,
            "Session initialised"
        );

        to_result(id, &result)
    }

    /// Runs a tool, folding any failure into an `isError` result.
    async fn call_tool(&self, call: ToolArguments) -> ToolResult {
        let name = call.name.clone();
        match AssertUnwindSafe(self.surface.call_tool(call))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                tracing::debug!(tool = %name, error = %error, "Tool reported failure");
                ToolResult::error(format!("Tool '{name}' failed: {error}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %name, panic = %message, "Tool panicked");
                ToolResult::error(format!("Tool '{name}' failed: {message}"))
            }
        }
    }
}

/// Picks the client's version when supported, otherwise our preferred one.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// Awaits a capability call, mapping errors and panics to `InternalError`.
async fn invoke<T>(
    id: &RequestId,
    method: Method,
    call: impl Future<Output = Result<T, CapabilityError>>,
) -> Result<T, JsonRpcError> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => {
            tracing::warn!(%method, error = %error, "Capability call failed");
            Err(JsonRpcError::internal_error(id.clone(), error.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(%method, panic = %message, "Capability call panicked");
            Err(JsonRpcError::internal_error(id.clone(), message))
        }
    }
}

fn decode_params<T: DeserializeOwned>(
    id: &RequestId,
    method: Method,
    params: Option<&Map<String, Value>>,
) -> Result<T, JsonRpcError> {
    let value = Value::Object(params.cloned().unwrap_or_default());
    serde_json::from_value(value).map_err(|e| {
        JsonRpcError::invalid_params(id.clone(), format!("Invalid {method} params: {e}"))
    })
}

fn to_result(id: &RequestId, value: &impl Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise result");
        JsonRpcError::internal_error(id.clone(), "Internal error: failed to serialise result")
    })
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
