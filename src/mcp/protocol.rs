//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the core message types used in the Model Context Protocol.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Response**: A successful reply to a request (carries `result`)
//! - **Notification**: A one-way message (no `id`, no response expected)
//! - **Error**: A failed reply to a request (carries `error`)
//!
//! A response carries either a result or an error, never both: the two
//! outcomes are separate variants of [`JsonRpcMessage`].
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - Request parameters are always a by-name mapping
//! - The `jsonrpc` field is always the literal `"2.0"`; [`JsonRpcVersion`]
//!   cannot hold any other value, so every message carries it by construction

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// The MCP protocol version this implementation prefers.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions accepted during negotiation, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "mcp-hub";

/// The only JSON-RPC version string this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Base of the MCP-specific (server-defined) error code range.
pub const MCP_ERROR_BASE: i32 = -32000;

/// Errors raised while constructing or decoding a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The `jsonrpc` field was missing or not `"2.0"`.
    #[error("jsonrpc field must be \"2.0\", found {found:?}")]
    InvalidVersion {
        /// The value that was supplied.
        found: String,
    },

    /// The message shape does not match any JSON-RPC variant.
    #[error("invalid message structure: {reason}")]
    InvalidStructure {
        /// Description of what is wrong.
        reason: String,
    },
}

impl MessageError {
    fn structure(reason: impl Into<String>) -> Self {
        Self::InvalidStructure {
            reason: reason.into(),
        }
    }
}

/// The `jsonrpc` version marker.
///
/// This type can only ever represent `"2.0"`. Deserialising any other value
/// fails, and [`JsonRpcVersion::parse`] is the only way to build one from text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JsonRpcVersion;

impl JsonRpcVersion {
    /// Validates a version string.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidVersion`] for anything other than `"2.0"`.
    pub fn parse(value: &str) -> Result<Self, MessageError> {
        if value == JSONRPC_VERSION {
            Ok(Self)
        } else {
            Err(MessageError::InvalidVersion {
                found: value.to_string(),
            })
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        JSONRPC_VERSION
    }
}

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A JSON-RPC 2.0 request message.
///
/// Requests expect a response from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0".
    pub jsonrpc: JsonRpcVersion,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl JsonRpcRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Creates a request with an explicit version string.
    ///
    /// # Errors
    ///
    /// Fails immediately if `version` is not `"2.0"` or `method` is empty.
    pub fn with_version(
        version: &str,
        id: impl Into<RequestId>,
        method: impl Into<String>,
        params: Option<Map<String, Value>>,
    ) -> Result<Self, MessageError> {
        JsonRpcVersion::parse(version)?;
        let request = Self::new(id, method, params);
        request.validate()?;
        Ok(request)
    }

    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// # Errors
    ///
    /// Returns an error if the method name is empty.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.method.is_empty() {
            return Err(MessageError::structure("method field cannot be empty"));
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 notification message.
///
/// Notifications do not have an ID and do not expect a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always "2.0".
    pub jsonrpc: JsonRpcVersion,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Map<String, Value>>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }

    /// Creates a notification with an explicit version string.
    ///
    /// # Errors
    ///
    /// Fails immediately if `version` is not `"2.0"`.
    pub fn with_version(
        version: &str,
        method: impl Into<String>,
        params: Option<Map<String, Value>>,
    ) -> Result<Self, MessageError> {
        JsonRpcVersion::parse(version)?;
        Ok(Self::new(method, params))
    }

    /// `notifications/initialized`, sent by a client after a successful handshake.
    #[must_use]
    pub fn initialized() -> Self {
        Self::new("notifications/initialized", None)
    }

    /// `notifications/tools/list_changed`.
    #[must_use]
    pub fn tools_list_changed() -> Self {
        Self::new("notifications/tools/list_changed", None)
    }

    /// `notifications/resources/updated` for one resource.
    #[must_use]
    pub fn resource_updated(uri: &str) -> Self {
        let mut params = Map::new();
        params.insert("uri".to_string(), Value::String(uri.to_string()));
        Self::new("notifications/resources/updated", Some(params))
    }

    /// Creates a progress notification.
    #[must_use]
    pub fn progress(
        progress_token: &str,
        progress: u32,
        total: Option<u32>,
        message: Option<&str>,
    ) -> Self {
        let mut params = Map::new();
        params.insert("progressToken".to_string(), progress_token.into());
        params.insert("progress".to_string(), progress.into());
        if let Some(total) = total {
            params.insert("total".to_string(), total.into());
        }
        if let Some(message) = message {
            params.insert("message".to_string(), message.into());
        }
        Self::new("notifications/progress", Some(params))
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: JsonRpcVersion,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result,
        }
    }

    /// Creates a success response with an explicit version string.
    ///
    /// # Errors
    ///
    /// Fails immediately if `version` is not `"2.0"`.
    pub fn with_version(version: &str, id: RequestId, result: Value) -> Result<Self, MessageError> {
        JsonRpcVersion::parse(version)?;
        Ok(Self::success(id, result))
    }
}

/// JSON-RPC 2.0 error codes, plus the MCP server-defined range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// MCP-specific error, as an offset added to [`MCP_ERROR_BASE`].
    Mcp(i32),
    /// Any other code received from a peer.
    Other(i32),
}

impl ErrorCode {
    /// Generic MCP server error (-32000).
    pub const SERVER_ERROR: Self = Self::Mcp(0);

    /// Requested resource does not exist (-32002).
    pub const RESOURCE_NOT_FOUND: Self = Self::Mcp(-2);

    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::Mcp(offset) => MCP_ERROR_BASE + offset,
            Self::Other(code) => code,
        }
    }

    /// Maps a numeric code back to its variant.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32099..=-32000 => Self::Mcp(code - MCP_ERROR_BASE),
            _ => Self::Other(code),
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::Mcp(-2) => "Resource not found",
            Self::Mcp(_) | Self::Other(_) => "Server error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns the typed error code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: JsonRpcVersion,

    /// The request ID this error corresponds to (`null` if it could not be determined).
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            error,
        }
    }

    /// Creates an error response with an explicit version string.
    ///
    /// # Errors
    ///
    /// Fails immediately if `version` is not `"2.0"`.
    pub fn with_version(
        version: &str,
        id: Option<RequestId>,
        error: JsonRpcErrorData,
    ) -> Result<Self, MessageError> {
        JsonRpcVersion::parse(version)?;
        Ok(Self::new(id, error))
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates an invalid request error response with a custom message.
    #[must_use]
    pub fn invalid_request_with(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Any JSON-RPC 2.0 message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A successful response.
    Response(JsonRpcResponse),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
    /// An error response.
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Classifies and decodes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object, the version is not
    /// `"2.0"`, or the fields do not match exactly one variant.
    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MessageError::structure("message must be a JSON object"))?;

        let version = obj
            .get("jsonrpc")
            .and_then(Value::as_str)
            .ok_or_else(|| MessageError::InvalidVersion {
                found: obj
                    .get("jsonrpc")
                    .map_or_else(|| "<missing>".to_string(), ToString::to_string),
            })?;
        JsonRpcVersion::parse(version)?;

        let has_method = obj.contains_key("method");
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");
        let has_id = obj.contains_key("id");

        let decode_err = |e: serde_json::Error| MessageError::structure(e.to_string());

        match (has_method, has_result, has_error) {
            (true, false, false) if has_id => {
                let request: JsonRpcRequest = serde_json::from_value(value).map_err(decode_err)?;
                request.validate()?;
                Ok(Self::Request(request))
            }
            (true, false, false) => serde_json::from_value(value)
                .map(Self::Notification)
                .map_err(decode_err),
            (false, true, false) => serde_json::from_value(value)
                .map(Self::Response)
                .map_err(decode_err),
            (false, false, true) => serde_json::from_value(value)
                .map(Self::Error)
                .map_err(decode_err),
            _ => Err(MessageError::structure(
                "message must carry exactly one of method, result or error",
            )),
        }
    }

    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(req) => Some(&req.method),
            Self::Notification(notif) => Some(&notif.method),
            Self::Response(_) | Self::Error(_) => None,
        }
    }

    /// Returns the request ID, if the message carries one.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(resp) => Some(&resp.id),
            Self::Error(err) => err.id.as_ref(),
            Self::Notification(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(value: JsonRpcRequest) -> Self {
        Self::Request(value)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Response(value)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(value: JsonRpcNotification) -> Self {
        Self::Notification(value)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(value: JsonRpcError) -> Self {
        Self::Error(value)
    }
}

/// Parses a JSON string into a message.
///
/// # Errors
///
/// Returns a `JsonRpcError` if the JSON is malformed or not a valid message.
/// The error carries the request ID whenever one could be read.
pub fn parse_message(json: &str) -> Result<JsonRpcMessage, JsonRpcError> {
    // First, try to parse as generic JSON to check structure
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;

    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());

    JsonRpcMessage::from_value(value).map_err(|e| {
        tracing::debug!(error = %e, "Rejected malformed JSON-RPC message");
        JsonRpcError::invalid_request_with(id, e.to_string())
    })
}
