//! Registry and connection error types.

use thiserror::Error;

/// Errors reported by a [`Connection`](crate::registry::Connection).
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection has not completed its handshake.
    #[error("connection is not established")]
    NotConnected,

    /// The connection was closed.
    #[error("connection is closed")]
    Closed,

    /// The remote server answered with a JSON-RPC error.
    #[error("server error [{code}]: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i32,
        /// Error message from the server.
        message: String,
    },

    /// The remote server's result could not be decoded.
    #[error("failed to decode {method} result")]
    Decode {
        /// Method whose result was malformed.
        method: &'static str,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors reported by the [`ToolRegistry`](crate::registry::ToolRegistry).
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A server with this ID is already registered.
    #[error("server '{server_id}' is already registered")]
    DuplicateServerId {
        /// The conflicting server ID.
        server_id: String,
    },

    /// No server with this ID is registered.
    #[error("server '{server_id}' is not registered")]
    ServerNotFound {
        /// The requested server ID.
        server_id: String,
    },

    /// No tool with this qualified name is indexed.
    #[error("unknown tool: '{qualified_name}'")]
    ToolNotFound {
        /// The requested qualified name.
        qualified_name: String,
    },

    /// The tool is indexed but its server is gone or disconnected.
    #[error("server '{server_id}' for tool '{qualified_name}' is unavailable")]
    ServerUnavailable {
        /// The owning server ID.
        server_id: String,
        /// The requested qualified name.
        qualified_name: String,
    },

    /// The server ID cannot be used to build qualified names.
    #[error("invalid server id '{server_id}': {reason}")]
    InvalidServerId {
        /// The rejected server ID.
        server_id: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Tool discovery failed for a server.
    #[error("tool discovery failed for server '{server_id}'")]
    Discovery {
        /// The server whose discovery failed.
        server_id: String,
        /// The underlying connection error.
        #[source]
        source: ConnectionError,
    },

    /// A tool call failed at the connection level.
    #[error("call to server '{server_id}' failed")]
    Connection {
        /// The server that was called.
        server_id: String,
        /// The underlying connection error.
        #[source]
        source: ConnectionError,
    },

    /// The tool call was cancelled before completing.
    #[error("call to '{qualified_name}' was cancelled")]
    Cancelled {
        /// The tool that was being called.
        qualified_name: String,
    },

    /// The task running the tool call failed abnormally.
    #[error("call to '{qualified_name}' aborted: {message}")]
    TaskFailed {
        /// The tool that was being called.
        qualified_name: String,
        /// Failure description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn registry_error_display() {
        let err = RegistryError::DuplicateServerId {
            server_id: "s1".to_string(),
        };
        assert_eq!(err.to_string(), "server 's1' is already registered");

        let err = RegistryError::ToolNotFound {
            qualified_name: "s1:missing".to_string(),
        };
        assert!(err.to_string().contains("s1:missing"));
    }

    #[test]
    fn discovery_error_keeps_source() {
        let err = RegistryError::Discovery {
            server_id: "s1".to_string(),
            source: ConnectionError::Rpc {
                code: -32603,
                message: "boom".to_string(),
            },
        };
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "server error [-32603]: boom");
    }
}
