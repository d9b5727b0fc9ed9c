//! In-process MCP servers that can be mounted from configuration.

mod echo;

pub use echo::EchoSurface;

use std::sync::Arc;

use crate::config::ServerKind;
use crate::mcp::capability::CapabilitySurface;
use crate::registry::connection::LocalConnection;
use crate::registry::error::ConnectionError;

/// Creates the capability surface for a built-in server kind.
#[must_use]
pub fn surface(kind: ServerKind) -> Arc<dyn CapabilitySurface> {
    match kind {
        ServerKind::Echo => Arc::new(EchoSurface::new()),
    }
}

/// Creates a built-in server and completes its handshake.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn connect(kind: ServerKind) -> Result<LocalConnection, ConnectionError> {
    let connection = LocalConnection::for_surface(surface(kind));
    connection.connect().await?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::connection::Connection;

    #[tokio::test]
    async fn connect_returns_live_connection() {
        let connection = connect(ServerKind::Echo).await.unwrap();
        assert!(connection.is_connected());
        assert!(!connection.list_tools().await.unwrap().is_empty());
    }
}
