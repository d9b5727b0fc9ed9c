//! MCP server loop.
//!
//! This module drives a [`ProtocolHandler`] over a line transport:
//!
//! 1. **Read**: one JSON-RPC message per line
//! 2. **Dispatch**: the handler produces at most one reply per message
//! 3. **Notify**: queued outgoing notifications are written between replies
//! 4. **Shutdown**: on EOF or a termination signal the handler is shut down

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::mcp::handler::{LifecycleState, ProtocolHandler};
use crate::mcp::protocol::{JsonRpcMessage, JsonRpcNotification};
use crate::mcp::transport::{LineTransport, StdioTransport};

/// An MCP server bound to one transport.
pub struct McpServer<R, W> {
    /// The protocol handler.
    handler: Arc<ProtocolHandler>,
    /// The transport layer.
    transport: LineTransport<R, W>,
    /// Outgoing notifications to forward to the client.
    notifications: Option<UnboundedReceiver<JsonRpcNotification>>,
}

impl McpServer<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Creates a server on stdin/stdout.
    #[must_use]
    pub fn stdio(handler: Arc<ProtocolHandler>) -> Self {
        Self::new(handler, StdioTransport::stdio())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    pub const fn new(handler: Arc<ProtocolHandler>, transport: LineTransport<R, W>) -> Self {
        Self {
            handler,
            transport,
            notifications: None,
        }
    }

    /// Attaches a queue of outgoing notifications.
    #[must_use]
    pub fn with_notifications(
        mut self,
        notifications: UnboundedReceiver<JsonRpcNotification>,
    ) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Returns the protocol handler.
    #[must_use]
    pub const fn handler(&self) -> &Arc<ProtocolHandler> {
        &self.handler
    }

    /// Runs the server until EOF or SIGINT/SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(unix)]
    pub async fn run(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        let shutdown = async move {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        };

        self.serve_until(shutdown).await
    }

    /// Runs the server until EOF or Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run(&mut self) -> io::Result<()> {
        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
        };

        self.serve_until(shutdown).await
    }

    /// Runs the server until EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> io::Result<()> {
        self.serve_until(std::future::pending::<()>()).await
    }

    /// Runs the main loop until EOF or `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve_until<F>(&mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break,

                notification = next_notification(&mut self.notifications) => {
                    match notification {
                        Some(notification) => self.forward_notification(notification).await?,
                        None => self.notifications = None,
                    }
                }

                line = self.transport.read_line() => {
                    let Some(line) = line? else {
                        tracing::debug!("Input closed");
                        break;
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    if let Some(reply) = self.handler.handle_line(&line).await {
                        self.transport.write_message(&reply).await?;
                    }
                }
            }
        }

        self.handler.shutdown().await;
        Ok(())
    }

    async fn forward_notification(&mut self, notification: JsonRpcNotification) -> io::Result<()> {
        if self.handler.state() != LifecycleState::Initialized {
            tracing::trace!(
                method = %notification.method,
                "Dropping notification outside an initialised session"
            );
            return Ok(());
        }
        self.transport
            .write_message(&JsonRpcMessage::Notification(notification))
            .await
    }
}

async fn next_notification(
    notifications: &mut Option<UnboundedReceiver<JsonRpcNotification>>,
) -> Option<JsonRpcNotification> {
    match notifications {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::EchoSurface;
    use crate::mcp::protocol::{parse_message, RequestId};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#;

    fn server_over(
        stream: tokio::io::DuplexStream,
        handler: Arc<ProtocolHandler>,
    ) -> McpServer<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>, tokio::io::WriteHalf<tokio::io::DuplexStream>>
    {
        let (read, write) = tokio::io::split(stream);
        McpServer::new(handler, LineTransport::new(BufReader::new(read), write))
    }

    async fn replies(mut client: tokio::io::DuplexStream) -> Vec<JsonRpcMessage> {
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out.lines().map(|l| parse_message(l).unwrap()).collect()
    }

    #[tokio::test]
    async fn serves_requests_until_eof() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let handler = Arc::new(ProtocolHandler::new(Arc::new(EchoSurface::new())));
        let mut mcp = server_over(server, handler.clone());

        let input = format!(
            "{INIT}\n\n{}\n{}\n{{broken\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":"t","method":"tools/list"}"#,
        );
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        mcp.serve().await.unwrap();
        assert_eq!(handler.state(), LifecycleState::Shutdown);
        drop(mcp);

        let replies = replies(client).await;
        assert_eq!(replies.len(), 3, "one reply per request plus one parse error");
        assert_eq!(replies[0].id(), Some(&RequestId::Number(1)));
        assert_eq!(replies[1].id(), Some(&RequestId::from("t")));
        let JsonRpcMessage::Error(err) = &replies[2] else {
            panic!("expected parse error");
        };
        assert_eq!(err.error.code, -32700);
    }

    #[tokio::test]
    async fn forwards_notifications_once_initialised() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let handler = Arc::new(ProtocolHandler::new(Arc::new(EchoSurface::new())));
        handler.handle_line(INIT).await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(JsonRpcNotification::tools_list_changed()).unwrap();
        drop(tx);

        let mut mcp = server_over(server, handler).with_notifications(rx);
        client.shutdown().await.unwrap();
        mcp.serve().await.unwrap();
        drop(mcp);

        let replies = replies(client).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].method(), Some("notifications/tools/list_changed"));
        let JsonRpcMessage::Notification(notif) = &replies[0] else {
            panic!("expected notification");
        };
        assert!(notif.params.is_none());
    }
}
