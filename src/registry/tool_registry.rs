//! Multi-server tool registry.
//!
//! The registry owns one [`Connection`] per server ID, discovers each
//! server's tools and indexes them under qualified names
//! (`server_id:tool_name`), and routes tool calls back to the owning
//! connection.
//!
//! # Consistency
//!
//! The server map and the tool index live behind a single lock. Every
//! mutation (registration, per-server index replacement, removal) happens
//! in one write section, so readers observe either a server's complete old
//! tool set or its complete new one, never a mix, and a server's tools
//! disappear together with the server. No lock is held while awaiting a
//! connection.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::mcp::types::{ToolArguments, ToolResult};
use crate::registry::connection::Connection;
use crate::registry::descriptor::{validate_server_id, ToolDescriptor};
use crate::registry::error::RegistryError;
use crate::registry::listener::{
    ChangeKind, ListenerId, ListenerSet, ToolsChangedEvent, ToolsChangedListener,
};
use crate::registry::stats::RegistryStats;

struct ServerEntry {
    connection: Arc<dyn Connection>,
    /// Distinguishes successive registrations under the same ID.
    generation: u64,
}

#[derive(Default)]
struct RegistryState {
    servers: HashMap<String, ServerEntry>,
    tool_index: HashMap<String, ToolDescriptor>,
}

impl RegistryState {
    fn server_tool_count(&self, server_id: &str) -> usize {
        self.tool_index
            .values()
            .filter(|d| d.server_id == server_id)
            .count()
    }
}

enum Discovery {
    /// The connection was not ready; nothing changed.
    Skipped,
    /// The server's tool set was replaced.
    Indexed(usize),
    /// The server was removed or replaced while discovery ran.
    Stale,
}

/// Aggregates tools from many MCP servers under one namespace.
#[derive(Default)]
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    listeners: ListenerSet,
    generation: AtomicU64,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("stats", &self.stats())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Servers
    // =========================================================================

    /// Registers a server and waits for its initial tool discovery.
    ///
    /// Returns the number of tools indexed for the server. A connection that
    /// is not yet connected is registered without tools. Discovery failures
    /// are logged and leave the server registered with no tools.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::DuplicateServerId`] or
    /// [`RegistryError::InvalidServerId`] without changing any state.
    pub async fn register_server<C>(
        &self,
        server_id: impl Into<String>,
        connection: C,
    ) -> Result<usize, RegistryError>
    where
        C: Connection + 'static,
    {
        let server_id = server_id.into();
        let connection: Arc<dyn Connection> = Arc::new(connection);
        let generation = self.insert_server(&server_id, connection.clone())?;

        let outcome = self.discover(&server_id, generation, connection.as_ref()).await;
        Ok(self.finish_registration(&server_id, outcome))
    }

    /// Registers a server and runs discovery on a background task.
    ///
    /// The duplicate check happens before this returns. The returned handle
    /// resolves to the number of tools indexed. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::DuplicateServerId`] or
    /// [`RegistryError::InvalidServerId`] without changing any state.
    pub fn register_server_detached<C>(
        self: &Arc<Self>,
        server_id: impl Into<String>,
        connection: C,
    ) -> Result<JoinHandle<usize>, RegistryError>
    where
        C: Connection + 'static,
    {
        let server_id = server_id.into();
        let connection: Arc<dyn Connection> = Arc::new(connection);
        let generation = self.insert_server(&server_id, connection.clone())?;

        let registry = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = registry
                .discover(&server_id, generation, connection.as_ref())
                .await;
            registry.finish_registration(&server_id, outcome)
        }))
    }

    /// Removes a server, closes its connection and drops its tools.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::ServerNotFound`] if the ID is unknown.
    pub async fn unregister_server(&self, server_id: &str) -> Result<(), RegistryError> {
        let (entry, removed) = {
            let mut state = self.state.write();
            let entry =
                state
                    .servers
                    .remove(server_id)
                    .ok_or_else(|| RegistryError::ServerNotFound {
                        server_id: server_id.to_string(),
                    })?;
            let before = state.tool_index.len();
            state.tool_index.retain(|_, d| d.server_id != server_id);
            (entry, before - state.tool_index.len())
        };

        entry.connection.close().await;

        tracing::info!(server_id = %server_id, removed_tools = removed, "Server unregistered");
        self.notify(ChangeKind::Unregistered, Some(server_id));
        Ok(())
    }

    /// Re-runs discovery for one server.
    ///
    /// Returns the number of tools now indexed for the server.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::ServerNotFound`] if the server is unknown
    /// (or was removed while discovery ran), or
    /// [`RegistryError::Discovery`] if listing its tools failed; the
    /// previous tool set is kept in that case.
    pub async fn refresh_tools(&self, server_id: &str) -> Result<usize, RegistryError> {
        let (connection, generation) =
            self.connection_for(server_id)
                .ok_or_else(|| RegistryError::ServerNotFound {
                    server_id: server_id.to_string(),
                })?;

        match self.discover(server_id, generation, connection.as_ref()).await? {
            Discovery::Indexed(count) => {
                tracing::debug!(server_id = %server_id, tools = count, "Tools refreshed");
                self.notify(ChangeKind::Refreshed, Some(server_id));
                Ok(count)
            }
            Discovery::Skipped => Ok(self.state.read().server_tool_count(server_id)),
            Discovery::Stale => Err(RegistryError::ServerNotFound {
                server_id: server_id.to_string(),
            }),
        }
    }

    /// Re-runs discovery for every server concurrently.
    ///
    /// One server's failure does not affect the others. Returns the
    /// failures, sorted by server ID.
    pub async fn refresh_all(&self) -> Vec<(String, RegistryError)> {
        let ids = self.server_ids();
        let results = join_all(ids.into_iter().map(|id| async move {
            let result = self.refresh_tools(&id).await;
            (id, result)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(_) => None,
                Err(error) => {
                    tracing::warn!(server_id = %id, error = %error, "Tool refresh failed");
                    Some((id, error))
                }
            })
            .collect()
    }

    /// Closes every connection and empties the registry.
    pub async fn close(&self) {
        let entries: Vec<(String, ServerEntry)> = {
            let mut state = self.state.write();
            state.tool_index.clear();
            state.servers.drain().collect()
        };

        join_all(entries.iter().map(|(id, entry)| async move {
            entry.connection.close().await;
            tracing::debug!(server_id = %id, "Connection closed");
        }))
        .await;

        tracing::info!(servers = entries.len(), "Registry closed");
        self.notify(ChangeKind::Closed, None);
    }

    /// Returns the registered server IDs, sorted.
    #[must_use]
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().servers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a server is registered.
    #[must_use]
    pub fn contains_server(&self, server_id: &str) -> bool {
        self.state.read().servers.contains_key(server_id)
    }

    /// Whether a registered server's connection is live.
    ///
    /// Returns `None` for unknown servers.
    #[must_use]
    pub fn is_connected(&self, server_id: &str) -> Option<bool> {
        self.state
            .read()
            .servers
            .get(server_id)
            .map(|entry| entry.connection.is_connected())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Looks up a tool by qualified name.
    #[must_use]
    pub fn find_tool(&self, qualified_name: &str) -> Option<ToolDescriptor> {
        self.state.read().tool_index.get(qualified_name).cloned()
    }

    /// Whether a tool is indexed under this qualified name.
    #[must_use]
    pub fn has_tool(&self, qualified_name: &str) -> bool {
        self.state.read().tool_index.contains_key(qualified_name)
    }

    /// Returns one server's tools, sorted by name.
    #[must_use]
    pub fn tools_for_server(&self, server_id: &str) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self
            .state
            .read()
            .tool_index
            .values()
            .filter(|d| d.server_id == server_id)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Returns every indexed tool, sorted by qualified name.
    #[must_use]
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> =
            self.state.read().tool_index.values().cloned().collect();
        tools.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        tools
    }

    /// Case-insensitive substring search over bare and qualified names.
    #[must_use]
    pub fn search_tools(&self, pattern: &str) -> Vec<ToolDescriptor> {
        let needle = pattern.to_lowercase();
        let mut tools: Vec<ToolDescriptor> = self
            .state
            .read()
            .tool_index
            .values()
            .filter(|d| d.matches_lowercase(&needle))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        tools
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Calls a tool by qualified name and waits for the result.
    ///
    /// Dropping the returned future abandons the call.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ToolNotFound`] if the name is not indexed
    /// - [`RegistryError::ServerUnavailable`] if the owning server is gone
    ///   or its connection is down
    /// - [`RegistryError::Connection`] if the call failed at the transport
    ///   or protocol level
    ///
    /// A tool that ran and failed is an `Ok` result with `is_error` set.
    pub async fn call_tool(
        &self,
        qualified_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolResult, RegistryError> {
        let (descriptor, connection) = self.resolve(qualified_name)?;

        tracing::debug!(
            tool = %qualified_name,
            server_id = %descriptor.server_id,
            "Routing tool call"
        );

        connection
            .call_tool(ToolArguments::new(descriptor.name, arguments))
            .await
            .map_err(|source| RegistryError::Connection {
                server_id: descriptor.server_id,
                source,
            })
    }

    /// Starts a tool call on a background task.
    ///
    /// Lookup failures are reported through the handle, never by this call.
    /// Must be called from within a Tokio runtime.
    pub fn call_tool_async(
        self: &Arc<Self>,
        qualified_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> ToolCallHandle {
        let qualified_name = qualified_name.into();
        let registry = Arc::clone(self);
        let name = qualified_name.clone();
        let task = tokio::spawn(async move { registry.call_tool(&name, arguments).await });

        ToolCallHandle {
            qualified_name,
            task,
        }
    }

    // =========================================================================
    // Listeners & stats
    // =========================================================================

    /// Subscribes to tools-changed events.
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: ToolsChangedListener + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    /// Unsubscribes a listener. Returns `false` if it was not subscribed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Number of registered servers.
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.state.read().servers.len()
    }

    /// Number of indexed tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.state.read().tool_index.len()
    }

    /// Current counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let mut tools_per_server: std::collections::BTreeMap<String, usize> = state
            .servers
            .keys()
            .map(|id| (id.clone(), 0))
            .collect();
        for descriptor in state.tool_index.values() {
            *tools_per_server
                .entry(descriptor.server_id.clone())
                .or_default() += 1;
        }

        RegistryStats {
            server_count: state.servers.len(),
            tool_count: state.tool_index.len(),
            tools_per_server,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn insert_server(
        &self,
        server_id: &str,
        connection: Arc<dyn Connection>,
    ) -> Result<u64, RegistryError> {
        validate_server_id(server_id)?;

        let mut state = self.state.write();
        if state.servers.contains_key(server_id) {
            return Err(RegistryError::DuplicateServerId {
                server_id: server_id.to_string(),
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        state.servers.insert(
            server_id.to_string(),
            ServerEntry {
                connection,
                generation,
            },
        );
        Ok(generation)
    }

    fn finish_registration(
        &self,
        server_id: &str,
        outcome: Result<Discovery, RegistryError>,
    ) -> usize {
        let count = match outcome {
            Ok(Discovery::Indexed(count)) => count,
            Ok(Discovery::Skipped) => 0,
            Ok(Discovery::Stale) => return 0,
            Err(error) => {
                tracing::warn!(server_id = %server_id, error = %error, "Initial tool discovery failed");
                0
            }
        };

        tracing::info!(server_id = %server_id, tools = count, "Server registered");
        self.notify(ChangeKind::Registered, Some(server_id));
        count
    }

    fn connection_for(&self, server_id: &str) -> Option<(Arc<dyn Connection>, u64)> {
        self.state
            .read()
            .servers
            .get(server_id)
            .map(|entry| (entry.connection.clone(), entry.generation))
    }

    fn resolve(
        &self,
        qualified_name: &str,
    ) -> Result<(ToolDescriptor, Arc<dyn Connection>), RegistryError> {
        let state = self.state.read();
        let descriptor = state.tool_index.get(qualified_name).cloned().ok_or_else(|| {
            RegistryError::ToolNotFound {
                qualified_name: qualified_name.to_string(),
            }
        })?;

        let unavailable = || RegistryError::ServerUnavailable {
            server_id: descriptor.server_id.clone(),
            qualified_name: qualified_name.to_string(),
        };

        let entry = state
            .servers
            .get(&descriptor.server_id)
            .ok_or_else(unavailable)?;
        if !entry.connection.is_connected() {
            return Err(unavailable());
        }

        let connection = entry.connection.clone();
        drop(state);
        Ok((descriptor, connection))
    }

    async fn discover(
        &self,
        server_id: &str,
        generation: u64,
        connection: &dyn Connection,
    ) -> Result<Discovery, RegistryError> {
        if !connection.is_connected() {
            tracing::debug!(server_id = %server_id, "Connection not ready, skipping discovery");
            return Ok(Discovery::Skipped);
        }

        let tools = connection
            .list_tools()
            .await
            .map_err(|source| RegistryError::Discovery {
                server_id: server_id.to_string(),
                source,
            })?;

        let descriptors: Vec<ToolDescriptor> = tools
            .into_iter()
            .filter_map(|tool| {
                let name = tool.name.clone();
                let descriptor = ToolDescriptor::from_tool(server_id, tool);
                if descriptor.is_none() {
                    tracing::warn!(
                        server_id = %server_id,
                        tool = %name,
                        "Skipping tool with empty name or reserved ':' separator"
                    );
                }
                descriptor
            })
            .collect();

        Ok(self.replace_tools(server_id, generation, descriptors))
    }

    /// Swaps one server's indexed tools in a single write section.
    fn replace_tools(
        &self,
        server_id: &str,
        generation: u64,
        descriptors: Vec<ToolDescriptor>,
    ) -> Discovery {
        let mut state = self.state.write();

        let current = state
            .servers
            .get(server_id)
            .is_some_and(|entry| entry.generation == generation);
        if !current {
            tracing::debug!(server_id = %server_id, "Discarding stale discovery result");
            return Discovery::Stale;
        }

        state.tool_index.retain(|_, d| d.server_id != server_id);
        for descriptor in descriptors {
            state
                .tool_index
                .insert(descriptor.qualified_name.clone(), descriptor);
        }
        Discovery::Indexed(state.server_tool_count(server_id))
    }

    fn notify(&self, kind: ChangeKind, server_id: Option<&str>) {
        let event = {
            let state = self.state.read();
            let server_tools = server_id.map_or(0, |id| state.server_tool_count(id));
            ToolsChangedEvent::new(kind, server_id, server_tools, state.tool_index.len())
        };
        self.listeners.notify(&event);
    }
}

/// A tool call running on a background task.
///
/// Await the handle for the result. [`ToolCallHandle::cancel`] aborts the
/// call; it has no effect once the call has completed.
#[derive(Debug)]
pub struct ToolCallHandle {
    qualified_name: String,
    task: JoinHandle<Result<ToolResult, RegistryError>>,
}

impl ToolCallHandle {
    /// The qualified name being called.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the call has finished (successfully, with an error, or cancelled).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for ToolCallHandle {
    type Output = Result<ToolResult, RegistryError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(error)) if error.is_cancelled() => {
                Poll::Ready(Err(RegistryError::Cancelled {
                    qualified_name: this.qualified_name.clone(),
                }))
            }
            Poll::Ready(Err(error)) => Poll::Ready(Err(RegistryError::TaskFailed {
                qualified_name: this.qualified_name.clone(),
                message: error.to_string(),
            })),
        }
    }
}
