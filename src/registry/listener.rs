//! Tools-changed listeners.
//!
//! Listeners run synchronously on the task that mutated the registry, after
//! the mutation is visible. A panicking listener is logged and skipped; the
//! remaining listeners and the mutating operation still complete.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::mcp::handler::panic_message;

/// What changed in the tool index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A server was registered and its tools discovered.
    Registered,
    /// A server's tools were rediscovered.
    Refreshed,
    /// A server and its tools were removed.
    Unregistered,
    /// The registry was closed and emptied.
    Closed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registered => "registered",
            Self::Refreshed => "refreshed",
            Self::Unregistered => "unregistered",
            Self::Closed => "closed",
        })
    }
}

/// A change to the tool index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsChangedEvent {
    /// Kind of change.
    pub kind: ChangeKind,
    /// Affected server, if the change concerns one server.
    pub server_id: Option<String>,
    /// Number of tools the affected server now has indexed.
    pub server_tools: usize,
    /// Total tools indexed after the change.
    pub total_tools: usize,
    /// When the change was applied.
    pub at: DateTime<Utc>,
}

impl ToolsChangedEvent {
    pub(crate) fn new(
        kind: ChangeKind,
        server_id: Option<&str>,
        server_tools: usize,
        total_tools: usize,
    ) -> Self {
        Self {
            kind,
            server_id: server_id.map(str::to_string),
            server_tools,
            total_tools,
            at: Utc::now(),
        }
    }
}

/// Receives tools-changed events.
pub trait ToolsChangedListener: Send + Sync {
    /// Called after every index change.
    fn on_tools_changed(&self, event: &ToolsChangedEvent);
}

impl<F> ToolsChangedListener for F
where
    F: Fn(&ToolsChangedEvent) + Send + Sync,
{
    fn on_tools_changed(&self, event: &ToolsChangedEvent) {
        self(event);
    }
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn ToolsChangedListener>);

/// Registered listeners, in subscription order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Entry>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn ToolsChangedListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers `event` to every listener; returns how many panicked.
    pub(crate) fn notify(&self, event: &ToolsChangedEvent) -> usize {
        // Snapshot so listeners may subscribe or query the registry.
        let snapshot: Vec<Entry> = self.listeners.read().clone();

        let mut failures = 0;
        for (id, listener) in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_tools_changed(event))) {
                failures += 1;
                tracing::warn!(
                    listener = id.0,
                    kind = %event.kind,
                    panic = %panic_message(panic.as_ref()),
                    "Tools-changed listener panicked"
                );
            }
        }
        failures
    }
}
