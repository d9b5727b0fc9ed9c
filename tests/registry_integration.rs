//! Integration tests for the multi-server tool registry.
//!
//! Connections are scripted in-test so that tool sets, readiness, call
//! latency and discovery timing can be controlled precisely.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use mcp_hub::builtin::EchoSurface;
use mcp_hub::mcp::types::{Tool, ToolArguments, ToolResult};
use mcp_hub::mcp::ProtocolHandler;
use mcp_hub::registry::{
    ChangeKind, Connection, ConnectionError, LocalConnection, RegistryError, RegistrySurface,
    ToolRegistry, ToolsChangedEvent,
};

// =============================================================================
// Scripted connection
// =============================================================================

#[derive(Default)]
struct Script {
    tools: Mutex<Vec<String>>,
    connected: AtomicBool,
    closes: AtomicUsize,
    listings: AtomicUsize,
    fail_listing: AtomicBool,
    discovery_gate: Option<Arc<Notify>>,
    call_delay: Option<Duration>,
}

#[derive(Clone)]
struct Scripted(Arc<Script>);

impl Scripted {
    fn new(tools: &[&str]) -> Self {
        Self::from_script(Script::default(), tools)
    }

    fn from_script(script: Script, tools: &[&str]) -> Self {
        *script.tools.lock() = tools.iter().map(ToString::to_string).collect();
        script.connected.store(true, Ordering::SeqCst);
        Self(Arc::new(script))
    }

    fn set_tools(&self, tools: &[&str]) {
        *self.0.tools.lock() = tools.iter().map(ToString::to_string).collect();
    }

    fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for Scripted {
    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, ConnectionError> {
        self.0.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.0.discovery_gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        if self.0.fail_listing.load(Ordering::SeqCst) {
            return Err(ConnectionError::Rpc {
                code: -32603,
                message: "listing unavailable".to_string(),
            });
        }
        let names = self.0.tools.lock().clone();
        Ok(names
            .into_iter()
            .map(|name| Tool::new(name.clone(), format!("{name} tool"), json!({"type": "object"})))
            .collect())
    }

    async fn call_tool(&self, call: ToolArguments) -> Result<ToolResult, ConnectionError> {
        if let Some(delay) = self.0.call_delay {
            tokio::time::sleep(delay).await;
        }
        if call.name == "fails" {
            return Ok(ToolResult::error("it failed"));
        }
        Ok(ToolResult::text(format!("{} ran", call.name)))
    }

    async fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        self.0.connected.store(false, Ordering::SeqCst);
    }
}

fn names(tools: &[mcp_hub::registry::ToolDescriptor]) -> Vec<String> {
    tools.iter().map(|d| d.qualified_name.clone()).collect()
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_indexes_qualified_names() {
    let registry = ToolRegistry::new();
    let count = registry
        .register_server("s1", Scripted::new(&["echo"]))
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert!(registry.has_tool("s1:echo"));
    assert_eq!(registry.all_tools().len(), 1);

    let desc = registry.find_tool("s1:echo").unwrap();
    assert_eq!(desc.server_id, "s1");
    assert_eq!(desc.name, "echo");
}

#[tokio::test]
async fn test_duplicate_id_leaves_state_unchanged() {
    let registry = ToolRegistry::new();
    registry
        .register_server("s1", Scripted::new(&["a", "b"]))
        .await
        .unwrap();

    let second = Scripted::new(&["c"]);
    let err = registry
        .register_server("s1", second.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::DuplicateServerId { ref server_id } if server_id == "s1"));
    assert_eq!(registry.server_count(), 1);
    assert_eq!(registry.tool_count(), 2);
    assert_eq!(second.0.listings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_same_tool_name_on_two_servers() {
    let registry = ToolRegistry::new();
    registry
        .register_server("s1", Scripted::new(&["search"]))
        .await
        .unwrap();
    registry
        .register_server("s2", Scripted::new(&["search"]))
        .await
        .unwrap();

    assert_eq!(names(&registry.all_tools()), vec!["s1:search", "s2:search"]);
    assert_eq!(registry.tools_for_server("s2").len(), 1);
}

#[tokio::test]
async fn test_detached_registration() {
    let registry = Arc::new(ToolRegistry::new());
    let task = registry
        .register_server_detached("s1", Scripted::new(&["a", "b"]))
        .unwrap();

    assert!(registry.contains_server("s1"));
    assert!(matches!(
        registry.register_server_detached("s1", Scripted::new(&[])),
        Err(RegistryError::DuplicateServerId { .. })
    ));

    assert_eq!(task.await.unwrap(), 2);
    assert!(registry.has_tool("s1:b"));
}

// =============================================================================
// Removal and refresh
// =============================================================================

#[tokio::test]
async fn test_unregister_removes_only_that_server() {
    let registry = ToolRegistry::new();
    let s1 = Scripted::new(&["search", "fetch"]);
    registry.register_server("s1", s1.clone()).await.unwrap();
    registry
        .register_server("s2", Scripted::new(&["search"]))
        .await
        .unwrap();

    registry.unregister_server("s1").await.unwrap();

    assert_eq!(names(&registry.all_tools()), vec!["s2:search"]);
    assert!(!registry.contains_server("s1"));
    assert_eq!(s1.closes(), 1);
}

#[tokio::test]
async fn test_refresh_replaces_tool_set() {
    let registry = ToolRegistry::new();
    let s1 = Scripted::new(&["old"]);
    registry.register_server("s1", s1.clone()).await.unwrap();

    s1.set_tools(&["new1", "new2"]);
    assert_eq!(registry.refresh_tools("s1").await.unwrap(), 2);
    assert!(!registry.has_tool("s1:old"));
    assert!(registry.has_tool("s1:new2"));

    assert!(matches!(
        registry.refresh_tools("ghost").await,
        Err(RegistryError::ServerNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_is_atomic_for_readers() {
    let registry = Arc::new(ToolRegistry::new());
    let s1 = Scripted::new(&["a1", "a2", "a3"]);
    registry.register_server("s1", s1.clone()).await.unwrap();
    registry
        .register_server("s2", Scripted::new(&["x", "y"]))
        .await
        .unwrap();

    let old: Vec<String> = vec!["s1:a1".into(), "s1:a2".into(), "s1:a3".into()];
    let new: Vec<String> = vec!["s1:b1".into(), "s1:b2".into()];

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let registry = Arc::clone(&registry);
        let stop = Arc::clone(&stop);
        let (old, new) = (old.clone(), new.clone());
        readers.push(tokio::spawn(async move {
            let mut observations = 0_usize;
            while !stop.load(Ordering::SeqCst) {
                let s1_tools = names(&registry.tools_for_server("s1"));
                assert!(
                    s1_tools == old || s1_tools == new,
                    "observed mixed tool set: {s1_tools:?}"
                );
                assert_eq!(registry.tools_for_server("s2").len(), 2);
                observations += 1;
                tokio::task::yield_now().await;
            }
            observations
        }));
    }

    for round in 0..50 {
        if round % 2 == 0 {
            s1.set_tools(&["b1", "b2"]);
        } else {
            s1.set_tools(&["a1", "a2", "a3"]);
        }
        registry.refresh_tools("s1").await.unwrap();
    }

    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test]
async fn test_refresh_all_succeeds_for_every_server() {
    let registry = ToolRegistry::new();
    let s1 = Scripted::new(&["a"]);
    registry.register_server("s1", s1.clone()).await.unwrap();
    registry
        .register_server("s2", Scripted::new(&["b"]))
        .await
        .unwrap();

    s1.set_tools(&["a", "c"]);
    assert!(registry.refresh_all().await.is_empty());
    assert!(registry.has_tool("s1:c"));
}

#[tokio::test]
async fn test_refresh_all_isolates_failing_server() {
    let registry = ToolRegistry::new();
    let bad = Scripted::new(&["old"]);
    let good = Scripted::new(&["t"]);
    registry.register_server("bad", bad.clone()).await.unwrap();
    registry.register_server("good", good.clone()).await.unwrap();

    bad.0.fail_listing.store(true, Ordering::SeqCst);
    bad.set_tools(&["never"]);
    good.set_tools(&["t", "u"]);

    let failures = registry.refresh_all().await;
    assert_eq!(failures.len(), 1);
    let (server_id, error) = &failures[0];
    assert_eq!(server_id, "bad");
    assert!(
        matches!(error, RegistryError::Discovery { server_id, .. } if server_id == "bad"),
        "unexpected error: {error:?}"
    );

    assert_eq!(names(&registry.tools_for_server("good")), vec!["good:t", "good:u"]);
    assert_eq!(names(&registry.tools_for_server("bad")), vec!["bad:old"]);
    assert!(!registry.has_tool("bad:never"));
    assert!(registry.contains_server("bad"));
}

#[tokio::test]
async fn test_not_connected_discovery_is_skipped() {
    let registry = ToolRegistry::new();
    let conn = Scripted::new(&["echo"]);
    conn.0.connected.store(false, Ordering::SeqCst);

    assert_eq!(registry.register_server("s1", conn.clone()).await.unwrap(), 0);
    assert_eq!(conn.0.listings.load(Ordering::SeqCst), 0);
    assert_eq!(registry.is_connected("s1"), Some(false));
    assert_eq!(registry.is_connected("nope"), None);
}

#[tokio::test]
async fn test_stale_discovery_is_discarded() {
    let registry = Arc::new(ToolRegistry::new());
    let gate = Arc::new(Notify::new());
    let conn = Scripted::from_script(
        Script {
            discovery_gate: Some(Arc::clone(&gate)),
            ..Script::default()
        },
        &["late"],
    );

    let task = registry
        .register_server_detached("s1", conn.clone())
        .unwrap();
    while conn.0.listings.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    registry.unregister_server("s1").await.unwrap();
    gate.notify_one();

    assert_eq!(task.await.unwrap(), 0);
    assert!(!registry.has_tool("s1:late"));
    assert_eq!(registry.tool_count(), 0);
}

#[tokio::test]
async fn test_close_closes_every_connection_once() {
    let registry = ToolRegistry::new();
    let s1 = Scripted::new(&["a"]);
    let s2 = Scripted::new(&["b"]);
    registry.register_server("s1", s1.clone()).await.unwrap();
    registry.register_server("s2", s2.clone()).await.unwrap();

    registry.close().await;

    assert_eq!((s1.closes(), s2.closes()), (1, 1));
    assert_eq!(registry.server_count(), 0);
    assert_eq!(registry.tool_count(), 0);
}

// =============================================================================
// Lookup and invocation
// =============================================================================

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let registry = ToolRegistry::new();
    registry
        .register_server("s1", Scripted::new(&["search", "fetch"]))
        .await
        .unwrap();

    assert_eq!(names(&registry.search_tools("SEA")), vec!["s1:search"]);
    assert_eq!(registry.search_tools("S1:").len(), 2);
    assert!(registry.search_tools("zzz").is_empty());
}

#[tokio::test]
async fn test_call_unknown_tool() {
    let registry = ToolRegistry::new();
    registry
        .register_server("s1", Scripted::new(&["echo"]))
        .await
        .unwrap();
    let before = registry.stats();

    let err = registry
        .call_tool("s1:missing", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ToolNotFound { ref qualified_name } if qualified_name == "s1:missing"));
    assert_eq!(registry.stats(), before);
}

#[tokio::test]
async fn test_call_routes_and_keeps_tool_errors_in_band() {
    let registry = ToolRegistry::new();
    registry
        .register_server("s1", Scripted::new(&["echo", "fails"]))
        .await
        .unwrap();

    let ok = registry.call_tool("s1:echo", Map::new()).await.unwrap();
    assert_eq!(ok.joined_text(), "echo ran");

    let failed = registry.call_tool("s1:fails", Map::new()).await.unwrap();
    assert!(failed.is_error);
}

#[tokio::test]
async fn test_async_call_can_be_cancelled() {
    let registry = Arc::new(ToolRegistry::new());
    let slow = Scripted::from_script(
        Script {
            call_delay: Some(Duration::from_secs(30)),
            ..Script::default()
        },
        &["slow"],
    );
    registry.register_server("s1", slow).await.unwrap();

    let handle = registry.call_tool_async("s1:slow", Map::new());
    assert_eq!(handle.qualified_name(), "s1:slow");
    handle.cancel();

    assert!(matches!(
        handle.await,
        Err(RegistryError::Cancelled { ref qualified_name }) if qualified_name == "s1:slow"
    ));
}

#[tokio::test]
async fn test_cancel_after_completion_is_noop() {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register_server("s1", Scripted::new(&["quick"]))
        .await
        .unwrap();

    let handle = registry.call_tool_async("s1:quick", Map::new());
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    handle.cancel();

    assert_eq!(handle.await.unwrap().joined_text(), "quick ran");
}

#[tokio::test]
async fn test_async_call_reports_lookup_failure() {
    let registry = Arc::new(ToolRegistry::new());
    let result = registry.call_tool_async("nope:tool", Map::new()).await;
    assert!(matches!(result, Err(RegistryError::ToolNotFound { .. })));
}

// =============================================================================
// Listeners
// =============================================================================

#[tokio::test]
async fn test_listener_failure_is_isolated() {
    let registry = ToolRegistry::new();
    let events: Arc<Mutex<Vec<ToolsChangedEvent>>> = Arc::default();

    registry.add_listener(|_: &ToolsChangedEvent| panic!("listener bug"));
    let sink = Arc::clone(&events);
    let id = registry.add_listener(move |event: &ToolsChangedEvent| {
        sink.lock().push(event.clone());
    });

    registry
        .register_server("s1", Scripted::new(&["a", "b"]))
        .await
        .unwrap();
    registry.unregister_server("s1").await.unwrap();

    {
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::Registered);
        assert_eq!(events[0].server_id.as_deref(), Some("s1"));
        assert_eq!(events[0].server_tools, 2);
        assert_eq!(events[1].kind, ChangeKind::Unregistered);
        assert_eq!(events[1].total_tools, 0);
    }

    assert!(registry.remove_listener(id));
    registry
        .register_server("s2", Scripted::new(&[]))
        .await
        .unwrap();
    assert_eq!(events.lock().len(), 2);
}

// =============================================================================
// Registry served as an MCP server
// =============================================================================

#[tokio::test]
async fn test_gateway_end_to_end() {
    let registry = Arc::new(ToolRegistry::new());
    for id in ["alpha", "beta"] {
        let conn = LocalConnection::for_surface(Arc::new(EchoSurface::new()));
        conn.connect().await.unwrap();
        registry.register_server(id, conn).await.unwrap();
    }

    let handler = ProtocolHandler::new(Arc::new(RegistrySurface::new(Arc::clone(&registry))));
    handler
        .handle_line(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"t"}}}"#,
        )
        .await
        .unwrap();

    let list = handler
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await
        .unwrap();
    let list: Value = serde_json::to_value(list).unwrap();
    let tool_names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(tool_names.contains(&"alpha:echo"));
    assert!(tool_names.contains(&"beta:echo"));

    let reply = handler
        .handle_line(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"beta:reverse","arguments":{"text":"hub"}}}"#,
        )
        .await
        .unwrap();
    let reply: Value = serde_json::to_value(reply).unwrap();
    assert_eq!(reply["id"], 3);
    assert_eq!(reply["result"]["content"][0]["text"], "buh");

    let missing = handler
        .handle_line(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"gamma:echo","arguments":{}}}"#,
        )
        .await
        .unwrap();
    let missing: Value = serde_json::to_value(missing).unwrap();
    assert_eq!(missing["result"]["isError"], true);

    registry.close().await;
}
