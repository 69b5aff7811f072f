//! Integration tests for tool-server federation over HTTP.
//!
//! Each test stands up one or more wiremock servers speaking the
//! discovery/invocation protocol and drives a `FederationManager`
//! against them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use runloop_core::memory::{ScriptedBackend, ScriptedResponse};
use runloop_core::{
    ConversationState, EngineConfig, ExecutionEngine, ExecutionEvent, ToolCall, ToolFilter,
    ToolRegistry,
};
use runloop_federation::{
    ConnectionState, FederationManager, ServerConfig, WarningKind,
};

/// Mount a discovery endpoint advertising the given tool names.
async fn mount_catalog(server: &MockServer, names: &[&str]) {
    let tools: Vec<_> = names
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "description": format!("remote tool {name}"),
                "input_schema": {"type": "object"}
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tools": tools })))
        .mount(server)
        .await;
}

/// Mount an invocation endpoint for one tool returning a fixed body.
async fn mount_tool(server: &MockServer, name: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/tools/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn manager() -> FederationManager {
    FederationManager::new(Arc::new(ToolRegistry::new()))
}

#[tokio::test]
async fn test_connect_all_survives_one_unreachable_server() {
    let alpha = MockServer::start().await;
    let beta = MockServer::start().await;
    mount_catalog(&alpha, &["search", "fetch"]).await;
    mount_catalog(&beta, &["summarize"]).await;

    let manager = manager();
    let report = manager
        .connect_all(vec![
            ServerConfig::new("alpha", alpha.uri()),
            ServerConfig::new("beta", beta.uri()),
            // Nothing listens here; the connection is refused immediately
            ServerConfig::new("gamma", "http://127.0.0.1:9")
                .with_connect_timeout(Duration::from_secs(2)),
        ])
        .await;

    assert_eq!(report.connections.len(), 3);
    assert_eq!(report.tool_count(), 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].server_id, "gamma");
    assert_eq!(report.warnings[0].kind, WarningKind::ServerConnectError);

    let registry = manager.registry();
    assert!(registry.has("alpha__search"));
    assert!(registry.has("alpha__fetch"));
    assert!(registry.has("beta__summarize"));
    assert_eq!(registry.len(), 3);

    let gamma = manager.connection("gamma").await.unwrap();
    assert_eq!(gamma.state, ConnectionState::Failed);
    assert_eq!(gamma.tool_count, 0);
}

#[tokio::test]
async fn test_colliding_raw_names_stay_distinct_across_servers() {
    let alpha = MockServer::start().await;
    let beta = MockServer::start().await;
    mount_catalog(&alpha, &["search"]).await;
    mount_catalog(&beta, &["search"]).await;

    let manager = manager();
    let report = manager
        .connect_all(vec![
            ServerConfig::new("alpha", alpha.uri()),
            ServerConfig::new("beta", beta.uri()),
        ])
        .await;

    assert!(report.is_clean());
    assert!(manager.registry().has("alpha__search"));
    assert!(manager.registry().has("beta__search"));
}

#[tokio::test]
async fn test_slow_server_times_out_without_blocking_others() {
    let fast = MockServer::start().await;
    mount_catalog(&fast, &["ping"]).await;

    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"tools": []}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow)
        .await;

    let manager = manager();
    let started = tokio::time::Instant::now();
    let report = manager
        .connect_all(vec![
            ServerConfig::new("fast", fast.uri()),
            ServerConfig::new("slow", slow.uri())
                .with_connect_timeout(Duration::from_millis(200)),
        ])
        .await;

    // Attempts run concurrently; the total is bounded by the slow
    // server's own timeout, not the sum of both attempts
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.tool_count(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].server_id, "slow");
    assert_eq!(report.warnings[0].kind, WarningKind::ServerConnectError);
    assert!(manager.registry().has("fast__ping"));
}

#[tokio::test]
async fn test_disconnect_removes_only_that_servers_tools() {
    let alpha = MockServer::start().await;
    let beta = MockServer::start().await;
    mount_catalog(&alpha, &["search", "fetch"]).await;
    mount_catalog(&beta, &["summarize"]).await;

    let manager = manager();
    manager
        .connect_all(vec![
            ServerConfig::new("alpha", alpha.uri()),
            ServerConfig::new("beta", beta.uri()),
        ])
        .await;
    assert_eq!(manager.registry().len(), 3);

    let removed = manager.disconnect("alpha").await;
    assert_eq!(removed, 2);
    assert!(!manager.registry().has("alpha__search"));
    assert!(manager.registry().has("beta__summarize"));

    let alpha_conn = manager.connection("alpha").await.unwrap();
    assert_eq!(alpha_conn.state, ConnectionState::Disconnected);
    assert_eq!(alpha_conn.tool_count, 0);
}

#[tokio::test]
async fn test_reconnect_while_connected_is_a_no_op() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["ping"]).await;

    let manager = manager();
    let first = manager.connect(ServerConfig::new("alpha", server.uri())).await;
    assert_eq!(first.state, ConnectionState::Connected);

    let second = manager.connect(ServerConfig::new("alpha", server.uri())).await;
    assert_eq!(second.state, ConnectionState::Connected);
    assert_eq!(second.connected_at, first.connected_at);
    assert_eq!(manager.registry().len(), 1);
}

#[tokio::test]
async fn test_concurrent_connects_register_tools_once() {
    let server = MockServer::start().await;
    // Slow discovery so the two attempts overlap
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"tools": [
                    {"name": "ping", "input_schema": {"type": "object"}}
                ]}))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let manager = manager();
    let config = ServerConfig::new("alpha", server.uri());
    let (first, second) = tokio::join!(
        manager.connect(config.clone()),
        manager.connect(config.clone()),
    );

    // One attempt ran discovery; the other observed it in flight and
    // returned without registering anything
    assert_eq!(manager.registry().len(), 1);
    assert!(manager.registry().has("alpha__ping"));
    assert_eq!(
        first.tool_count + second.tool_count,
        1,
        "exactly one attempt contributed tools"
    );

    let stored = manager.connection("alpha").await.unwrap();
    assert_eq!(stored.state, ConnectionState::Connected);
    assert_eq!(stored.tool_count, 1);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_restores_tools() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["ping"]).await;

    let manager = manager();
    manager.connect(ServerConfig::new("alpha", server.uri())).await;
    manager.disconnect("alpha").await;
    assert_eq!(manager.registry().len(), 0);

    let reconnected = manager.connect(ServerConfig::new("alpha", server.uri())).await;
    assert_eq!(reconnected.state, ConnectionState::Connected);
    assert_eq!(reconnected.tool_count, 1);
    assert!(manager.registry().has("alpha__ping"));
}

#[tokio::test]
async fn test_include_exclude_filtering_applies_to_discovery() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["read_file", "write_file", "read_dir", "delete"]).await;

    let manager = manager();
    let report = manager
        .connect_all(vec![ServerConfig::new("files", server.uri())
            .with_include(["read*"])
            .with_exclude(["*dir"])])
        .await;

    assert_eq!(report.tool_count(), 1);
    assert!(manager.registry().has("files__read_file"));
    assert!(!manager.registry().has("files__read_dir"));
    assert!(!manager.registry().has("files__write_file"));
    assert!(!manager.registry().has("files__delete"));
}

#[tokio::test]
async fn test_filtering_everything_out_warns_discovery_empty() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["alpha", "beta"]).await;

    let manager = manager();
    let report = manager
        .connect_all(vec![
            ServerConfig::new("empty", server.uri()).with_exclude(["*"]),
        ])
        .await;

    assert_eq!(report.tool_count(), 0);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::ServerDiscoveryEmpty);
    let conn = manager.connection("empty").await.unwrap();
    assert_eq!(conn.state, ConnectionState::Connected);
}

#[tokio::test]
async fn test_federated_tool_invocation_round_trip() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["lookup"]).await;
    Mock::given(method("POST"))
        .and(path("/tools/lookup"))
        .and(body_json(json!({"arguments": {"key": "k1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": 42})))
        .mount(&server)
        .await;

    let manager = manager();
    manager.connect(ServerConfig::new("kv", server.uri())).await;

    let call = ToolCall {
        id: "call_1".to_string(),
        name: "kv__lookup".to_string(),
        arguments: json!({"key": "k1"}),
    };
    let result = manager.registry().invoke(&call).await;
    assert!(result.succeeded());
    assert_eq!(result.result, Some(json!({"value": 42})));
}

#[tokio::test]
async fn test_remote_failure_surfaces_as_tool_error() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["flaky"]).await;
    Mock::given(method("POST"))
        .and(path("/tools/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let manager = manager();
    manager.connect(ServerConfig::new("ext", server.uri())).await;

    let call = ToolCall {
        id: "call_1".to_string(),
        name: "ext__flaky".to_string(),
        arguments: json!({}),
    };
    let result = manager.registry().invoke(&call).await;
    assert!(!result.succeeded());
    let error = result.error.unwrap();
    assert!(error.contains("ToolExecutionError"), "got: {error}");
    assert!(error.contains("flaky"), "got: {error}");
}

#[tokio::test]
async fn test_remote_call_timeout_surfaces_as_tool_error() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["stall"]).await;
    Mock::given(method("POST"))
        .and(path("/tools/stall"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let manager = manager();
    manager
        .connect(
            ServerConfig::new("ext", server.uri())
                .with_call_timeout(Duration::from_millis(100)),
        )
        .await;

    let call = ToolCall {
        id: "call_1".to_string(),
        name: "ext__stall".to_string(),
        arguments: json!({}),
    };
    let result = manager.registry().invoke(&call).await;
    assert!(!result.succeeded());
    assert!(result.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_federated_descriptors_carry_origin() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["ping"]).await;

    let manager = manager();
    manager.connect(ServerConfig::new("remote", server.uri())).await;

    let filter = ToolFilter {
        server_id: Some("remote".to_string()),
        ..ToolFilter::default()
    };
    let descriptors = manager.registry().list(&filter);
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "remote__ping");
    assert_eq!(descriptors[0].origin.server_id(), Some("remote"));
}

#[tokio::test]
async fn test_engine_run_uses_federated_tool() {
    let server = MockServer::start().await;
    mount_catalog(&server, &["weather"]).await;
    mount_tool(&server, "weather", json!({"forecast": "sunny"})).await;

    let registry = Arc::new(ToolRegistry::new());
    let manager = FederationManager::new(Arc::clone(&registry));
    let report = manager
        .connect_all(vec![ServerConfig::new("met", server.uri())])
        .await;
    assert!(report.is_clean());

    let backend = ScriptedBackend::with_responses(vec![
        ScriptedResponse::with_tools(
            "Checking the forecast.",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "met__weather".to_string(),
                arguments: json!({"city": "Oslo"}),
            }],
        ),
        ScriptedResponse::text("It will be sunny."),
    ]);
    let engine = ExecutionEngine::new(EngineConfig::default(), backend, registry);

    let events = engine
        .run_collect(ConversationState::with_user("What's the weather in Oslo?"))
        .await;

    let completed = events
        .iter()
        .find_map(|envelope| match &envelope.event {
            ExecutionEvent::ToolCallCompleted {
                call_id,
                success,
                result,
                ..
            } if call_id == "call_1" => Some((*success, result.clone())),
            _ => None,
        })
        .expect("tool call completion event");
    assert!(completed.0);
    assert_eq!(completed.1, Some(json!({"forecast": "sunny"})));

    match &events.last().expect("terminal event").event {
        ExecutionEvent::ExecutionComplete {
            iterations,
            final_response,
        } => {
            assert_eq!(*iterations, 2);
            assert_eq!(final_response.as_deref(), Some("It will be sunny."));
        }
        other => panic!("expected ExecutionComplete, got {other:?}"),
    }
}
