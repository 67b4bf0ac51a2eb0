use crate::common::*;
use mcp_testkit::client::{create_mock_client, MockMcpClient};
use mcp_testkit::protocol::{PROTOCOL_VERSION, METHOD_NOT_FOUND};
use mcp_testkit::{McpHandler, TestkitError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_connect_runs_handshake() {
    let client = assert_ok!(create_mock_client(calculator()).await);
    assert!(client.is_connected());

    let init = client.initialize_result().unwrap();
    assert_eq!(init.protocol_version, PROTOCOL_VERSION);
    assert_eq!(client.server_info().unwrap().name, "example-calculator");

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_twice_keeps_session() {
    let client = MockMcpClient::in_process(calculator());
    client.connect().await.unwrap();
    client.connect().await.unwrap();

    assert!(client.is_connected());
    assert_ok!(client.ping().await);
    client.disconnect().await;
}

#[tokio::test]
async fn test_list_and_call_tools() {
    let client = create_mock_client(calculator()).await.unwrap();

    let tools = client.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["add", "subtract", "multiply", "divide"]);

    let result = client.call_tool("add", json!({"a": 5, "b": 3})).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.joined_text(), "8");

    let add = client.get_tool("add").await.unwrap();
    assert!(add.is_some());
    assert!(client.get_tool("sqrt").await.unwrap().is_none());

    client.disconnect().await;
}

#[tokio::test]
async fn test_tool_failure_is_error_result() {
    let client = create_mock_client(calculator()).await.unwrap();

    let result = client
        .call_tool("divide", json!({"a": 1, "b": 0}))
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(result.joined_text(), "Cannot divide by zero");

    client.disconnect().await;
}

#[tokio::test]
async fn test_null_arguments_become_empty_object() {
    let client = create_mock_client(quirky()).await.unwrap();

    let result = client.call_tool("echo", Value::Null).await.unwrap();
    assert_eq!(result.joined_text(), "{}");

    client.disconnect().await;
}

#[tokio::test]
async fn test_resources() {
    let client = create_mock_client(user_directory()).await.unwrap();

    let resources = client.list_resources().await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].uri, "users://all");
    assert!(client.get_resource("users://all").await.unwrap().is_some());
    assert!(client.get_resource("users://none").await.unwrap().is_none());

    let contents = client.read_resource("users://all").await.unwrap().contents;
    let users: Value = serde_json::from_str(contents[0].text.as_deref().unwrap()).unwrap();
    assert_eq!(users.as_array().unwrap().len(), 2);

    let err = client.read_resource("users://none").await.unwrap_err();
    assert!(matches!(err, TestkitError::Rpc { .. }));
    assert!(err.to_string().contains("Unknown resource: users://none"));

    client.disconnect().await;
}

#[tokio::test]
async fn test_unknown_method_is_rpc_error() {
    let client = create_mock_client(calculator()).await.unwrap();

    let err = assert_err!(client.send_request("bogus/method", json!({})).await);
    assert_eq!(err.rpc_code(), Some(METHOD_NOT_FOUND));

    client.disconnect().await;
}

#[tokio::test]
async fn test_requests_after_disconnect_fail() {
    let client = create_mock_client(calculator()).await.unwrap();
    client.disconnect().await;
    client.disconnect().await;

    let err = client.call_tool("add", json!({"a": 1, "b": 2})).await.unwrap_err();
    assert!(matches!(err, TestkitError::NotConnected));
}

#[tokio::test]
async fn test_request_timeout() {
    let handler: Arc<dyn McpHandler> = Arc::new(Quirky {
        call_delay: Duration::from_secs(10),
        ..Quirky::default()
    });
    let client = MockMcpClient::with_timeout(handler, Duration::from_millis(100));
    client.connect().await.unwrap();

    let err = client.call_tool("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, TestkitError::Timeout { .. }));
    assert!(err.to_string().contains("timed out after 100ms"));

    // The slow call is still running; later requests are not queued behind it
    assert_ok!(client.ping().await);
    assert_ok!(client.list_tools().await);

    client.disconnect().await;
}

#[tokio::test]
async fn test_in_process_calls_run_concurrently() {
    let handler: Arc<dyn McpHandler> = Arc::new(Quirky {
        call_delay: Duration::from_millis(300),
        ..Quirky::default()
    });
    let client = MockMcpClient::with_timeout(handler, Duration::from_secs(5));
    client.connect().await.unwrap();

    let started = std::time::Instant::now();
    let calls = (0..5).map(|i| {
        let client = client.clone();
        async move { client.call_tool("echo", json!({"i": i})).await }
    });
    for result in futures::future::join_all(calls).await {
        assert!(!result.unwrap().is_error);
    }
    assert!(
        started.elapsed() < Duration::from_millis(1200),
        "calls ran one after another: {:?}",
        started.elapsed()
    );

    client.disconnect().await;
}

#[test]
fn test_client_debug_shows_state() {
    let client = MockMcpClient::in_process(calculator());
    let rendered = format!("{client:?}");
    assert!(rendered.starts_with("MockMcpClient"));
    assert!(rendered.contains("connected: false"));
}

#[tokio::test]
async fn test_clones_share_connection_concurrently() {
    let client = create_mock_client(calculator()).await.unwrap();

    let calls = (0..10).map(|i| {
        let client = client.clone();
        async move { client.call_tool("multiply", json!({"a": i, "b": 2})).await }
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().joined_text(), (i * 2).to_string());
    }

    client.disconnect().await;
    assert!(!client.clone().is_connected());
}

#[tokio::test]
async fn test_in_process_has_no_stderr_or_pid() {
    let client = create_mock_client(calculator()).await.unwrap();

    assert!(client.stderr_lines().unwrap().is_empty());
    assert!(client.notifications().unwrap().is_empty());
    assert_eq!(client.process_id().await, None);

    client.disconnect().await;
}
