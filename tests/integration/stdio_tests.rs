//! Same checks as the in-process tests, against the demo binary as a child
//! process.

use crate::common::*;
use mcp_testkit::assertions::*;
use mcp_testkit::client::{create_mock_client, MockMcpClient};
use mcp_testkit::server::McpTestServer;
use mcp_testkit::validator::ProtocolValidator;
use mcp_testkit::TestkitError;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_stdio_calculator() {
    let client = create_mock_client(demo_server_params("calculator")).await.unwrap();
    assert!(client.process_id().await.is_some());

    assert_tool_count(&client, 4).await.unwrap();
    let result = client.call_tool("divide", json!({"a": 10, "b": 2})).await.unwrap();
    assert_tool_output_matches(&result, &json!("5.0"), false).unwrap();

    assert_tool_returns_error(&client, "divide", json!({"a": 10, "b": 0}), Some("Cannot divide by zero"))
        .await
        .unwrap();

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_stdio_users_resources() {
    let client = create_mock_client(demo_server_params("users")).await.unwrap();

    assert_resource_exists(&client, "users://all").await.unwrap();
    assert_resource_content_matches(&client, "users://all", "\"name\": \"Bob\"", true)
        .await
        .unwrap();

    client
        .call_tool("delete_user", json!({"id": "2"}))
        .await
        .unwrap();
    let err = assert_resource_content_matches(&client, "users://all", "Bob", true)
        .await
        .unwrap_err();
    assert!(matches!(err, TestkitError::Assertion { .. }));

    client.disconnect().await;
}

#[tokio::test]
async fn test_stdio_server_lifecycle() {
    let server = McpTestServer::from_target(demo_server_params("users").into())
        .with_timeout(Duration::from_secs(10));
    server.start().await.unwrap();
    server.wait_for_ready(Some(Duration::from_secs(5))).await.unwrap();

    let client = server.get_client().await.unwrap();
    let report = ProtocolValidator::run_comprehensive_validation(&client, "users").await;
    assert!(report.is_healthy(), "{}", report.summary());

    // A restart spawns a fresh process with the original data
    client.call_tool("delete_user", json!({"id": "1"})).await.unwrap();
    server.restart().await.unwrap();
    let client = server.get_client().await.unwrap();
    let result = client.call_tool("get_user", json!({"id": "1"})).await.unwrap();
    assert_tool_output_matches(&result, &json!({"name": "Alice"}), true).unwrap();

    server.stop().await;
}

#[tokio::test]
async fn test_stdio_server_logs_are_captured() {
    let params = demo_server_params("calculator").with_env("RUST_LOG", "info");
    let client = MockMcpClient::with_timeout(params, Duration::from_secs(10));
    client.connect().await.unwrap();
    client.ping().await.unwrap();

    // stderr is pumped separately from stdout, so give it a moment
    let mut lines = Vec::new();
    for _ in 0..20 {
        lines.extend(client.stderr_lines().unwrap());
        if lines.iter().any(|line| line.contains("demo over stdio")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(
        lines.iter().any(|line| line.contains("Serving Calculator demo over stdio")),
        "{lines:?}"
    );

    client.disconnect().await;
}
