use crate::common::*;
use mcp_testkit::assertions::{assert_tool_count, assert_tool_exists};
use mcp_testkit::fixtures::{
    init_test_logging, mcp_client, mcp_client_named, mcp_server_env, mcp_test_server,
};
use mcp_testkit::{MockMcpClient, ServerParams, ServerTarget, TestkitError};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

mcp_testkit::mcp_test!(test_macro_provides_connected_client, calculator(), |client: MockMcpClient| async move {
    assert!(client.is_connected());
    assert_tool_count(&client, 4).await?;
    assert_tool_exists(&client, "divide").await?;
    Ok::<(), TestkitError>(())
});

mcp_testkit::mcp_test!(test_macro_with_user_directory, user_directory(), |client: MockMcpClient| async move {
    let created = client
        .call_tool("create_user", json!({"name": "Carol", "email": "carol@example.com"}))
        .await?;
    assert!(!created.is_error);

    let listed = client.call_tool("list_users", json!({})).await?;
    let users: serde_json::Value = serde_json::from_str(&listed.joined_text())?;
    assert_eq!(users.as_array().map(Vec::len), Some(3));
    Ok::<(), TestkitError>(())
});

#[tokio::test]
async fn test_mcp_client_accepts_object_target() {
    init_test_logging();
    let target = ServerTarget::try_from(json!({
        "command": DEMO_SERVER_BIN,
        "args": ["calculator"]
    }))
    .unwrap();

    let client = mcp_client(target).await.unwrap();
    let result = client.call_tool("add", json!({"a": 2, "b": 2})).await.unwrap();
    assert_eq!(result.joined_text(), "4");
    client.disconnect().await;
}

#[tokio::test]
async fn test_mcp_test_server_starts_in_process() {
    init_test_logging();
    let server = mcp_test_server(user_directory(), &HashMap::new()).await.unwrap();

    let client = server.get_client().await.unwrap();
    assert_eq!(client.server_info().unwrap().name, "example-advanced");
    server.stop().await;
}

#[tokio::test]
async fn test_mcp_test_server_merges_env() {
    init_test_logging();
    let params = demo_server_params("calculator").with_env("RUST_LOG", "debug");
    let base_env = HashMap::from([
        ("RUST_LOG".to_string(), "off".to_string()),
        ("MCP_TESTKIT_DEMO".to_string(), "1".to_string()),
    ]);

    let server = mcp_test_server(params, &base_env).await.unwrap();
    match server.target() {
        ServerTarget::Params(ServerParams { env, .. }) => {
            assert_eq!(env["RUST_LOG"], "debug");
            assert_eq!(env["MCP_TESTKIT_DEMO"], "1");
        }
        ServerTarget::InProcess(_) => panic!("expected stdio params"),
    }
    server.wait_for_ready(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_named_client_gets_server_env() {
    init_test_logging();
    let env = TestEnvironment::new().unwrap();
    let config_path = env.temp_dir.path().join("mcp-testkit.json");
    let config = json!({
        "servers": {
            "calc": {"command": DEMO_SERVER_BIN, "args": ["calculator"]}
        },
        "serverEnv": {"RUST_LOG": "info"}
    });
    std::fs::write(&config_path, config.to_string()).unwrap();
    let _config = ConfigOverride::new(&config_path);

    assert_eq!(mcp_server_env().unwrap()["RUST_LOG"], "info");

    let client = mcp_client_named("calc").await.unwrap();
    let result = client.call_tool("add", json!({"a": 20, "b": 22})).await.unwrap();
    assert_eq!(result.joined_text(), "42");

    // The banner only shows up at info level, which serverEnv turned on
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
