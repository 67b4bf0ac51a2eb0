use crate::common::*;
use mcp_testkit::assertions::*;
use mcp_testkit::client::create_mock_client;
use mcp_testkit::TestkitError;
use serde_json::json;

#[tokio::test]
async fn test_calculator_passes_tool_assertions() {
    let client = create_mock_client(calculator()).await.unwrap();

    assert_tool_count(&client, 4).await.unwrap();
    assert_tools_have_unique_names(&client).await.unwrap();

    let add = assert_tool_exists(&client, "add").await.unwrap();
    assert_tool_schema_valid(&add).unwrap();
    assert!(add.description.unwrap().to_lowercase().contains("add two numbers"));

    for tool in client.list_tools().await.unwrap() {
        assert_tool_schema_valid(&tool).unwrap();
    }

    client.disconnect().await;
}

#[tokio::test]
async fn test_tool_output_assertions() {
    let client = create_mock_client(calculator()).await.unwrap();

    let result = client.call_tool("add", json!({"a": 1.5, "b": 2.3})).await.unwrap();
    assert_tool_output_matches(&result, &json!("3.8"), false).unwrap();

    let result = client.call_tool("divide", json!({"a": 10, "b": 4})).await.unwrap();
    assert_tool_output_matches(&result, &json!("2.5"), false).unwrap();

    let result = client
        .call_tool("multiply", json!({"a": 1000000, "b": 1000000}))
        .await
        .unwrap();
    assert_tool_output_matches(&result, &json!("1000000000000"), false).unwrap();

    client.disconnect().await;
}

#[tokio::test]
async fn test_json_output_partial_match() {
    let client = create_mock_client(user_directory()).await.unwrap();

    let result = client.call_tool("get_user", json!({"id": "1"})).await.unwrap();
    assert_tool_output_matches(&result, &json!({"name": "Alice"}), true).unwrap();
    assert_tool_output_matches(
        &result,
        &json!({"id": "1", "name": "Alice", "email": "alice@example.com"}),
        false,
    )
    .unwrap();

    let err = assert_tool_output_matches(&result, &json!({"name": "Bob"}), true).unwrap_err();
    assert_eq!(err.to_string(), r#"Expected name="Bob", got name="Alice""#);

    client.disconnect().await;
}

#[tokio::test]
async fn test_error_assertions() {
    let client = create_mock_client(calculator()).await.unwrap();

    let error = assert_tool_returns_error(
        &client,
        "divide",
        json!({"a": 10, "b": 0}),
        Some("Cannot divide by zero"),
    )
    .await
    .unwrap();
    assert!(matches!(error, TestkitError::ToolCallFailed { .. }));

    assert_tool_returns_error(&client, "add", json!({"a": 1}), Some("Missing required arguments"))
        .await
        .unwrap();

    let err = assert_tool_returns_error(&client, "add", json!({"a": 1, "b": 2}), None)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Tool 'add' was expected to raise an error but succeeded"
    );

    let err = assert_tool_returns_error(&client, "divide", json!({"a": 1, "b": 0}), Some("overflow"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("raised error but message doesn't match"));

    client.disconnect().await;
}

#[tokio::test]
async fn test_error_assertion_propagates_disconnect() {
    let client = create_mock_client(calculator()).await.unwrap();
    client.disconnect().await;

    let err = assert_tool_returns_error(&client, "divide", json!({"a": 1, "b": 0}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TestkitError::NotConnected));
}

#[tokio::test]
async fn test_failing_tool_assertions() {
    let client = create_mock_client(quirky()).await.unwrap();

    let err = assert_tool_exists(&client, "missing").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Tool 'missing' not found. Available tools: echo, echo, undocumented, silent, pair"
    );

    let err = assert_tool_count(&client, 2).await.unwrap_err();
    assert!(err.to_string().starts_with("Expected 2 tools, found 5"));

    let err = assert_tools_have_unique_names(&client).await.unwrap_err();
    assert!(err.to_string().contains("Duplicate tool names found: echo"));

    let undocumented = client.get_tool("undocumented").await.unwrap().unwrap();
    let err = assert_tool_schema_valid(&undocumented).unwrap_err();
    assert_eq!(err.to_string(), "Tool 'undocumented' must have a description");

    let silent = client.call_tool("silent", json!({})).await.unwrap();
    let err = assert_tool_output_matches(&silent, &json!("x"), false).unwrap_err();
    assert!(err.to_string().starts_with("Tool returned no content"));

    let pair = client.call_tool("pair", json!({})).await.unwrap();
    assert_eq!(extract_tool_output(&pair).unwrap(), json!(["first", "second"]));
    assert_tool_output_matches(&pair, &json!(["first", "second"]), false).unwrap();

    client.disconnect().await;
}

#[tokio::test]
async fn test_resource_assertions() {
    let client = create_mock_client(user_directory()).await.unwrap();

    assert_resource_exists(&client, "users://all").await.unwrap();
    assert_resource_content_matches(&client, "users://all", "alice@example.com", true)
        .await
        .unwrap();

    let err = assert_resource_exists(&client, "users://admins").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Resource 'users://admins' not found. Available resources: users://all"
    );

    let err = assert_resource_content_matches(&client, "users://all", "[]", false)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Resource content mismatch for 'users://all'"));

    client.disconnect().await;
}
