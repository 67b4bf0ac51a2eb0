use crate::common::*;
use mcp_testkit::client::create_mock_client;
use mcp_testkit::validator::ProtocolValidator;
use serde_json::json;

#[tokio::test]
async fn test_calculator_is_healthy() {
    let client = create_mock_client(calculator()).await.unwrap();

    let report = ProtocolValidator::run_comprehensive_validation(&client, "calculator").await;
    assert!(report.is_healthy(), "{}", report.summary());
    assert!(report.error_handling_passed);
    assert_eq!(report.protocol_version, "2024-11-05");
    assert_eq!(report.available_tools.len(), 4);
    assert!(report.warnings.is_empty());
    assert!(report.summary().ends_with("Overall Status: HEALTHY"));

    client.disconnect().await;
}

#[tokio::test]
async fn test_listing_warnings() {
    let client = create_mock_client(quirky()).await.unwrap();

    let (names, warnings) = ProtocolValidator::validate_tool_listing(&client).await.unwrap();
    assert_eq!(names.len(), 5);
    assert_eq!(warnings, vec!["Tool undocumented missing description".to_string()]);

    client.disconnect().await;
}

#[tokio::test]
async fn test_basic_tool_call() {
    let client = create_mock_client(quirky()).await.unwrap();

    let result = ProtocolValidator::validate_basic_tool_call(&client, "echo", json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(result.joined_text(), r#"{"x":1}"#);

    let err = ProtocolValidator::validate_basic_tool_call(&client, "silent", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Tool 'silent' response missing content");

    client.disconnect().await;
}

#[tokio::test]
async fn test_report_on_disconnected_client() {
    let client = create_mock_client(calculator()).await.unwrap();
    client.disconnect().await;

    let report = ProtocolValidator::run_comprehensive_validation(&client, "gone").await;
    assert!(!report.is_healthy());
    assert!(!report.initialization_passed);
    assert_eq!(report.errors.len(), 3);
    assert!(report.errors[0].starts_with("Initialization failed: Client is not connected"));
}

#[tokio::test]
async fn test_arguments_checked_against_listed_schema() {
    let client = create_mock_client(calculator()).await.unwrap();
    let add = client.get_tool("add").await.unwrap().unwrap();

    let arguments = json!({"a": "one"});
    let problems = mcp_testkit::validate_tool_arguments(&arguments, &add.input_schema);
    assert_eq!(
        problems,
        vec![
            "Missing required argument: b".to_string(),
            "Argument 'a' has wrong type: expected number, got string".to_string(),
        ]
    );
    assert_eq!(mcp_testkit::format_tool_signature("add", &arguments), r#"add(a="one")"#);

    client.disconnect().await;
}
