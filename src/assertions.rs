//! Assertion helpers for MCP servers.
//!
//! Every helper returns `TestkitResult`, with failures reported as
//! [`TestkitError::Assertion`], so a test can use `?` or `.unwrap()`.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::client::MockMcpClient;
use crate::errors::{TestkitError, TestkitResult};
use crate::protocol::{CallToolResult, Content, Tool};

fn joined_names(tools: &[Tool]) -> String {
    tools
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fails unless the server exposes `tool_name`; returns the tool.
pub async fn assert_tool_exists(client: &MockMcpClient, tool_name: &str) -> TestkitResult<Tool> {
    let tools = client.list_tools().await?;

    match tools.iter().find(|t| t.name == tool_name) {
        Some(tool) => Ok(tool.clone()),
        None => Err(TestkitError::assertion(format!(
            "Tool '{tool_name}' not found. Available tools: {}",
            joined_names(&tools)
        ))),
    }
}

pub async fn assert_tool_count(client: &MockMcpClient, expected_count: usize) -> TestkitResult<()> {
    let tools = client.list_tools().await?;

    if tools.len() != expected_count {
        return Err(TestkitError::assertion(format!(
            "Expected {expected_count} tools, found {}: {}",
            tools.len(),
            joined_names(&tools)
        )));
    }
    Ok(())
}

fn content_value(item: &Content) -> Value {
    match item.as_text() {
        Some(text) => Value::String(text.to_string()),
        None => serde_json::to_value(item).unwrap_or(Value::Null),
    }
}

/// The value a tool result "means": the single item's text, or a list of
/// texts when there are several items.
pub fn extract_tool_output(result: &CallToolResult) -> TestkitResult<Value> {
    match result.content.as_slice() {
        [] => Err(TestkitError::assertion(format!(
            "Tool returned no content. Result: {}",
            serde_json::to_string(result).unwrap_or_default()
        ))),
        [single] => Ok(content_value(single)),
        items => Ok(Value::Array(items.iter().map(content_value).collect())),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compare a tool result against `expected`.
///
/// With `partial`, an object `expected` must be a subset of the output and a
/// string `expected` a substring of it. Without it, a textual output is parsed
/// as JSON when `expected` is an object or array.
pub fn assert_tool_output_matches(
    result: &CallToolResult,
    expected: &Value,
    partial: bool,
) -> TestkitResult<()> {
    let mut actual = extract_tool_output(result)?;

    if partial {
        // Object subsets also work against JSON-encoded text output
        if expected.is_object() {
            if let Value::String(text) = &actual {
                if let Ok(parsed @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                    actual = parsed;
                }
            }
        }

        return match (expected, &actual) {
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                for (key, value) in expected_map {
                    let Some(found) = actual_map.get(key) else {
                        return Err(TestkitError::assertion(format!(
                            "Expected key '{key}' not found in result. Actual: {actual}"
                        )));
                    };
                    if found != value {
                        return Err(TestkitError::assertion(format!(
                            "Expected {key}={value}, got {key}={found}"
                        )));
                    }
                }
                Ok(())
            }
            (Value::String(expected_text), Value::String(actual_text)) => {
                if actual_text.contains(expected_text.as_str()) {
                    Ok(())
                } else {
                    Err(TestkitError::assertion(format!(
                        "Expected substring '{expected_text}' not found in '{actual_text}'"
                    )))
                }
            }
            _ => Err(TestkitError::assertion(format!(
                "Partial matching not supported for types {} and {}",
                type_name(expected),
                type_name(&actual)
            ))),
        };
    }

    if expected.is_object() || expected.is_array() {
        if let Value::String(text) = &actual {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                actual = parsed;
            }
        }
    }

    if &actual != expected {
        return Err(TestkitError::assertion(format!(
            "Tool output mismatch.\nExpected: {}\nActual: {}",
            render(expected),
            render(&actual)
        )));
    }
    Ok(())
}

/// Calling the tool must fail, either with a JSON-RPC error or with an
/// `isError` result. Returns the captured error.
pub async fn assert_tool_returns_error(
    client: &MockMcpClient,
    tool_name: &str,
    arguments: Value,
    error_message: Option<&str>,
) -> TestkitResult<TestkitError> {
    let error = match client.call_tool(tool_name, arguments).await {
        Ok(result) if result.is_error => TestkitError::ToolCallFailed {
            tool: tool_name.to_string(),
            reason: result.joined_text(),
        },
        Ok(_) => {
            return Err(TestkitError::assertion(format!(
                "Tool '{tool_name}' was expected to raise an error but succeeded"
            )))
        }
        Err(e @ (TestkitError::NotConnected | TestkitError::TransportClosed { .. })) => {
            return Err(e)
        }
        Err(e) => e,
    };

    if let Some(expected) = error_message {
        if !error.to_string().contains(expected) {
            return Err(TestkitError::assertion(format!(
                "Tool '{tool_name}' raised error but message doesn't match.\n\
                 Expected substring: {expected}\n\
                 Actual error: {error}"
            )));
        }
    }

    Ok(error)
}

pub async fn assert_resource_exists(client: &MockMcpClient, resource_uri: &str) -> TestkitResult<()> {
    let resources = client.list_resources().await?;

    if !resources.iter().any(|r| r.uri == resource_uri) {
        let uris = resources
            .iter()
            .map(|r| r.uri.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(TestkitError::assertion(format!(
            "Resource '{resource_uri}' not found. Available resources: {uris}"
        )));
    }
    Ok(())
}

/// Compare the text of the resource's first content item.
pub async fn assert_resource_content_matches(
    client: &MockMcpClient,
    resource_uri: &str,
    expected_content: &str,
    partial: bool,
) -> TestkitResult<()> {
    let result = client.read_resource(resource_uri).await?;

    let Some(first) = result.contents.first() else {
        return Err(TestkitError::assertion(format!(
            "Resource '{resource_uri}' returned no content"
        )));
    };
    let actual_content = first.text.as_deref().unwrap_or("");

    if partial {
        if !actual_content.contains(expected_content) {
            return Err(TestkitError::assertion(format!(
                "Expected substring not found in resource '{resource_uri}'.\n\
                 Expected: {expected_content}\n\
                 Actual: {actual_content}"
            )));
        }
    } else if actual_content != expected_content {
        return Err(TestkitError::assertion(format!(
            "Resource content mismatch for '{resource_uri}'.\n\
             Expected: {expected_content}\n\
             Actual: {actual_content}"
        )));
    }
    Ok(())
}

pub fn assert_tool_schema_valid(tool: &Tool) -> TestkitResult<()> {
    if tool.name.is_empty() {
        return Err(TestkitError::assertion("Tool must have a name"));
    }

    if tool.description.as_deref().unwrap_or("").is_empty() {
        return Err(TestkitError::assertion(format!(
            "Tool '{}' must have a description",
            tool.name
        )));
    }

    let schema = &tool.input_schema;
    let is_empty = match schema {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        return Err(TestkitError::assertion(format!(
            "Tool '{}' must have an input schema",
            tool.name
        )));
    }

    let Some(schema) = schema.as_object() else {
        return Err(TestkitError::assertion(format!(
            "Tool '{}' input schema must be an object, got {}",
            tool.name,
            type_name(schema)
        )));
    };

    if !schema.contains_key("type") {
        return Err(TestkitError::assertion(format!(
            "Tool '{}' input schema must have a 'type' field",
            tool.name
        )));
    }
    Ok(())
}

pub async fn assert_tools_have_unique_names(client: &MockMcpClient) -> TestkitResult<()> {
    let tools = client.list_tools().await?;

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = tools
        .iter()
        .map(|t| t.name.as_str())
        .filter(|name| !seen.insert(*name))
        .collect();

    if !duplicates.is_empty() {
        return Err(TestkitError::assertion(format!(
            "Duplicate tool names found: {}",
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(())
}
