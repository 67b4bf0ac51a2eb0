use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::errors::{TestkitError, TestkitResult};

/// Render a tool call for messages, e.g. `add(a=1, b=2)`.
///
/// Arguments appear in key order.
pub fn format_tool_signature(tool_name: &str, arguments: &Value) -> String {
    match arguments.as_object() {
        Some(map) if !map.is_empty() => {
            let args = map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{tool_name}({args})")
        }
        _ => format!("{tool_name}()"),
    }
}

/// Truncate to at most `max_length` characters, ending in `...` when cut.
pub fn truncate_string(s: &str, max_length: usize) -> String {
    if s.chars().count() <= max_length {
        return s.to_string();
    }
    let keep = max_length.saturating_sub(3);
    let mut truncated: String = s.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}

/// Recursively merge `override_value` into `base`. Nested objects merge;
/// everything else is replaced.
pub fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let next = match merged.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, other) => other.clone(),
    }
}

/// Strip generic prefixes such as `Error: ` from an error message.
pub fn extract_error_message(message: &str) -> String {
    const PREFIXES: [&str; 3] = ["Error: ", "Exception: ", "RuntimeError: "];

    let mut message = message;
    for prefix in PREFIXES {
        if let Some(rest) = message.strip_prefix(prefix) {
            message = rest;
        }
    }
    message.trim().to_string()
}

/// Compact, length-bounded rendering of any serializable value
pub fn safe_repr<T: serde::Serialize + ?Sized>(value: &T, max_length: usize) -> String {
    match serde_json::to_string(value) {
        Ok(repr) => truncate_string(&repr, max_length),
        Err(_) => format!("<{} object>", std::any::type_name::<T>()),
    }
}

/// Run `future` with a deadline
pub async fn with_timeout<F, T>(
    duration: Duration,
    future: F,
    error_message: Option<&str>,
) -> TestkitResult<T>
where
    F: Future<Output = TestkitResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TestkitError::Timeout {
            operation: error_message.unwrap_or("Operation").to_string(),
            timeout_ms: duration.as_millis() as u64,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff: 2.0,
        }
    }
}

/// Retry `operation` with exponential backoff, returning the last error when
/// every attempt fails.
pub async fn retry_on_failure<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.delay;

    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                debug!("Attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check arguments against the `required` and `properties.*.type` parts of a
/// JSON schema. Returns one message per problem.
pub fn validate_tool_arguments(arguments: &Value, schema: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let empty = Map::new();
    let args = arguments.as_object().unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args.contains_key(field) {
                errors.push(format!("Missing required argument: {field}"));
            }
        }
    }

    let properties = schema.get("properties").and_then(|p| p.as_object());
    for (field, value) in args {
        let Some(expected_type) = properties
            .and_then(|p| p.get(field))
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };

        let actual_type = json_type_name(value);
        let compatible = actual_type == expected_type
            || (expected_type == "number" && actual_type == "integer");
        if !compatible {
            errors.push(format!(
                "Argument '{field}' has wrong type: expected {expected_type}, got {actual_type}"
            ));
        }
    }

    errors
}
