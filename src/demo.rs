//! Two small MCP servers: a calculator and a user directory with a resource.
//!
//! They back the `mcp-testkit-demo-server` binary and double as in-process
//! fixtures for the crate's own tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::dispatch::McpHandler;
use crate::protocol::{
    CallToolResult, Implementation, ReadResourceResult, Resource, ResourceContents, Tool,
};

pub const USERS_RESOURCE_URI: &str = "users://all";

fn number_pair_schema(a: &str, b: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "number", "description": a},
            "b": {"type": "number", "description": b}
        },
        "required": ["a", "b"]
    })
}

enum Operand {
    Int(i64),
    Float(f64),
}

fn operand(arguments: &Value, key: &str) -> Option<Operand> {
    let value = arguments.get(key)?;
    match value.as_i64() {
        Some(i) => Some(Operand::Int(i)),
        None => value.as_f64().map(Operand::Float),
    }
}

fn as_float(operand: &Operand) -> f64 {
    match operand {
        Operand::Int(i) => *i as f64,
        Operand::Float(f) => *f,
    }
}

/// Whole floats keep their `.0` so `10 / 2` reads `5.0`, not `5`.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn arithmetic(
    a: Operand,
    b: Operand,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> String {
    if let (Operand::Int(x), Operand::Int(y)) = (&a, &b) {
        if let Some(result) = int_op(*x, *y) {
            return result.to_string();
        }
    }
    format_float(float_op(as_float(&a), as_float(&b)))
}

/// `add`, `subtract`, `multiply` and `divide` over two numbers
#[derive(Debug, Default)]
pub struct Calculator;

#[async_trait]
impl McpHandler for Calculator {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: "example-calculator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        Ok(vec![
            Tool::new("add", "Add two numbers", number_pair_schema("First number", "Second number")),
            Tool::new(
                "subtract",
                "Subtract two numbers",
                number_pair_schema("First number", "Second number"),
            ),
            Tool::new(
                "multiply",
                "Multiply two numbers",
                number_pair_schema("First number", "Second number"),
            ),
            Tool::new("divide", "Divide two numbers", number_pair_schema("Numerator", "Denominator")),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        if !matches!(name, "add" | "subtract" | "multiply" | "divide") {
            bail!("Unknown tool: {name}");
        }
        let (Some(a), Some(b)) = (operand(&arguments, "a"), operand(&arguments, "b")) else {
            bail!("Missing required arguments: a and b");
        };

        let text = match name {
            "add" => arithmetic(a, b, i64::checked_add, |x, y| x + y),
            "subtract" => arithmetic(a, b, i64::checked_sub, |x, y| x - y),
            "multiply" => arithmetic(a, b, i64::checked_mul, |x, y| x * y),
            _ => {
                let divisor = as_float(&b);
                if divisor == 0.0 {
                    bail!("Cannot divide by zero");
                }
                format_float(as_float(&a) / divisor)
            }
        };
        Ok(CallToolResult::text(text))
    }
}

/// In-memory user store with CRUD tools and a `users://all` resource
#[derive(Debug)]
pub struct UserDirectory {
    users: Mutex<BTreeMap<u64, Value>>,
}

impl Default for UserDirectory {
    fn default() -> Self {
        let users = BTreeMap::from([
            (1, json!({"id": "1", "name": "Alice", "email": "alice@example.com"})),
            (2, json!({"id": "2", "name": "Bob", "email": "bob@example.com"})),
        ]);
        Self {
            users: Mutex::new(users),
        }
    }
}

impl UserDirectory {
    fn all_users(&self) -> Vec<Value> {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn user_id(arguments: &Value) -> Result<(u64, &str)> {
    let id = required_str(arguments, "id").ok_or_else(|| anyhow!("Missing required argument: id"))?;
    let key = id.parse().map_err(|_| anyhow!("User not found: {id}"))?;
    Ok((key, id))
}

#[async_trait]
impl McpHandler for UserDirectory {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: "example-advanced".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        let id_schema = json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "User ID"}
            },
            "required": ["id"]
        });

        Ok(vec![
            Tool::new("get_user", "Get user by ID", id_schema.clone()),
            Tool::new(
                "create_user",
                "Create a new user",
                json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "User name"},
                        "email": {"type": "string", "description": "User email"}
                    },
                    "required": ["name", "email"]
                }),
            ),
            Tool::new(
                "list_users",
                "List all users",
                json!({"type": "object", "properties": {}}),
            ),
            Tool::new("delete_user", "Delete user by ID", id_schema),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        match name {
            "get_user" => {
                let (key, id) = user_id(&arguments)?;
                let users = self.users.lock().unwrap_or_else(|p| p.into_inner());
                let user = users.get(&key).ok_or_else(|| anyhow!("User not found: {id}"))?;
                Ok(CallToolResult::json(user))
            }
            "create_user" => {
                let (Some(user_name), Some(email)) = (
                    required_str(&arguments, "name"),
                    required_str(&arguments, "email"),
                ) else {
                    bail!("Missing required arguments: name and email");
                };

                let mut users = self.users.lock().unwrap_or_else(|p| p.into_inner());
                let key = users.keys().next_back().map_or(1, |last| last + 1);
                let user = json!({"id": key.to_string(), "name": user_name, "email": email});
                users.insert(key, user.clone());
                Ok(CallToolResult::json(&user))
            }
            "list_users" => Ok(CallToolResult::json(&Value::Array(self.all_users()))),
            "delete_user" => {
                let (key, id) = user_id(&arguments)?;
                let mut users = self.users.lock().unwrap_or_else(|p| p.into_inner());
                if users.remove(&key).is_none() {
                    bail!("User not found: {id}");
                }
                Ok(CallToolResult::json(&json!({"success": true})))
            }
            _ => bail!("Unknown tool: {name}"),
        }
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(vec![Resource {
            uri: USERS_RESOURCE_URI.to_string(),
            name: "All Users".to_string(),
            description: Some("List of all users in the system".to_string()),
            mime_type: Some("application/json".to_string()),
        }])
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        if uri != USERS_RESOURCE_URI {
            bail!("Unknown resource: {uri}");
        }
        let text = serde_json::to_string_pretty(&self.all_users())?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(uri, Some("application/json"), text)],
        })
    }
}
