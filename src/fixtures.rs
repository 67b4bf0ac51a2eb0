//! Ready-made building blocks for tests: connected clients, started servers,
//! and snapshot helpers bound to the running test.
//!
//! A server can be described in several shapes, all converted into a
//! [`ServerTarget`]:
//!
//! ```ignore
//! mcp_client(ServerParams::new("python").with_args(["server.py"])).await?;
//! mcp_client(("python", vec!["server.py".to_string()])).await?;
//! mcp_client(ServerTarget::try_from(json!({"command": "python", "args": ["server.py"]}))?).await?;
//! mcp_client(Arc::new(MyHandler) as Arc<dyn McpHandler>).await?;
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

use crate::client::MockMcpClient;
use crate::config::{ServerParams, TestkitConfig};
use crate::dispatch::McpHandler;
use crate::errors::{TestkitError, TestkitResult};
use crate::server::McpTestServer;
use crate::snapshot::SnapshotHelper;
use crate::transport::ServerTarget;

impl From<ServerParams> for ServerTarget {
    fn from(params: ServerParams) -> Self {
        ServerTarget::Params(params)
    }
}

impl From<Arc<dyn McpHandler>> for ServerTarget {
    fn from(handler: Arc<dyn McpHandler>) -> Self {
        ServerTarget::InProcess(handler)
    }
}

impl From<(&str, Vec<String>)> for ServerTarget {
    fn from((command, args): (&str, Vec<String>)) -> Self {
        ServerTarget::Params(ServerParams::new(command).with_args(args))
    }
}

impl From<(&str, Vec<String>, HashMap<String, String>)> for ServerTarget {
    fn from((command, args, env): (&str, Vec<String>, HashMap<String, String>)) -> Self {
        let mut params = ServerParams::new(command).with_args(args);
        params.env = env;
        ServerTarget::Params(params)
    }
}

/// Accepts `{"command": .., "args": [..], "env": {..}, "cwd": ..}`.
impl TryFrom<Value> for ServerTarget {
    type Error = TestkitError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let found = match &value {
            Value::Object(map) if map.contains_key("command") => None,
            Value::Object(_) => Some("an object without 'command'".to_string()),
            other => Some(format!("a JSON {}", json_kind(other))),
        };
        if let Some(found) = found {
            return Err(TestkitError::InvalidServerTarget { found });
        }

        let params: ServerParams =
            serde_json::from_value(value).map_err(|e| TestkitError::InvalidServerTarget {
                found: format!("a malformed server object ({e})"),
            })?;
        params.validate()?;
        Ok(ServerTarget::Params(params))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Install a `tracing` subscriber for tests. Honors `RUST_LOG`; safe to call
/// from every test.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcp_testkit=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A client connected to `target`, using the configured request timeout.
pub async fn mcp_client(target: impl Into<ServerTarget>) -> TestkitResult<MockMcpClient> {
    let config = TestkitConfig::from_environment()?;
    let client = MockMcpClient::with_timeout(target, config.timeout());
    client.connect().await?;
    Ok(client)
}

/// Client for a server named in `mcp-testkit.json`
pub async fn mcp_client_named(name: &str) -> TestkitResult<MockMcpClient> {
    let config = TestkitConfig::from_environment()?;
    let mut params = config
        .get_server(name)
        .cloned()
        .ok_or_else(|| TestkitError::Configuration {
            reason: format!("server '{name}' not found in configuration"),
        })?;
    params.merge_env(&config.server_env);

    let client = MockMcpClient::with_timeout(params, config.timeout());
    client.connect().await?;
    Ok(client)
}

/// Env given to every started server; `serverEnv` from the config file.
pub fn mcp_server_env() -> TestkitResult<HashMap<String, String>> {
    Ok(TestkitConfig::from_environment()?.server_env)
}

/// A started server whose env is `base_env` overlaid with the target's own.
pub async fn mcp_test_server(
    target: impl Into<ServerTarget>,
    base_env: &HashMap<String, String>,
) -> TestkitResult<McpTestServer> {
    let config = TestkitConfig::from_environment()?;
    let target = match target.into() {
        ServerTarget::Params(mut params) => {
            params.merge_env(base_env);
            ServerTarget::Params(params)
        }
        in_process => in_process,
    };

    let server = McpTestServer::from_target(target).with_timeout(config.timeout());
    server.start().await?;
    Ok(server)
}

/// Snapshot helper for the running test, in the configured snapshot directory
pub fn snapshot() -> TestkitResult<SnapshotHelper> {
    let config = TestkitConfig::from_environment()?;
    Ok(SnapshotHelper::for_current_test(config.resolved_snapshot_dir())?
        .with_update(config.update_snapshots))
}

/// Declare a tokio test that receives a connected client and always
/// disconnects it afterwards.
///
/// ```ignore
/// mcp_test!(lists_tools, Arc::new(Calculator) as Arc<dyn McpHandler>, |client| async move {
///     assert_tool_count(&client, 2).await?;
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! mcp_test {
    ($test_name:ident, $target:expr, $test_body:expr) => {
        #[tokio::test]
        async fn $test_name() -> $crate::errors::TestkitResult<()> {
            $crate::fixtures::init_test_logging();

            let client = $crate::fixtures::mcp_client($target).await?;
            let body = $test_body;
            let result = body(client.clone()).await;

            client.disconnect().await;
            result
        }
    };
}
