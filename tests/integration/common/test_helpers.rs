use anyhow::Result;
use async_trait::async_trait;
use mcp_testkit::demo::{Calculator, UserDirectory};
use mcp_testkit::protocol::{CallToolResult, Content, Implementation, Tool};
use mcp_testkit::config::CONFIG_PATH_ENV;
use mcp_testkit::{McpHandler, ServerParams};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

pub const DEMO_SERVER_BIN: &str = env!("CARGO_BIN_EXE_mcp-testkit-demo-server");

/// Scratch directory for snapshots written by a test
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub snapshot_dir: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let snapshot_dir = temp_dir.path().join("__snapshots__");
        Ok(Self {
            temp_dir,
            snapshot_dir,
        })
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }
}

pub fn calculator() -> Arc<dyn McpHandler> {
    Arc::new(Calculator)
}

pub fn user_directory() -> Arc<dyn McpHandler> {
    Arc::new(UserDirectory::default())
}

/// Points `MCP_TESTKIT_CONFIG` at `path` until dropped. Tests holding one
/// are serialized so they never see each other's config.
pub struct ConfigOverride {
    _guard: MutexGuard<'static, ()>,
}

impl ConfigOverride {
    pub fn new(path: &Path) -> Self {
        static CONFIG_LOCK: Mutex<()> = Mutex::new(());
        let guard = CONFIG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var(CONFIG_PATH_ENV, path);
        Self { _guard: guard }
    }
}

impl Drop for ConfigOverride {
    fn drop(&mut self) {
        std::env::remove_var(CONFIG_PATH_ENV);
    }
}

/// The demo binary, run as a real child process
pub fn demo_server_params(kind: &str) -> ServerParams {
    ServerParams::new(DEMO_SERVER_BIN).with_args([kind])
}

/// A server with odd but legal behavior, for exercising the assertion
/// helpers' failure paths.
#[derive(Default)]
pub struct Quirky {
    pub call_delay: Duration,
    pub list_delay: Duration,
}

#[async_trait]
impl McpHandler for Quirky {
    fn server_info(&self) -> Implementation {
        Implementation {
            name: "quirky".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    async fn list_tools(&self) -> Result<Vec<Tool>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(vec![
            Tool::new("echo", "Echo arguments back", json!({"type": "object"})),
            Tool::new("echo", "Same name again", json!({"type": "object"})),
            Tool {
                name: "undocumented".to_string(),
                description: None,
                input_schema: json!({}),
            },
            Tool::new("silent", "Returns nothing", json!({"type": "object"})),
            Tool::new("pair", "Returns two items", json!({"type": "object"})),
        ])
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        match name {
            "echo" | "undocumented" => Ok(CallToolResult::json(&arguments)),
            "silent" => Ok(CallToolResult {
                content: Vec::new(),
                is_error: false,
            }),
            "pair" => Ok(CallToolResult {
                content: vec![Content::text("first"), Content::text("second")],
                is_error: false,
            }),
            _ => Err(anyhow::anyhow!("Unknown tool: {name}")),
        }
    }
}

pub fn quirky() -> Arc<dyn McpHandler> {
    Arc::new(Quirky::default())
}
