use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::{TestkitError, TestkitResult};

pub const CONFIG_FILE_NAME: &str = "mcp-testkit.json";
pub const CONFIG_PATH_ENV: &str = "MCP_TESTKIT_CONFIG";
pub const UPDATE_SNAPSHOTS_ENV: &str = "MCP_UPDATE_SNAPSHOTS";
pub const TIMEOUT_ENV: &str = "MCP_TEST_TIMEOUT";
pub const SNAPSHOT_DIR_ENV: &str = "MCP_SNAPSHOT_DIR";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How to launch an MCP server over stdio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl ServerParams {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Fill in env vars the params don't already set
    pub fn merge_env(&mut self, base: &HashMap<String, String>) {
        for (key, value) in base {
            self.env
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    pub fn validate(&self) -> TestkitResult<()> {
        if self.command.trim().is_empty() {
            return Err(TestkitError::Configuration {
                reason: "server command must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Harness configuration, read from `mcp-testkit.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestkitConfig {
    /// Named servers tests can refer to
    #[serde(default)]
    pub servers: HashMap<String, ServerParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub update_snapshots: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Env vars given to every server the harness starts
    #[serde(default)]
    pub server_env: HashMap<String, String>,
}

impl TestkitConfig {
    /// Load from `MCP_TESTKIT_CONFIG`, else `<project_dir>/mcp-testkit.json`,
    /// else defaults. Environment overrides are applied last.
    pub fn load(project_dir: Option<&Path>) -> TestkitResult<Self> {
        let config_path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => project_dir
                .map(|dir| dir.join(CONFIG_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME)),
        };

        let mut config = if config_path.exists() {
            debug!("Loading testkit config from {}", config_path.display());
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Config for the crate under test, located via `CARGO_MANIFEST_DIR`
    pub fn from_environment() -> TestkitResult<Self> {
        let manifest_dir = std::env::var_os("CARGO_MANIFEST_DIR").map(PathBuf::from);
        Self::load(manifest_dir.as_deref())
    }

    pub fn from_file(path: &Path) -> TestkitResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TestkitError::file_system(path, e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| TestkitError::Configuration {
                reason: format!("{}: {e}", path.display()),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TestkitResult<()> {
        for (name, server) in &self.servers {
            server.validate().map_err(|_| TestkitError::Configuration {
                reason: format!("server '{name}' has empty command"),
            })?;
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(UPDATE_SNAPSHOTS_ENV) {
            self.update_snapshots = is_truthy(&value);
        }
        if let Some(secs) = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.timeout_secs = Some(secs);
        }
        if let Ok(dir) = std::env::var(SNAPSHOT_DIR_ENV) {
            self.snapshot_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn get_server(&self, name: &str) -> Option<&ServerParams> {
        self.servers.get(name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Configured snapshot directory, or `<manifest dir>/tests/__snapshots__`
    pub fn resolved_snapshot_dir(&self) -> PathBuf {
        if let Some(dir) = &self.snapshot_dir {
            return dir.clone();
        }
        let base = std::env::var_os("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("tests").join("__snapshots__")
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
