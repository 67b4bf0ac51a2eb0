use thiserror::Error;

/// Error types for the MCP test harness
#[derive(Error, Debug, Clone)]
pub enum TestkitError {
    // Connection and server lifecycle errors
    #[error("Could not connect to MCP server: {reason}")]
    Connection { reason: String },

    #[error("Client is not connected. Call connect() or build it with create_mock_client()")]
    NotConnected,

    #[error("Could not start MCP server '{command}': {reason}")]
    ServerStartup { command: String, reason: String },

    #[error("Server is not started. Call start() before get_client()")]
    NotRunning,

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Server did not become ready: {reason}")]
    NotReady { reason: String },

    // Protocol errors
    #[error("'{method}' failed with JSON-RPC error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Invalid response to '{method}': {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Transport closed: {reason}")]
    TransportClosed { reason: String },

    // Tool errors
    #[error("Tool '{tool}' returned an error: {reason}")]
    ToolCallFailed { tool: String, reason: String },

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    // Test-facing failures
    #[error("{message}")]
    Assertion { message: String },

    #[error("{message}")]
    SnapshotMismatch { name: String, message: String },

    #[error(
        "mcp_server must be a ServerParams value, a {{\"command\", \"args\", \"env\"}} object or a (command, args) tuple, got {found}"
    )]
    InvalidServerTarget { found: String },

    // Configuration and I/O
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("File system error on {path}: {reason}")]
    FileSystem { path: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl TestkitError {
    pub fn assertion(message: impl Into<String>) -> Self {
        TestkitError::Assertion {
            message: message.into(),
        }
    }

    pub fn file_system(path: &std::path::Path, err: std::io::Error) -> Self {
        TestkitError::FileSystem {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// True for failures a test author caused (assertions and snapshot mismatches)
    /// rather than harness or server malfunctions.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            TestkitError::Assertion { .. } | TestkitError::SnapshotMismatch { .. }
        )
    }

    /// JSON-RPC error code, if the server replied with one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            TestkitError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TestkitError {
    fn from(err: serde_json::Error) -> Self {
        TestkitError::Serialization {
            reason: err.to_string(),
        }
    }
}

pub type TestkitResult<T> = Result<T, TestkitError>;
