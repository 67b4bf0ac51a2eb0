//! Test harness for MCP servers: a mock client, server lifecycle management,
//! assertions, snapshot testing and protocol validation.

// Error type shared by every helper
pub mod errors;

// Configuration (mcp-testkit.json + environment overrides)
pub mod config;

// JSON-RPC / MCP wire types
pub mod protocol;

// In-process server side and stdio serving
pub mod dispatch;

// Stdio and in-memory connections
pub mod transport;

pub mod client;
pub mod server;

pub mod assertions;
pub mod snapshot;

// Test fixtures and the mcp_test! macro
pub mod fixtures;

pub mod validator;
pub mod utils;

// Example server used by the demo binary and the integration tests
pub mod demo;

// Re-export key types for convenience
pub use assertions::{
    assert_resource_content_matches, assert_resource_exists, assert_tool_count,
    assert_tool_exists, assert_tool_output_matches, assert_tool_returns_error,
    assert_tool_schema_valid, assert_tools_have_unique_names, extract_tool_output,
};
pub use client::{create_mock_client, MockMcpClient};
pub use config::{ServerParams, TestkitConfig};
pub use dispatch::{serve_stdio, Dispatcher, McpHandler};
pub use errors::{TestkitError, TestkitResult};
pub use fixtures::{
    init_test_logging, mcp_client, mcp_client_named, mcp_server_env, mcp_test_server, snapshot,
};
pub use protocol::{CallToolResult, Content, Implementation, Resource, Tool};
pub use server::{McpTestServer, McpTestServerFactory};
pub use snapshot::{SnapshotHelper, SnapshotOutcome};
pub use transport::ServerTarget;
pub use utils::{format_tool_signature, validate_tool_arguments};
pub use validator::{ProtocolValidator, ValidationReport};
