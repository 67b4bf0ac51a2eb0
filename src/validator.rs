use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::MockMcpClient;
use crate::errors::{TestkitError, TestkitResult};
use crate::protocol::{CallToolResult, InitializeResult};

/// Protocol-level checks any well-behaved MCP server should pass
pub struct ProtocolValidator;

impl ProtocolValidator {
    pub fn validate_initialization(client: &MockMcpClient) -> TestkitResult<InitializeResult> {
        let init = client.initialize_result()?;

        if init.protocol_version.is_empty() {
            return Err(TestkitError::assertion(
                "Missing protocolVersion in initialize response",
            ));
        }
        if !init.capabilities.is_object() {
            return Err(TestkitError::assertion(
                "Missing capabilities in initialize response",
            ));
        }

        info!(
            "Server {} {} speaks protocol {}",
            init.server_info.name, init.server_info.version, init.protocol_version
        );
        Ok(init)
    }

    /// Tool names, with warnings for tools missing a description or schema
    pub async fn validate_tool_listing(
        client: &MockMcpClient,
    ) -> TestkitResult<(Vec<String>, Vec<String>)> {
        let tools = client.list_tools().await?;

        let mut names = Vec::new();
        let mut warnings = Vec::new();
        for tool in &tools {
            names.push(tool.name.clone());
            if tool.description.as_deref().unwrap_or("").is_empty() {
                warnings.push(format!("Tool {} missing description", tool.name));
            }
            if !tool.input_schema.is_object() {
                warnings.push(format!("Tool {} missing inputSchema", tool.name));
            }
        }

        if names.is_empty() {
            return Err(TestkitError::assertion("No tools found in server response"));
        }
        Ok((names, warnings))
    }

    pub async fn validate_basic_tool_call(
        client: &MockMcpClient,
        tool_name: &str,
        args: Value,
    ) -> TestkitResult<CallToolResult> {
        let result = client.call_tool(tool_name, args).await?;
        if result.content.is_empty() {
            return Err(TestkitError::assertion(format!(
                "Tool '{tool_name}' response missing content"
            )));
        }
        Ok(result)
    }

    /// Unknown tools must fail and unknown methods must yield a JSON-RPC error.
    /// Returns warnings for lenient behavior.
    pub async fn validate_error_handling(client: &MockMcpClient) -> TestkitResult<Vec<String>> {
        let mut warnings = Vec::new();

        match client.call_tool("non_existent_tool", json!({})).await {
            Ok(result) if !result.is_error => {
                warnings.push("Server should have failed for non-existent tool".to_string())
            }
            Ok(_) | Err(TestkitError::Rpc { .. }) => {}
            Err(e) => return Err(e),
        }

        match client.send_request("invalid_method", json!({})).await {
            Err(TestkitError::Rpc { .. }) => {}
            Ok(_) => {
                return Err(TestkitError::assertion(
                    "Server returned a result for an unknown method",
                ))
            }
            Err(e) => return Err(e),
        }

        Ok(warnings)
    }

    pub async fn run_comprehensive_validation(
        client: &MockMcpClient,
        server_name: &str,
    ) -> ValidationReport {
        let mut report = ValidationReport::new(server_name);

        match Self::validate_initialization(client) {
            Ok(init) => {
                report.initialization_passed = true;
                report.protocol_version = init.protocol_version;
            }
            Err(e) => report.add_error(format!("Initialization failed: {e}")),
        }

        match Self::validate_tool_listing(client).await {
            Ok((tools, warnings)) => {
                report.tools_list_passed = true;
                report.available_tools = tools;
                report.warnings.extend(warnings);
            }
            Err(e) => report.add_error(format!("Tool listing failed: {e}")),
        }

        match Self::validate_error_handling(client).await {
            Ok(warnings) => {
                report.error_handling_passed = true;
                report.warnings.extend(warnings);
            }
            Err(e) => report.add_error(format!("Error handling validation failed: {e}")),
        }

        if let Ok(lines) = client.stderr_lines() {
            for line in lines {
                let lower = line.to_lowercase();
                if lower.contains("error") || lower.contains("failed") {
                    report.add_warning(format!("Stderr: {line}"));
                }
            }
        }

        if report.is_healthy() {
            info!("Validation passed for server: {server_name}");
        } else {
            warn!("Validation failed for server: {server_name}");
        }
        report
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub server_name: String,
    pub initialization_passed: bool,
    pub tools_list_passed: bool,
    pub error_handling_passed: bool,
    pub protocol_version: String,
    pub available_tools: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            initialization_passed: false,
            tools_list_passed: false,
            error_handling_passed: false,
            protocol_version: "unknown".to_string(),
            available_tools: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_healthy(&self) -> bool {
        self.initialization_passed && self.tools_list_passed && self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        let status = |passed: bool| if passed { "PASS" } else { "FAIL" };

        let mut lines = vec![
            format!("=== Validation Report for {} ===", self.server_name),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("Initialization: {}", status(self.initialization_passed)),
            format!("Tools List: {}", status(self.tools_list_passed)),
            format!("Error Handling: {}", status(self.error_handling_passed)),
            format!("Protocol Version: {}", self.protocol_version),
            format!("Available Tools: {}", self.available_tools.join(", ")),
        ];

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.errors.iter().map(|e| format!("  - {e}")));
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("  - {w}")));
        }

        lines.push(format!(
            "Overall Status: {}",
            if self.is_healthy() { "HEALTHY" } else { "UNHEALTHY" }
        ));
        lines.join("\n")
    }
}
