use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::MockMcpClient;
use crate::config::{ServerParams, DEFAULT_TIMEOUT_SECS};
use crate::dispatch::McpHandler;
use crate::errors::{TestkitError, TestkitResult};
use crate::transport::ServerTarget;

/// Owns the lifecycle of one MCP server under test.
///
/// ```ignore
/// let server = McpTestServer::new("python", vec!["server.py".into()], HashMap::new());
/// server.start().await?;
/// let client = server.get_client().await?;
/// client.call_tool("hello", json!({"name": "world"})).await?;
/// server.stop().await;
/// ```
pub struct McpTestServer {
    target: ServerTarget,
    timeout: Duration,
    client: tokio::sync::Mutex<Option<MockMcpClient>>,
}

impl std::fmt::Debug for McpTestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running = self
            .client
            .try_lock()
            .ok()
            .map(|client| client.as_ref().is_some_and(MockMcpClient::is_connected));
        f.debug_struct("McpTestServer")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("running", &running)
            .finish()
    }
}

impl McpTestServer {
    pub fn new(command: &str, args: Vec<String>, env: HashMap<String, String>) -> Self {
        let mut params = ServerParams::new(command).with_args(args);
        params.env = env;
        Self::from_target(ServerTarget::Params(params))
    }

    pub fn in_process(handler: Arc<dyn McpHandler>) -> Self {
        Self::from_target(ServerTarget::InProcess(handler))
    }

    pub fn from_target(target: ServerTarget) -> Self {
        Self {
            target,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    /// Start the server and connect a client to it, bounded by the server timeout.
    ///
    /// Calling this on a running server only logs a warning.
    pub async fn start(&self) -> TestkitResult<()> {
        if self.is_running().await {
            warn!("MCP test server {} is already running", self.target.describe());
            return Ok(());
        }

        info!("Starting MCP test server: {}", self.target.describe());

        let client = MockMcpClient::with_timeout(self.target.clone(), self.timeout);
        let connected = match timeout(self.timeout, client.connect()).await {
            Ok(result) => result,
            Err(_) => Err(TestkitError::Timeout {
                operation: "server startup".to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        match connected {
            Ok(()) => {
                *self.client.lock().await = Some(client);
                info!("MCP test server started successfully");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to start MCP test server: {e}");
                client.disconnect().await;
                self.stop().await;
                Err(TestkitError::ServerStartup {
                    command: self.target.describe(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Disconnect and release the server. Safe to call repeatedly.
    pub async fn stop(&self) {
        if let Some(client) = self.client.lock().await.take() {
            client.disconnect().await;
            info!("MCP test server stopped");
        }
    }

    pub async fn restart(&self) -> TestkitResult<()> {
        info!("Restarting MCP test server");
        self.stop().await;
        self.start().await
    }

    /// The connected client. Clones share the server's connection.
    pub async fn get_client(&self) -> TestkitResult<MockMcpClient> {
        match self.client.lock().await.as_ref() {
            Some(client) if client.is_connected() => Ok(client.clone()),
            _ => Err(TestkitError::NotRunning),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(MockMcpClient::is_connected)
    }

    /// Health check: `tools/list` must succeed within the timeout
    /// (the server timeout when `None`).
    pub async fn wait_for_ready(&self, wait: Option<Duration>) -> TestkitResult<()> {
        let wait = wait.unwrap_or(self.timeout);
        let client = self.get_client().await.map_err(|e| TestkitError::NotReady {
            reason: e.to_string(),
        })?;

        match timeout(wait, client.list_tools()).await {
            Ok(Ok(_)) => {
                debug!("MCP test server is ready");
                Ok(())
            }
            Ok(Err(e)) => Err(TestkitError::NotReady {
                reason: e.to_string(),
            }),
            Err(_) => Err(TestkitError::Timeout {
                operation: "waiting for server readiness".to_string(),
                timeout_ms: wait.as_millis() as u64,
            }),
        }
    }
}

/// Creates servers from one template and stops them together.
pub struct McpTestServerFactory {
    target: ServerTarget,
    timeout: Duration,
    servers: Mutex<Vec<Arc<McpTestServer>>>,
}

impl McpTestServerFactory {
    pub fn new(
        command: &str,
        args: Vec<String>,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        let mut params = ServerParams::new(command).with_args(args);
        params.env = env;
        Self::from_target(ServerTarget::Params(params), timeout)
    }

    pub fn from_target(target: ServerTarget, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            servers: Mutex::new(Vec::new()),
        }
    }

    /// A new, not yet started server, tracked for `stop_all`
    pub fn create(&self) -> Arc<McpTestServer> {
        let server =
            Arc::new(McpTestServer::from_target(self.target.clone()).with_timeout(self.timeout));
        self.servers_guard().push(Arc::clone(&server));
        server
    }

    pub fn len(&self) -> usize {
        self.servers_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every created server and forget them
    pub async fn stop_all(&self) {
        let servers: Vec<_> = self.servers_guard().drain(..).collect();
        futures::future::join_all(servers.iter().map(|server| server.stop())).await;
        debug!("Stopped {} test servers", servers.len());
    }

    fn servers_guard(&self) -> std::sync::MutexGuard<'_, Vec<Arc<McpTestServer>>> {
        self.servers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
