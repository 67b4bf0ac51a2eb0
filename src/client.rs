//! Mock MCP client for driving servers from tests.
//!
//! ```ignore
//! let client = create_mock_client(ServerParams::new("python").with_args(["server.py"])).await?;
//! let tools = client.list_tools().await?;
//! let result = client.call_tool("add", json!({"a": 1, "b": 2})).await?;
//! client.disconnect().await;
//! ```

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::{ServerParams, DEFAULT_TIMEOUT_SECS};
use crate::dispatch::McpHandler;
use crate::errors::{TestkitError, TestkitResult};
use crate::protocol::{
    client_initialize_params, empty_params, CallToolResult, Implementation, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult,
    ReadResourceResult, Resource, Tool, METHOD_NOT_FOUND,
};
use crate::transport::{Connection, ServerTarget};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Live state of a connected client
struct Session {
    connection: tokio::sync::Mutex<Connection>,
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    next_id: AtomicU64,
    notifications: Mutex<mpsc::UnboundedReceiver<Value>>,
    stderr: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    reader: JoinHandle<()>,
    initialize: InitializeResult,
}

struct ClientInner {
    id: String,
    target: ServerTarget,
    request_timeout: Duration,
    session: Mutex<Option<Arc<Session>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

/// A client that talks to one MCP server, in-process or over stdio.
///
/// Cloning is cheap and clones share the same connection.
#[derive(Clone)]
pub struct MockMcpClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for MockMcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMcpClient")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MockMcpClient {
    pub fn new(target: impl Into<ServerTarget>) -> Self {
        Self::with_timeout(target, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(target: impl Into<ServerTarget>, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                id: format!("client-{}", Uuid::new_v4()),
                target: target.into(),
                request_timeout,
                session: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_params(params: ServerParams) -> Self {
        Self::new(ServerTarget::Params(params))
    }

    pub fn in_process(handler: Arc<dyn McpHandler>) -> Self {
        Self::new(ServerTarget::InProcess(handler))
    }

    pub fn target(&self) -> &ServerTarget {
        &self.inner.target
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    /// Open the transport and run the `initialize` handshake.
    ///
    /// Calling this on a connected client only logs a warning.
    pub async fn connect(&self) -> TestkitResult<()> {
        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            warn!("Client {} is already connected", self.inner.id);
            return Ok(());
        }

        match self.open_session().await {
            Ok(session) => {
                *lock(&self.inner.session) = Some(session);
                debug!(
                    "MockMcpClient {} connected to {}",
                    self.inner.id,
                    self.inner.target.describe()
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to MCP server: {e}");
                Err(match e {
                    TestkitError::Connection { .. } => e,
                    other => TestkitError::Connection {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn open_session(&self) -> TestkitResult<Arc<Session>> {
        let mut connection = Connection::open(&self.inner.target)?;
        let inbound = connection.take_inbound().ok_or_else(|| TestkitError::Connection {
            reason: "transport has no inbound channel".to_string(),
        })?;
        let stderr = connection.take_stderr();
        let outbound = connection.sender();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (notification_sender, notification_receiver) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(
            inbound,
            Arc::clone(&pending),
            notification_sender,
            outbound.clone(),
        ));

        let mut session = Session {
            connection: tokio::sync::Mutex::new(connection),
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            notifications: Mutex::new(notification_receiver),
            stderr: Mutex::new(stderr),
            reader,
            initialize: InitializeResult {
                protocol_version: String::new(),
                capabilities: Value::Null,
                server_info: Implementation {
                    name: String::new(),
                    version: String::new(),
                },
            },
        };

        let handshake = async {
            let result = self
                .request_on(&session, "initialize", client_initialize_params())
                .await?;
            let initialize: InitializeResult =
                serde_json::from_value(result).map_err(|e| TestkitError::InvalidResponse {
                    method: "initialize".to_string(),
                    reason: e.to_string(),
                })?;
            send_notification(&session.outbound, "notifications/initialized", json!({}))?;
            Ok::<_, TestkitError>(initialize)
        };

        let outcome = handshake.await;
        match outcome {
            Ok(initialize) => {
                session.initialize = initialize;
                Ok(Arc::new(session))
            }
            Err(e) => {
                session.reader.abort();
                session.connection.get_mut().close().await;
                Err(e)
            }
        }
    }

    /// Close the connection. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let session = lock(&self.inner.session).take();
        if let Some(session) = session {
            session.reader.abort();
            lock(&session.pending).clear();
            session.connection.lock().await.close().await;
            debug!("MockMcpClient {} disconnected", self.inner.id);
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner.session).is_some()
    }

    fn session(&self) -> TestkitResult<Arc<Session>> {
        lock(&self.inner.session)
            .as_ref()
            .cloned()
            .ok_or(TestkitError::NotConnected)
    }

    /// Send a raw JSON-RPC request and return its `result`.
    pub async fn send_request(&self, method: &str, params: Value) -> TestkitResult<Value> {
        let session = self.session()?;
        self.request_on(&session, method, params).await
    }

    pub async fn send_notification(&self, method: &str, params: Value) -> TestkitResult<()> {
        let session = self.session()?;
        send_notification(&session.outbound, method, params)
    }

    async fn request_on(
        &self,
        session: &Session,
        method: &str,
        params: Value,
    ) -> TestkitResult<Value> {
        let id = session.next_id.fetch_add(1, Ordering::SeqCst);
        let request = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (sender, receiver) = oneshot::channel();
        lock(&session.pending).insert(id, sender);

        if session.outbound.send(request).is_err() {
            lock(&session.pending).remove(&id);
            return Err(TestkitError::TransportClosed {
                reason: format!("could not send '{method}'"),
            });
        }

        let response = match timeout(self.inner.request_timeout, receiver).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(TestkitError::TransportClosed {
                    reason: format!("server closed the connection before replying to '{method}'"),
                })
            }
            Err(_) => {
                lock(&session.pending).remove(&id);
                return Err(TestkitError::Timeout {
                    operation: format!("'{method}' request"),
                    timeout_ms: self.inner.request_timeout.as_millis() as u64,
                });
            }
        };

        if let Some(error) = response.error {
            return Err(TestkitError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        response.result.ok_or_else(|| TestkitError::InvalidResponse {
            method: method.to_string(),
            reason: "response has neither result nor error".to_string(),
        })
    }

    async fn request_typed<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> TestkitResult<T> {
        let result = self.send_request(method, params).await?;
        serde_json::from_value(result).map_err(|e| TestkitError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn ping(&self) -> TestkitResult<()> {
        self.send_request("ping", empty_params()).await.map(|_| ())
    }

    /// Result of the `initialize` handshake
    pub fn initialize_result(&self) -> TestkitResult<InitializeResult> {
        Ok(self.session()?.initialize.clone())
    }

    pub fn server_info(&self) -> TestkitResult<Implementation> {
        Ok(self.session()?.initialize.server_info.clone())
    }

    pub async fn list_tools(&self) -> TestkitResult<Vec<Tool>> {
        let result: ListToolsResult = self.request_typed("tools/list", empty_params()).await?;
        Ok(result.tools)
    }

    /// Call a tool. A result with `is_error` set is still returned as `Ok`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> TestkitResult<CallToolResult> {
        let arguments = if arguments.is_null() {
            empty_params()
        } else {
            arguments
        };

        match self
            .request_typed::<CallToolResult>(
                "tools/call",
                json!({
                    "name": name,
                    "arguments": arguments
                }),
            )
            .await
        {
            Ok(result) => {
                debug!("Tool '{name}' called successfully");
                Ok(result)
            }
            Err(e) => {
                error!("Tool '{name}' call failed: {e}");
                Err(e)
            }
        }
    }

    pub async fn list_resources(&self) -> TestkitResult<Vec<Resource>> {
        let result: ListResourcesResult =
            self.request_typed("resources/list", empty_params()).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> TestkitResult<ReadResourceResult> {
        match self
            .request_typed::<ReadResourceResult>("resources/read", json!({ "uri": uri }))
            .await
        {
            Ok(result) => {
                debug!("Resource '{uri}' read successfully");
                Ok(result)
            }
            Err(e) => {
                error!("Resource '{uri}' read failed: {e}");
                Err(e)
            }
        }
    }

    pub async fn get_tool(&self, name: &str) -> TestkitResult<Option<Tool>> {
        let tools = self.list_tools().await?;
        Ok(tools.into_iter().find(|tool| tool.name == name))
    }

    pub async fn get_resource(&self, uri: &str) -> TestkitResult<Option<Resource>> {
        let resources = self.list_resources().await?;
        Ok(resources.into_iter().find(|resource| resource.uri == uri))
    }

    /// Drain server notifications received so far
    pub fn notifications(&self) -> TestkitResult<Vec<Value>> {
        let session = self.session()?;
        let mut receiver = lock(&session.notifications);
        let mut drained = Vec::new();
        while let Ok(notification) = receiver.try_recv() {
            drained.push(notification);
        }
        Ok(drained)
    }

    /// Drain lines the server wrote to stderr (empty for in-process servers)
    pub fn stderr_lines(&self) -> TestkitResult<Vec<String>> {
        let session = self.session()?;
        let mut guard = lock(&session.stderr);
        let mut lines = Vec::new();
        if let Some(receiver) = guard.as_mut() {
            while let Ok(line) = receiver.try_recv() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    pub async fn process_id(&self) -> Option<u32> {
        let session = self.session().ok()?;
        let connection = session.connection.lock().await;
        connection.process_id()
    }
}

fn send_notification(
    outbound: &mpsc::UnboundedSender<String>,
    method: &str,
    params: Value,
) -> TestkitResult<()> {
    let notification = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
    outbound
        .send(notification)
        .map_err(|_| TestkitError::TransportClosed {
            reason: format!("could not send '{method}'"),
        })
}

/// Route inbound lines: replies go to their waiting request, notifications
/// are queued, and server-initiated requests are refused.
async fn read_loop(
    mut inbound: mpsc::UnboundedReceiver<String>,
    pending: PendingMap,
    notifications: mpsc::UnboundedSender<Value>,
    outbound: mpsc::UnboundedSender<String>,
) {
    while let Some(line) = inbound.recv().await {
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(_) => {
                debug!("Ignoring non-JSON line from server: {line}");
                continue;
            }
        };

        let method = message.get("method").and_then(|m| m.as_str());
        let id = message.get("id").cloned().filter(|id| !id.is_null());

        match (method, id) {
            (Some(method), Some(id)) => {
                debug!("Refusing server request '{method}'");
                let reply = JsonRpcResponse::failure(id, METHOD_NOT_FOUND, "Method not found");
                if let Ok(reply) = serde_json::to_string(&reply) {
                    let _ = outbound.send(reply);
                }
            }
            (Some(_), None) => {
                let _ = notifications.send(message);
            }
            (None, Some(id)) => {
                let Some(id) = id.as_u64() else {
                    warn!("Response with unexpected id: {id}");
                    continue;
                };
                match serde_json::from_value::<JsonRpcResponse>(message) {
                    Ok(response) => {
                        if let Some(waiter) = lock(&pending).remove(&id) {
                            let _ = waiter.send(response);
                        } else {
                            debug!("No pending request for response id {id}");
                        }
                    }
                    Err(e) => warn!("Malformed response from server: {e}"),
                }
            }
            (None, None) => debug!("Ignoring unroutable message: {line}"),
        }
    }

    // Dropping the senders wakes every waiter with a closed-channel error
    lock(&pending).clear();
}

/// Build a client and connect it
pub async fn create_mock_client(target: impl Into<ServerTarget>) -> TestkitResult<MockMcpClient> {
    let client = MockMcpClient::new(target);
    client.connect().await?;
    Ok(client)
}
