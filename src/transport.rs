use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::config::ServerParams;
use crate::dispatch::{Dispatcher, McpHandler};
use crate::errors::{TestkitError, TestkitResult};

const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(2);

/// What a client connects to: a command spoken to over stdio, or a handler
/// living in the test process.
#[derive(Clone)]
pub enum ServerTarget {
    Params(ServerParams),
    InProcess(Arc<dyn McpHandler>),
}

impl ServerTarget {
    pub fn describe(&self) -> String {
        match self {
            ServerTarget::Params(params) => params.command_line(),
            ServerTarget::InProcess(handler) => format!("in-process:{}", handler.server_info().name),
        }
    }
}

impl std::fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerTarget::Params(params) => f.debug_tuple("Params").field(params).finish(),
            ServerTarget::InProcess(_) => f.write_str("InProcess(..)"),
        }
    }
}

enum Backend {
    Process(Child),
    Task(JoinHandle<()>),
}

/// A line-oriented, bidirectional link to an MCP server.
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Option<mpsc::UnboundedReceiver<String>>,
    stderr: Option<mpsc::UnboundedReceiver<String>>,
    backend: Option<Backend>,
}

impl Connection {
    pub fn open(target: &ServerTarget) -> TestkitResult<Self> {
        match target {
            ServerTarget::Params(params) => Self::spawn_stdio(params),
            ServerTarget::InProcess(handler) => Ok(Self::in_process(Arc::clone(handler))),
        }
    }

    /// Spawn the server as a child process and pump its stdio through channels.
    pub fn spawn_stdio(params: &ServerParams) -> TestkitResult<Self> {
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| TestkitError::Connection {
            reason: format!("failed to spawn '{}': {e}", params.command_line()),
        })?;

        let missing_pipe = |name: &str| TestkitError::Connection {
            reason: format!("failed to capture server {name}"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (stdin_sender, mut stdin_receiver) = mpsc::unbounded_channel::<String>();
        let (stdout_sender, stdout_receiver) = mpsc::unbounded_channel::<String>();
        let (stderr_sender, stderr_receiver) = mpsc::unbounded_channel::<String>();

        // stdin
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_receiver.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!("Failed to write to server stdin: {e}");
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    warn!("Failed to write to server stdin: {e}");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!("Failed to flush server stdin: {e}");
                    break;
                }
            }
        });

        // stdout
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if stdout_sender.send(line.to_string()).is_err() {
                    break;
                }
            }
        });

        // stderr
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "mcp_testkit::server_stderr", "{line}");
                let _ = stderr_sender.send(line);
            }
        });

        debug!("Spawned MCP server: {}", params.command_line());

        Ok(Self {
            outbound: stdin_sender,
            inbound: Some(stdout_receiver),
            stderr: Some(stderr_receiver),
            backend: Some(Backend::Process(child)),
        })
    }

    /// Memory transport: each outbound line is handled by a dispatcher on its
    /// own task and the reply is sent back, so no process or socket is
    /// involved and a slow call never holds up later requests.
    pub fn in_process(handler: Arc<dyn McpHandler>) -> Self {
        let dispatcher = Dispatcher::new(handler);
        let (client_sender, mut server_receiver) = mpsc::unbounded_channel::<String>();
        let (server_sender, client_receiver) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let mut requests = JoinSet::new();
            loop {
                tokio::select! {
                    line = server_receiver.recv() => {
                        let Some(line) = line else { break };
                        let dispatcher = dispatcher.clone();
                        let server_sender = server_sender.clone();
                        requests.spawn(async move {
                            if let Some(reply) = dispatcher.handle_line(&line).await {
                                let _ = server_sender.send(reply);
                            }
                        });
                    }
                    // Reap finished requests
                    Some(_) = requests.join_next(), if !requests.is_empty() => {}
                }
            }
        });

        Self {
            outbound: client_sender,
            inbound: Some(client_receiver),
            stderr: None,
            backend: Some(Backend::Task(task)),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    /// The inbound half can be taken once, by whoever reads replies.
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.inbound.take()
    }

    pub fn take_stderr(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.stderr.take()
    }

    pub fn process_id(&self) -> Option<u32> {
        match &self.backend {
            Some(Backend::Process(child)) => child.id(),
            _ => None,
        }
    }

    pub async fn close(&mut self) {
        match self.backend.take() {
            Some(Backend::Process(mut child)) => terminate(&mut child).await,
            Some(Backend::Task(task)) => task.abort(),
            None => {}
        }
    }
}

/// SIGTERM first so the server can clean up, SIGKILL if it lingers.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is our own child and has not been reaped yet
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            if let Ok(Ok(status)) = timeout(GRACEFUL_SHUTDOWN, child.wait()).await {
                debug!("MCP server exited with {status}");
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        warn!("Failed to kill MCP server process: {e}");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        match self.backend.take() {
            Some(Backend::Process(mut child)) => {
                let _ = child.start_kill();
            }
            Some(Backend::Task(task)) => task.abort(),
            None => {}
        }
    }
}
