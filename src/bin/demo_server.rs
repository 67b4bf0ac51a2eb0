use anyhow::Result;
use clap::{Parser, ValueEnum};
use mcp_testkit::demo::{Calculator, UserDirectory};
use mcp_testkit::dispatch::{serve_stdio, McpHandler};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DemoKind {
    Calculator,
    Users,
}

/// Example MCP server speaking JSON-RPC over stdio
#[derive(Parser)]
#[command(name = "mcp-testkit-demo-server")]
#[command(version)]
struct Args {
    /// Which example server to run
    #[arg(value_enum, default_value = "calculator")]
    kind: DemoKind,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let handler: Arc<dyn McpHandler> = match args.kind {
        DemoKind::Calculator => Arc::new(Calculator),
        DemoKind::Users => Arc::new(UserDirectory::default()),
    };

    info!("Serving {:?} demo over stdio", args.kind);
    serve_stdio(handler).await
}
