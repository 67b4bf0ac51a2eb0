use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mcp_testkit::client::MockMcpClient;
use mcp_testkit::config::{ServerParams, TestkitConfig};
use mcp_testkit::snapshot::SnapshotHelper;
use mcp_testkit::validator::ProtocolValidator;
use std::path::PathBuf;
use std::time::Duration;

/// MCP server test harness
///
/// Checks a server's protocol behavior and manages recorded snapshots.
#[derive(Parser)]
#[command(name = "mcp-testkit")]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run protocol validation against a stdio server
    ///
    /// Example: mcp-testkit validate -- python server.py
    Validate {
        /// Request timeout in seconds (defaults to the configured timeout)
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Server command and its arguments
        #[arg(required = true, last = true)]
        server: Vec<String>,
    },

    /// Inspect or remove recorded snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List snapshots recorded for a test
    List {
        #[arg(long)]
        test: String,

        /// Snapshot directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Delete one snapshot of a test
    Delete {
        #[arg(long)]
        test: String,

        /// Snapshot name, as shown by `list`
        name: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = TestkitConfig::from_environment().context("Failed to load configuration")?;

    match args.command {
        Command::Validate {
            timeout,
            json,
            server,
        } => validate(&config, server, timeout, json).await,
        Command::Snapshots { action } => snapshots(&config, action),
    }
}

async fn validate(
    config: &TestkitConfig,
    server: Vec<String>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let Some((command, args)) = server.split_first() else {
        bail!("No server command given");
    };

    let mut params = ServerParams::new(command).with_args(args.iter().cloned());
    params.merge_env(&config.server_env);
    let server_name = params.command_line();

    let timeout = timeout.map(Duration::from_secs).unwrap_or_else(|| config.timeout());
    let client = MockMcpClient::with_timeout(params, timeout);
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to '{server_name}'"))?;

    let report = ProtocolValidator::run_comprehensive_validation(&client, &server_name).await;
    client.disconnect().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }

    if !report.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

fn snapshots(config: &TestkitConfig, action: SnapshotAction) -> Result<()> {
    match action {
        SnapshotAction::List { test, dir } => {
            let dir = dir.unwrap_or_else(|| config.resolved_snapshot_dir());
            let helper = SnapshotHelper::new(&test, dir)?;
            let names = helper.list_snapshots()?;
            if names.is_empty() {
                println!("No snapshots for '{}'", helper.test_name());
            }
            for name in names {
                println!("{name}");
            }
        }
        SnapshotAction::Delete { test, name, dir } => {
            let dir = dir.unwrap_or_else(|| config.resolved_snapshot_dir());
            let helper = SnapshotHelper::new(&test, dir)?;
            if helper.get_snapshot(&name)?.is_none() {
                bail!("Snapshot '{name}' not found for '{}'", helper.test_name());
            }
            helper.delete_snapshot(&name)?;
            println!("Deleted {}", helper.snapshot_path(&name).display());
        }
    }
    Ok(())
}
