//! Faust MCP Server
//!
//! Exposes the Faust compiler to AI assistants via the Model Context
//! Protocol (MCP).
//!
//! Usage:
//!   faust-mcp [--config FILE] [--work-dir DIR] [--image IMAGE] [--local]
//!   faust-mcp --write-config      Save the effective configuration
//!
//! The server communicates over stdio using JSON-RPC 2.0.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use faust_core::{Config, FaustBackend, Paths, SystemRunner};
use faust_mcp::tools::{ToolContext, ToolRegistry};
use faust_mcp::McpServer;

/// Faust MCP - the Faust compiler as Model Context Protocol tools
#[derive(Parser)]
#[command(name = "faust-mcp")]
#[command(about = "MCP server exposing Faust compilation, diagrams and spectrograms")]
#[command(version)]
#[command(after_help = r#"CONFIGURATION:
    Settings are read from ~/.config/faust-mcp/config.json, then
    FAUST_MCP_* environment variables, then the flags below.

ENVIRONMENT:
    FAUST_MCP_WORK_DIR         Workspace root seen by this process
    FAUST_MCP_HOST_SHARED_DIR  Workspace root seen by the container host
    FAUST_MCP_DOCKER_IMAGE     Image providing the faust compiler
    FAUST_MCP_BACKEND          container | local
    FAUST_MCP_STAGE_TIMEOUT    Seconds allowed per external command
    RUST_LOG                   Log filter (overrides --log-level)

Logs go to stderr; stdout carries the protocol.
"#)]
struct Cli {
    /// Config file (default: ~/.config/faust-mcp/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Workspace root
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Container image providing faust
    #[arg(long, value_name = "IMAGE")]
    image: Option<String>,

    /// Run a faust binary installed on this host instead of a container
    #[arg(long)]
    local: bool,

    /// Seconds allowed per external command
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| Paths::new().config_file())
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config_path())?;
        config.apply_env()?;

        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(image) = &self.image {
            config.docker_image = image.clone();
        }
        if self.local {
            config.faust_backend = FaustBackend::Local;
        }
        if let Some(secs) = self.timeout {
            config.stage_timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging to stderr (stdout is for MCP protocol)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;
    if cli.write_config {
        let path = cli.config_path();
        config.save(&path)?;
        tracing::info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    tracing::info!(
        "Starting Faust MCP server (backend {:?}, work dir {})",
        config.faust_backend,
        config.work_dir.display()
    );

    let ctx = ToolContext::new(config, Arc::new(SystemRunner));
    if let Err(e) = ctx.workspaces.ensure_workspace() {
        tracing::warn!("{}", e);
    }

    let server = McpServer::new(ToolRegistry::with_defaults(Arc::new(ctx)));
    server.run().await?;

    Ok(())
}
