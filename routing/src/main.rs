//! MCP server for multi-model task routing
//!
//! Serves `route`, `math_code`, `vl_mode`, `light_mode` and `list_backends`
//! over stdio. Logs go to stderr so stdout carries only protocol frames.
//!
//! # Usage
//!
//! ```bash
//! routing-mcp
//! routing-mcp --config router.toml
//! RUST_LOG=routing=debug ROUTER_API_KEY=sk-... routing-mcp
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};

use routing::{ChatCompletionsGateway, Router, RouterConfig, RouterServer};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (environment variables still take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not probe the backend endpoint at startup
    #[arg(long, default_value_t = false)]
    skip_health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RouterConfig::load(args.config.as_deref())?;
    let gateway = Arc::new(
        ChatCompletionsGateway::new(&config.api).context("Failed to create HTTP client")?,
    );

    if !args.skip_health_check && !gateway.check_endpoint().await {
        tracing::warn!(
            base_url = %gateway.base_url(),
            "Backend endpoint not reachable; requests will fail until it is"
        );
    }

    let router = Router::from_config(&config, gateway).context("Invalid router configuration")?;
    for profile in router.registry().profiles() {
        tracing::info!(
            category = %profile.category,
            tool = %profile.tool_name,
            model = %profile.model_id,
            "backend registered"
        );
    }

    tracing::info!("Starting routing MCP server");
    let server = RouterServer::new(Arc::new(router));
    let service = server.serve((stdin(), stdout())).await?;
    service.waiting().await?;

    Ok(())
}
