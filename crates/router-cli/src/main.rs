mod output;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use routing::{Attachment, ChatCompletionsGateway, ProtocolGateway, Query, Router, RouterConfig};
use tracing::{info, warn};

/// Route questions to the model best suited for them.
#[derive(Parser, Debug)]
#[command(name = "ai-router", author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (environment variables still take precedence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ask a single question and exit instead of starting the shell
    #[arg(long)]
    query: Option<String>,

    /// Attach an image URL to --query (repeatable)
    #[arg(long = "image", value_name = "URL")]
    images: Vec<String>,

    /// Print responses as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// List the backend tools and exit
    #[arg(long, default_value_t = false)]
    list_tools: bool,

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
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RouterConfig::load(args.config.as_deref())?;
    let gateway = Arc::new(
        ChatCompletionsGateway::new(&config.api).context("Failed to create HTTP client")?,
    );

    if args.list_tools {
        let tools = gateway.list_tools().await?;
        println!("{}", output::render_tools(&tools));
        return Ok(());
    }

    if !args.skip_health_check {
        if gateway.check_endpoint().await {
            info!(base_url = %gateway.base_url(), "Backend endpoint reachable");
        } else {
            warn!(
                base_url = %gateway.base_url(),
                "Backend endpoint not reachable; requests may fail"
            );
        }
    }

    let router = Router::from_config(&config, gateway).context("Invalid router configuration")?;

    match args.query {
        Some(text) => {
            let query = one_shot_query(&text, &args.images);
            let response = repl::route_interruptible(&router, &query).await;
            if args.json {
                println!("{}", output::render_json(&response));
            } else {
                println!("{}", output::render_response(&response));
            }
            if !response.is_ok() {
                std::process::exit(1);
            }
        }
        None => repl::run(&router, args.json).await?,
    }

    Ok(())
}

fn one_shot_query(text: &str, images: &[String]) -> Query {
    images
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .fold(Query::parse(text), |query, url| {
            query.with_attachment(Attachment::image(url))
        })
}
