mod auth;
mod classify;
mod comment;
mod config;
mod dispatch;
mod error;
mod github;
mod server;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// ESPHome PR bot: receives GitHub webhooks and notification mails for pull
/// requests and keeps a single comment on each explaining how to try the changes.
#[derive(Parser, Debug)]
#[command(name = "esphome-pr-bot", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to .pr-bot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding config and BIND_ADDRESS
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    let missing = config.missing_secrets();
    if !missing.is_empty() {
        warn!(missing = ?missing, "secrets not configured; dependent endpoints will fail");
    }

    let connector = github::HttpConnector::new(&config.github.api_url)?;
    let bind = config.server.bind.clone();
    let dispatcher = Arc::new(dispatch::Dispatcher::new(config, Arc::new(connector)));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, server::router(dispatcher)).await?;

    Ok(())
}
