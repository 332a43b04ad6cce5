use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alertflow::{config::Config, pipeline::Pipeline, server::Server, store::create_store};

#[derive(Parser, Debug)]
#[command(author, version, about = "Alert ingestion, correlation and notification service")]
struct Args {
    /// Address to listen on, overrides SERVER_ADDR
    #[arg(short, long)]
    addr: Option<String>,

    /// SQLite database file, overrides SQLITE_PATH
    #[arg(long)]
    sqlite_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(path) = args.sqlite_path {
        config.database.sqlite_path = path;
    }
    info!("Loaded configuration: {:?}", config);

    let store = create_store(&config.database)
        .await
        .context("failed to open database")?;
    store.init().await.context("failed to run migrations")?;

    let pipeline = Pipeline::build(&config, store)?;
    let app = Server::new(&pipeline).build_router();

    let listener = TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.addr))?;
    info!("Listening on {}", config.server.addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown().await;
    Ok(())
}
