use anyhow::{Context, Result};
use arena_server::{
    database_url_from_env, Api, Arena, BackendKind, ServerConfig, Telemetry,
    DEFAULT_HTTP_BODY_LIMIT_BYTES, DEFAULT_MAX_CONNECTIONS,
};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Storage backend: memory or postgres.
    #[arg(long, default_value = "memory")]
    backend: String,

    /// Postgres connection string (built from POSTGRES_* env vars when omitted).
    #[arg(long)]
    database_url: Option<String>,

    /// Number of postgres connections to open (must be > 0).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let backend: BackendKind = args
        .backend
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid backend: {err}"))?;
    if let Some(0) = args.max_connections {
        anyhow::bail!("max_connections must be > 0 when set");
    }
    let database_url = match backend {
        BackendKind::Memory => None,
        BackendKind::Postgres => Some(
            args.database_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| database_url_from_env(|name| std::env::var(name).ok())),
        ),
    };
    let http_body_limit_bytes = match args.http_body_limit_bytes {
        Some(0) => None,
        Some(limit) => Some(limit),
        None => Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
    };

    Ok(ServerConfig {
        host: args.host,
        port: args.port,
        backend,
        database_url,
        max_connections: args.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        http_body_limit_bytes,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    Telemetry::from_env(|name| std::env::var(name).ok()).init(args.log_level)?;

    let config = build_config(&args)?;
    let addr = SocketAddr::new(config.host, config.port);
    info!(backend = ?config.backend, "opening arena");

    // Bind listener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // Postgres connects synchronously
    let arena = tokio::task::spawn_blocking(move || Arena::open(config))
        .await
        .context("backend startup task failed")?
        .context("failed to open backend")?;
    let api = Api::new(Arc::new(arena));
    let app = api.router();

    // Start server
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
