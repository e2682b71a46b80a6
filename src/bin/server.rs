#![forbid(unsafe_code)]

//! HTTP server: `POST /download/` fetches a video, `GET /videos/{file}`
//! streams it back until the janitor removes it.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tubedrop::{
    api::{AppState, router},
    clock::SystemClock,
    config::{RuntimeConfig, RuntimeOverrides, resolve_runtime_config},
    fetcher::YtDlpFetcher,
    janitor::Janitor,
    registry::ExpiryRegistry,
    resolver::Resolver,
    search::YtDlpSearch,
    security::ensure_not_root,
    service::VideoService,
    telemetry::{DEFAULT_LOG_LEVEL, init_logging},
    ytdlp::YtDlp,
};

#[derive(Debug, Parser)]
#[command(name = "tubedrop", version, about = "Download videos on demand and serve them for a day")]
struct ServerArgs {
    /// Directory downloaded videos are written to and served from.
    #[arg(long)]
    storage_dir: Option<PathBuf>,
    /// Prefix of the links returned by `POST /download/`.
    #[arg(long)]
    public_base_url: Option<String>,
    #[arg(long, value_parser = parse_host_arg)]
    host: Option<IpAddr>,
    #[arg(long)]
    port: Option<u16>,
    /// Alternate `.env` file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl ServerArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            storage_dir: self.storage_dir,
            public_base_url: self.public_base_url,
            host: self.host.map(|host| host.to_string()),
            port: self.port,
            env_path: self.env_file,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TUBEDROP_HOST")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_logging(DEFAULT_LOG_LEVEL)?;
    ensure_not_root("tubedrop")?;

    let config = resolve_runtime_config(args.into_overrides())?;
    run(config).await
}

async fn run(config: RuntimeConfig) -> Result<()> {
    let host = parse_host_arg(&config.host)?;
    std::fs::create_dir_all(&config.storage_dir)
        .with_context(|| format!("creating {}", config.storage_dir.display()))?;

    let ttl = chrono::Duration::from_std(config.expiry).context("expiry out of range")?;
    let registry = Arc::new(ExpiryRegistry::new(
        &config.storage_dir,
        ttl,
        Arc::new(SystemClock),
    ));
    let ytdlp = YtDlp::new(&config.ytdlp_bin);
    let service = Arc::new(VideoService::new(
        Resolver::new(Arc::new(YtDlpSearch::new(ytdlp.clone()))),
        Arc::new(YtDlpFetcher::new(ytdlp, &config.storage_dir)),
        registry.clone(),
        &config.public_base_url,
    ));

    let janitor = Janitor::spawn(registry, config.sweep_interval);
    let app = router(AppState::new(service, &config.storage_dir));

    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(
        %addr,
        storage_dir = %config.storage_dir.display(),
        public_base_url = %config.public_base_url,
        "API server listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server");

    janitor.shutdown().await;
    info!("server stopped");
    served
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still terminates the
    // process if the handler cannot be installed.
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
