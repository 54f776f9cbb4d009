use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fxgate_core::{RateError, ReqwestHttpClient};
use fxgate_web::config::{AppConfig, ConfigError};
use fxgate_web::{app, spawn_housekeeping, AppState};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Exchange rate and currency conversion HTTP service.
#[derive(Debug, Parser)]
#[command(name = "fxgate", version, about)]
struct Cli {
    /// JSON config file. Defaults to `fxgate.json` when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding config and `FXGATE_BIND`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Upstream base URL, overriding config and `FXGATE_UPSTREAM_BASE_URL`.
    #[arg(long)]
    upstream_base_url: Option<String>,

    /// Retries per upstream call, overriding config and `FXGATE_RETRY_COUNT`.
    #[arg(long)]
    retry_count: Option<u32>,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Services(#[from] RateError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl StartupError {
    const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Services(_) => 2,
            Self::Bind { .. } => 3,
            Self::Serve(_) => 4,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = %error, "fxgate stopped");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(base_url) = cli.upstream_base_url {
        config.upstream.base_url = base_url;
    }
    if let Some(retry_count) = cli.retry_count {
        config.resilience.retry_count = retry_count;
    }
    config.validate()?;

    let state = AppState::from_config(&config, Arc::new(ReqwestHttpClient::new()))?;
    if !state.authenticator().is_configured() {
        warn!("no JWT signing key configured; every /rates request will be rejected");
    }
    spawn_housekeeping(
        state.clone(),
        config.cache_purge_interval(),
        config.rate_limit_window(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind,
            source,
        })?;
    info!(
        bind = %config.bind,
        upstream = %config.upstream.base_url,
        services = ?state.registry().valid_ids(),
        "fxgate listening"
    );

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(StartupError::Serve)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
