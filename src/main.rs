use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley::build_info;
use parley::config::Config;
use parley::limiter::RateLimiter;
use parley::llm::ProviderRegistry;
use parley::orchestrator::Orchestrator;
use parley::server::{self, AppState};
use parley::session::{FileBackend, SessionStore};

/// Parley - A minimal and fast conversation orchestrator for hosted LLM chat backends
#[derive(Parser, Debug)]
#[command(version = build_info::VERSION, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parley.yaml")]
    config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config).await?;

    // CLI port overrides config
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = ProviderRegistry::from_env();
    let client = registry
        .create(&config.llm.provider, config.llm.base_url.as_deref())
        .with_context(|| format!("building '{}' client", config.llm.provider))?;

    let sessions = match &config.sessions.persist_dir {
        Some(dir) => SessionStore::with_backend(Arc::new(FileBackend::new(dir))),
        None => SessionStore::new(),
    };
    sessions.clone().spawn_sweep_task(
        Duration::from_secs(config.sessions.sweep_interval_seconds.max(1)),
        chrono::Duration::seconds(config.sessions.idle_timeout_seconds as i64),
    );

    let limiter = RateLimiter::new(config.orchestrator.rate.to_limiter_config());
    let retry = config.orchestrator.retry.to_policy();
    let settings = config.orchestrator.to_settings(&config.llm);

    let orchestrator = Orchestrator::new(sessions, client, limiter, retry, settings);
    let app = server::build_app(
        AppState { orchestrator },
        config.server.request_timeout_seconds,
    );

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        %addr,
        provider = %config.llm.provider,
        model = %config.llm.model,
        "Starting server"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
