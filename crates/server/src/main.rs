use anyhow::{Context, Result};
use clap::Parser;
use ethcache_core::{
    cleanup::CleanupManager,
    config::AppConfig,
    metrics::{self, MetricsCollector},
    proxy::RpcProxy,
    store::{CacheStore, PgCacheStore},
};
use server::router::AppState;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long in-flight requests may drain after a shutdown signal.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "ethcache", about = "Caching Ethereum JSON-RPC proxy", version)]
struct Cli {
    /// Path to the YAML configuration file. Configuration may also come
    /// entirely from ETHCACHE_* environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ethcache_core=info,ethcache=info,server=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let max_cache_size = config.max_cache_size().context("invalid max_cache_size_bytes")?;

    let pg_store = Arc::new(
        PgCacheStore::connect(&config.database_dsn)
            .await
            .context("failed to connect to database")?,
    );
    let store: Arc<dyn CacheStore> = pg_store.clone();
    let collector = Arc::new(MetricsCollector::new());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let cleanup_manager = (max_cache_size > 0).then(|| {
        CleanupManager::new(Arc::clone(&store), max_cache_size, config.cleanup_slack_ratio)
    });

    let mut proxy = RpcProxy::new(&config.upstream_url, Arc::clone(&store), collector.clone())
        .with_rate_limit(config.rate_limit);
    if let Some(manager) = &cleanup_manager {
        proxy = proxy.with_cleanup_notifier(manager.notifier());
        manager.start();
    }

    let sampler = tokio::spawn(metrics::run_sampler(
        Arc::clone(&store),
        collector.clone(),
        metrics::SAMPLE_INTERVAL,
        shutdown_tx.subscribe(),
    ));

    let app = server::create_app(
        AppState { proxy: Arc::new(proxy), metrics: collector },
        &config.auth_token,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        address = %addr,
        upstream_url = %config.upstream_url,
        max_cache_size_bytes = max_cache_size,
        rate_limit = config.rate_limit,
        auth_enabled = !config.auth_token.is_empty(),
        "ethcache listening"
    );

    let mut graceful_rx = shutdown_tx.subscribe();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = graceful_rx.recv().await;
            })
            .await
    });

    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received, draining in-flight requests");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(SHUTDOWN_DEADLINE, &mut server_task).await {
                Ok(Ok(Ok(()))) => info!("server drained"),
                Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
                Ok(Err(e)) => error!(error = %e, "server task panicked"),
                Err(_) => {
                    warn!(deadline_secs = SHUTDOWN_DEADLINE.as_secs(), "drain deadline exceeded, aborting");
                    server_task.abort();
                }
            }
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => info!("server stopped"),
                Ok(Err(e)) => error!(error = %e, "server error"),
                Err(e) => error!(error = %e, "server task panicked"),
            }
            let _ = shutdown_tx.send(());
        }
    }

    if let Some(manager) = &cleanup_manager {
        manager.stop().await;
    }
    let _ = sampler.await;
    pg_store.close().await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
