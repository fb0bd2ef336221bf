use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resume_keeper::config::Config;
use resume_keeper::integrity::DocumentSchema;
use resume_keeper::resilience::{Clock, ConnectivityMonitor, HttpProbe, SystemClock};
use resume_keeper::routes::build_router;
use resume_keeper::state::AppState;
use resume_keeper::storage::{FileStore, KeyValueStore, MemoryStore, PersistenceGateway};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("resume_keeper={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Keeper v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .await
                .with_context(|| format!("Failed to open data directory {}", dir.display()))?;
            info!("File store at {}", store.root().display());
            Arc::new(store)
        }
        None => {
            warn!("KEEPER_DATA_DIR not set; documents are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = PersistenceGateway::with_schema(
        store,
        Arc::clone(&clock),
        Arc::new(DocumentSchema::resume()),
        config.backup_capacity,
    )
    .with_write_policy(config.retry_policy());
    info!(
        "Persistence gateway ready (backup capacity {})",
        gateway.backups().capacity()
    );

    let probe = HttpProbe::new(
        reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .context("Failed to build HTTP client")?,
    );
    let monitor = Arc::new(ConnectivityMonitor::new(true, Arc::new(probe), clock));
    if let Some(url) = &config.probe_url {
        let reachable = monitor.test_connectivity(url, config.probe_timeout()).await;
        monitor.set_online(reachable);
        info!("Startup connectivity probe to {url}: reachable={reachable}");
    }

    let state = AppState {
        gateway: Arc::new(gateway),
        monitor,
        config: config.clone(),
    };

    // Local companion only; browsers on other origins still need CORS.
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .context("BIND_ADDR and PORT must form a valid socket address")?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
