use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_core::{
    create_analyzer, create_authenticator, load_config, validate_config, Authenticator, Config,
    EventBus, LiveUpdateGateway, SqliteJobStore, SqliteTicketStore, TicketService, TicketStore,
    TriageQueue, TriageWorkerPool,
};
use triage_server::api::create_router;
use triage_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging is not initialized yet if the config failed to load.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("TRIAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!(version = VERSION, "Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Ticket and job tables share one SQLite file
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    let job_store = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    let queue = Arc::new(TriageQueue::new(job_store, &config.queue));
    info!("Ticket store and job queue initialized");

    // Event bus and live update gateway
    let bus = Arc::new(EventBus::new(config.events.channel_capacity));
    let gateway = Arc::new(LiveUpdateGateway::new(
        Arc::clone(&bus),
        config.events.subscriber_buffer,
    ));

    // AI analyzer
    let analyzer = create_analyzer(&config.ai).context("Failed to create analyzer")?;
    info!(
        provider = analyzer.provider(),
        "AI analyzer initialized"
    );

    let service = Arc::new(TicketService::new(
        Arc::clone(&ticket_store),
        Arc::clone(&queue),
        Arc::clone(&bus),
    ));

    // Triage worker pool
    let worker_pool = if config.worker.enabled {
        let pool = Arc::new(TriageWorkerPool::new(
            config.worker.clone(),
            Arc::clone(&ticket_store),
            Arc::clone(&queue),
            analyzer,
            Arc::clone(&bus),
        ));
        pool.start().await;
        info!(
            concurrency = config.worker.concurrency,
            "Triage worker pool started"
        );
        Some(pool)
    } else {
        warn!("Triage worker disabled; submitted tickets will wait in the queue");
        None
    };

    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = Arc::new(AppState::new(
        config,
        authenticator,
        service,
        queue,
        Arc::clone(&gateway),
        worker_pool.clone(),
    ));

    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&gateway)))
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    if let Some(pool) = worker_pool {
        info!("Stopping triage worker pool...");
        pool.stop().await;
        info!("Triage worker pool stopped");
    }

    gateway.shutdown();
    bus.close();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
///
/// Live sessions are closed as soon as the signal arrives; otherwise open
/// WebSocket connections would hold the graceful shutdown forever.
async fn shutdown_signal(gateway: Arc<LiveUpdateGateway>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    gateway.shutdown();
}
