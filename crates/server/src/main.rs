use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webimport_core::{
    create_event_system, load_config, validate_config, EventStore, FsPlacer, ImportEvent,
    ImportServices, Library, MusicBrainzLookup, SessionManager, SessionOptions, SqliteEventStore,
    SqliteLibrary,
};
use webimport_server::api::create_router;
use webimport_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long to wait for queued events to be written on shutdown
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let json = std::env::var("WEBIMPORT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
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
    init_logging();

    // Determine config path
    let config_path = std::env::var("WEBIMPORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Library database: {:?}", config.library.database);
    info!("Library directory: {:?}", config.library.directory);

    // Event log
    let event_store: Arc<dyn EventStore> = match &config.events.database {
        Some(path) => Arc::new(
            SqliteEventStore::new(path)
                .with_context(|| format!("Failed to open event log {:?}", path))?,
        ),
        None => {
            info!("No event database configured, keeping events in memory");
            Arc::new(SqliteEventStore::in_memory().context("Failed to create event log")?)
        }
    };
    let (events, event_writer) =
        create_event_system(Arc::clone(&event_store), config.events.buffer_size);
    let writer_handle = tokio::spawn(event_writer.run());

    events
        .emit(ImportEvent::ServiceStarted {
            version: VERSION.to_string(),
        })
        .await;

    // Collaborators
    let library: Arc<dyn Library> = Arc::new(
        SqliteLibrary::new(&config.library.database).context("Failed to open library")?,
    );
    info!("Library initialized");

    let lookup = MusicBrainzLookup::new(&config.musicbrainz, config.matching.clone())
        .context("Failed to create MusicBrainz client")?;
    info!("Using MusicBrainz at {}", config.musicbrainz.base_url);

    let services = ImportServices::new(
        Arc::new(lookup),
        Arc::clone(&library),
        Arc::new(FsPlacer::with_defaults()),
    )
    .with_events(events.clone());
    let sessions = SessionManager::new(services, SessionOptions::from_config(&config));

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        sessions,
        library,
        event_store,
    ));

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    events
        .emit(ImportEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer stops once every handle is gone. A session run still in
    // flight keeps one alive, so the wait is bounded.
    drop(events);
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, writer_handle)
        .await
        .is_err()
    {
        warn!("Event writer did not drain before shutdown");
    } else {
        info!("Event writer stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
