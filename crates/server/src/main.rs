use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use archivist_core::config::LoggingConfig;
use archivist_core::{
    create_audit_system, load_config, validate_config, ArchiveClient, AuditEvent, AuditStore,
    CommandToolkit, DirectoryArchiveClient, Dispatcher, JobQueue, PreservationToolkit,
    SqliteAuditStore, SqliteJobQueue, SqliteWorkflowStore, WorkerPool, WorkerSettings, Workflow,
    WorkflowSettings, WorkflowStore,
};
use archivist_server::api::create_router;
use archivist_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialised yet
        eprintln!("Fatal error: {:#}", e);
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("ARCHIVIST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config.logging);
    info!("Configuration loaded from {:?}", config_path);

    let db_path = config
        .database
        .resolved_path()
        .ok_or_else(|| anyhow!("No usable database location configured"))?;
    info!("Database path: {:?}", db_path);
    info!("Package directory: {:?}", config.package.package_dir);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&db_path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create SQLite workflow store
    let store: Arc<dyn WorkflowStore> = Arc::new(
        SqliteWorkflowStore::new(&db_path).context("Failed to create workflow store")?,
    );
    info!("Workflow store initialized");

    // Create SQLite job queue
    let queue: Arc<dyn JobQueue> =
        Arc::new(SqliteJobQueue::new(&db_path).context("Failed to create job queue")?);
    info!("Job queue initialized");

    tokio::fs::create_dir_all(&config.package.package_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create package directory {:?}",
                config.package.package_dir
            )
        })?;

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    // External collaborators
    let toolkit: Arc<dyn PreservationToolkit> =
        Arc::new(CommandToolkit::new(config.toolkit.clone()));
    info!("Using toolkit: {} ({})", toolkit.name(), config.toolkit.command);
    let archive: Arc<dyn ArchiveClient> =
        Arc::new(DirectoryArchiveClient::new(config.archive.processed_dir.clone()));
    info!(
        "Using archive client: {} ({:?})",
        archive.name(),
        config.archive.processed_dir
    );

    let workflow = Arc::new(
        Workflow::new(
            store,
            Dispatcher::new(queue),
            toolkit,
            archive,
            WorkflowSettings::from(&config),
        )
        .with_audit(audit_handle.clone()),
    );

    // Create worker pool if enabled
    let workers = if config.workers.enabled {
        let pool = WorkerPool::new(
            WorkerSettings::from(&config),
            Arc::clone(&workflow),
            Some(audit_handle.clone()),
        );
        pool.start()
            .await
            .context("Failed to start worker pool")?;
        info!("Worker pool started");
        Some(Arc::new(pool))
    } else {
        info!("Workers disabled in config");
        None
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&workflow),
        audit_handle.clone(),
        audit_store,
        workers.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop workers if running
    if let Some(ref pool) = workers {
        info!("Stopping worker pool...");
        pool.stop().await;
        info!("Worker pool stopped");
    }

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone. The workflow and
    // the pool hold clones; the router state was dropped by `serve`.
    drop(workers);
    drop(workflow);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
