use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use meshvault_core::job_status::JobStatus;
use meshvault_db::{JobStore, MemoryJobStore, PgJobStore};
use meshvault_pipeline::{DriverSelector, PipelineConfig};
use meshvault_storage::{build_blob_store, StorageBackend, StorageConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshvault_api::config::ServerConfig;
use meshvault_api::router::build_app_router;
use meshvault_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // LOG_FORMAT=json switches to one JSON object per line.
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "meshvault_api=debug,meshvault_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    let storage_config = StorageConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    let store: Arc<dyn JobStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) if !database_url.trim().is_empty() => {
            let pool = meshvault_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            meshvault_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            meshvault_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgJobStore::new(pool))
        }
        _ => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory and lost on restart");
            Arc::new(MemoryJobStore::new())
        }
    };

    // Runs are not resumed across restarts.
    match store.count_by_status(JobStatus::Processing).await {
        Ok(0) => {}
        Ok(count) => tracing::warn!(count, "Jobs left in processing by a previous run will not be resumed"),
        Err(e) => tracing::warn!(error = %e, "Failed to count stale processing jobs"),
    }

    // --- Blob storage ---
    let blobs = build_blob_store(&storage_config)
        .await
        .expect("Failed to initialise blob storage");
    tracing::info!(backend = ?storage_config.backend, "Blob storage ready");

    // --- Processing driver ---
    let driver = DriverSelector::detect(&pipeline_config);
    tracing::info!(mode = driver.mode().as_str(), "Processing driver selected");

    let files_root = matches!(storage_config.backend, StorageBackend::Local)
        .then(|| storage_config.root.clone());

    // --- App state + router ---
    let state = AppState::new(store, blobs, driver, config.clone(), pipeline_config);
    let app = build_app_router(state, &config, files_root);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Open job streams keep the graceful drain from finishing, so it is
    // bounded by SHUTDOWN_TIMEOUT_SECS once a signal arrives.
    let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let drain_deadline = async move {
        let _ = signalled_rx.wait_for(|signalled| *signalled).await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => result.expect("Server error"),
        () = drain_deadline => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Connections still open after shutdown timeout, exiting",
            );
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
