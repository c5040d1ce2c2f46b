//! Casefile Server - Main entry point

use anyhow::{Context, Result};
use casefile_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use casefile_server::{
    config::Config,
    create_router, db,
    ingest::{Pipeline, PipelineBackend, PipelineBackends},
    storage::{FsObjectStore, ObjectStore, ObjectStoreKind, Storage, StorageConfig},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("casefile-server")
        .filter_directives("casefile_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting casefile server");

    let config = Config::load()?;
    info!(
        bind = %config.bind_address(),
        backend = ?config.pipeline.backend,
        object_store = ?config.storage.kind,
        "Configuration loaded"
    );

    let objects = object_store(&config.storage).await?;
    info!("Object store initialized");

    let backends = match config.pipeline.backend {
        PipelineBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            PipelineBackends::postgres(pool, objects)
        },
        PipelineBackend::Memory => PipelineBackends::in_memory(objects),
    };

    let pipeline = Arc::new(Pipeline::new(config.pipeline.clone(), backends)?);

    let shutdown = CancellationToken::new();
    let workers = if config.pipeline.workers_enabled {
        let handles = pipeline.worker_pool(shutdown.clone()).spawn();
        info!(workers = handles.len(), "Pipeline workers started");
        handles
    } else {
        info!("Pipeline workers disabled (PIPELINE_WORKERS_ENABLED=false)");
        Vec::new()
    };

    let app = create_router(Arc::clone(&pipeline), &config);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // workers finish their current stage or give it back to the queue
    shutdown.cancel();
    let drain = Duration::from_secs(config.server.shutdown_timeout_secs);
    if tokio::time::timeout(drain, futures::future::join_all(workers))
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Workers did not stop in time; their leases will expire and be redelivered"
        );
    }

    info!("Server shut down gracefully");

    Ok(())
}

async fn object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config.kind {
        ObjectStoreKind::S3 => Arc::new(Storage::new(config).await?),
        ObjectStoreKind::Fs => Arc::new(FsObjectStore::new(config.root.clone())),
    })
}

/// Resolves on Ctrl+C or SIGTERM, or when something else cancels `token`
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
        _ = token.cancelled() => info!("Shutdown requested"),
    }

    token.cancel();
}
