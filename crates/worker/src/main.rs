//! Cognify document worker binary

use cognify_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    metrics,
    vector::create_vector_index,
};
use cognify_worker::{
    chunker::Chunker,
    fetch::HttpFetcher,
    routes::{create_router, WorkerState},
    DocumentProcessor,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Cognify document worker v{}", cognify_common::VERSION);

    if config.worker.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.worker.metrics_port));
        PrometheusBuilder::new()
            .set_buckets(metrics::UPSTREAM_BUCKETS)?
            .with_http_listener(metrics_addr)
            .install()?;
        metrics::register_metrics();
        info!("Metrics exporter listening on {}", metrics_addr);
    }

    let db = DbPool::new(&config.database).await?;
    if config.database.auto_migrate {
        db.ensure_schema().await?;
    }

    let embedder = create_embedder(&config.embedding)?;
    let index = create_vector_index(
        &config.vector_index,
        &config.database.url,
        embedder.dimension(),
    )
    .await?;
    info!(
        embedding_model = embedder.model_name(),
        vector_index = index.provider(),
        chunk_size = config.worker.chunk_size,
        chunk_overlap = config.worker.chunk_overlap,
        "Processor initialized"
    );

    let processor = DocumentProcessor::new(
        Repository::new(db),
        Arc::new(HttpFetcher::new(config.worker.download_timeout_secs)?),
        embedder,
        index,
        Chunker::new(config.worker.chunk_size, config.worker.chunk_overlap)?,
    );

    let app = create_router(WorkerState {
        processor: Arc::new(processor),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.worker.port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
