//! Cognify API Gateway
//!
//! HTTP surface for accounts, courses, document uploads and the study
//! assistant. Handles:
//! - Session authentication
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, request ids)

pub mod handlers;
pub mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use cognify_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    errors::Result,
    generation::create_generator,
    storage::create_blob_store,
    vector::create_vector_index,
    worker::create_worker_trigger,
    BlobStore, RagPipeline, WorkerTrigger,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub jwt: Arc<JwtManager>,
    pub blobs: Arc<dyn BlobStore>,
    pub worker: Arc<dyn WorkerTrigger>,
    pub rag: Arc<RagPipeline>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl AppState {
    /// Wire up every collaborator from configuration
    pub async fn from_config(config: AppConfig, db: DbPool) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let index = create_vector_index(
            &config.vector_index,
            &config.database.url,
            embedder.dimension(),
        )
        .await?;
        let generator = create_generator(&config.generation)?;

        info!(
            embedding_model = embedder.model_name(),
            vector_index = index.provider(),
            generation_model = generator.model_name(),
            "Collaborators initialized"
        );

        let rag = RagPipeline::new(embedder, index, generator, config.rag.top_k);

        Ok(Self {
            jwt: Arc::new(JwtManager::new(
                &config.auth.jwt_secret,
                config.auth.jwt_expiration_secs,
            )),
            repo: Repository::new(db),
            blobs: create_blob_store(&config.blob)?,
            worker: create_worker_trigger(&config.worker)?,
            rag: Arc::new(rag),
            config: Arc::new(config),
        })
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let upload_limit = state.config.upload.max_bytes;
    let request_timeout = state.config.request_timeout();

    // API routes
    let api_routes = Router::new()
        // Accounts
        .route("/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/session", get(handlers::auth::session))
        // Courses
        .route(
            "/courses",
            get(handlers::courses::list_courses).post(handlers::courses::create_course),
        )
        .route("/courses/{id}", get(handlers::courses::get_course))
        // Documents
        .route(
            "/upload",
            post(handlers::upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Study assistant
        .route("/chat", post(handlers::chat::chat));

    let mut app = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes);

    if state.config.blob.provider == "fs" {
        app = app.nest_service("/files", ServeDir::new(&state.config.blob.local_dir));
    }

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::RateLimitState::new(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        app = app.layer(from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Compose the app
    app.layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}
