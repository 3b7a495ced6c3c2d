use crate::middleware::owner::owner_header;
use crate::middleware::request_id::{request_id_middleware, X_REQUEST_ID};
use crate::pipeline::{AnalysisStage, Classifier, MockClassifier, Pipeline, TimedAnalysis};
use crate::storage::ContentStore;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, Method},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use vidsentry_core::config::Config;
use vidsentry_core::events::EventBus;
use vidsentry_db::pool::DbPool;

pub mod openapi;
pub mod routes_media;
pub mod routes_sse;
pub mod routes_stream;

/// Headroom above `upload.max_size_bytes` for multipart framing, so an
/// oversized file is rejected by the content store with a clear message
/// rather than by the transport limit.
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

/// How long in-flight pipeline runs get to stop after the server exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    /// Item store
    pub db: DbPool,
    /// Immutable configuration snapshot
    pub config: Arc<Config>,
    /// Broadcast bus feeding the SSE endpoint
    pub event_bus: Arc<EventBus>,
    /// Uploaded content on disk
    pub content: Arc<ContentStore>,
    /// Active run registry and scheduler
    pub pipeline: Arc<Pipeline>,
}

impl AppContext {
    /// Wire up the event bus, content store and pipeline around `db`.
    pub fn build(
        config: Config,
        db: DbPool,
        classifier: Arc<dyn Classifier>,
        analysis: Arc<dyn AnalysisStage>,
    ) -> vidsentry_core::Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.events.subscriber_buffer));
        let content = Arc::new(ContentStore::new(&config.upload.storage_dir)?);
        let pipeline = Pipeline::new(db.clone(), event_bus.clone(), classifier, analysis);

        Ok(Self {
            db,
            config: Arc::new(config),
            event_bus,
            content,
            pipeline,
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::RANGE,
            owner_header(&ctx.config.auth),
            X_REQUEST_ID.clone(),
        ])
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
            X_REQUEST_ID.clone(),
        ]);

    let body_limit = ctx
        .config
        .upload
        .max_size_bytes
        .saturating_add(BODY_LIMIT_SLACK);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .nest("/api", openapi::openapi_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes() -> Router<AppContext> {
    routes_media::media_routes()
        .merge(routes_stream::stream_routes())
        .merge(routes_sse::sse_routes())
}

/// Liveness and a snapshot of pipeline activity.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Pipeline runs currently in flight
    pub active_runs: usize,
    /// Connected event stream subscribers
    pub subscribers: usize,
    /// Events dropped for lagging subscribers since startup
    pub dropped_events: u64,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_runs: ctx.pipeline.active_count(),
        subscribers: ctx.event_bus.subscriber_count(),
        dropped_events: ctx.event_bus.dropped_events(),
    })
}

/// Open the store, recover pipeline state and serve until a shutdown signal.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let db = vidsentry_db::pool::init_pool(&config.server.db_path)
        .with_context(|| format!("Failed to open database at {:?}", config.server.db_path))?;

    let classifier: Arc<dyn Classifier> =
        Arc::new(MockClassifier::new(config.pipeline.flag_probability));
    let analysis: Arc<dyn AnalysisStage> = Arc::new(TimedAnalysis::from_config(&config.pipeline));
    let ctx = AppContext::build(config, db, classifier, analysis)
        .context("Failed to initialize application context")?;

    ctx.pipeline
        .recover()
        .context("Failed to recover pipeline state")?;

    let pipeline = ctx.pipeline.clone();
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipeline.shutdown(SHUTDOWN_GRACE).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
