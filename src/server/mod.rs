//! HTTP server
//!
//! The axum surface over the adapter, compositor, and media store. Route
//! handlers live in [`routes`]; this module owns the shared application
//! context, the router assembly, and the error-to-response translation.

pub mod routes;

use crate::config::ServiceConfig;
use crate::engine::Remover;
use crate::error::{CutoutError, Result};
use crate::storage::MediaStore;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub remover: Arc<Remover>,
    pub store: Arc<MediaStore>,
    pub config: Arc<ServiceConfig>,
}

impl AppContext {
    /// Build the context from a validated configuration, creating the
    /// media directories up front
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let store = MediaStore::new(&config.media_root);
        store.ensure_dirs()?;
        let remover = Remover::new(&config.withoutbg_model, &config.rembg_model);
        Ok(Self {
            remover: Arc::new(remover),
            store: Arc::new(store),
            config: Arc::new(config),
        })
    }

    /// Build a context around pre-constructed components (test seam)
    #[must_use]
    pub fn with_components(remover: Remover, store: MediaStore, config: ServiceConfig) -> Self {
        Self {
            remover: Arc::new(remover),
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}

/// Create the axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/upload/", post(routes::upload_image))
        .route("/api/composite/", post(routes::composite_image))
        .route("/api/batch-zip/", post(routes::download_batch_zip))
        .route("/api/download/:filename/", get(routes::download_result))
        // Results and uploads are addressable under /media so the URLs in
        // JSON responses resolve.
        .nest_service("/media", ServeDir::new(&ctx.config.media_root))
        .layer(DefaultBodyLimit::max(ctx.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and serve until the process is stopped
pub async fn start_server(config: ServiceConfig) -> Result<()> {
    config.validate()?;
    let bind_addr = config.bind_addr;
    let ctx = AppContext::new(config)?;
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| CutoutError::Io(std::io::Error::new(e.kind(), format!("bind {bind_addr}: {e}"))))?;
    tracing::info!("Listening on http://{bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Translate service errors into JSON error responses
///
/// The adapter and compositor return plain `Result` values; this is the
/// single place that maps the error taxonomy onto HTTP status codes.
impl IntoResponse for CutoutError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) | Self::UnknownEngine(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::Image(_) | Self::Model(_) | Self::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
