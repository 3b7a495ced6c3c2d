//! OpenAPI documentation.
//!
//! The document is served as raw JSON at `/api/openapi.json`.

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use super::AppContext;

/// OpenAPI documentation for vidsentry.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "vidsentry API",
        description = "Media upload, moderation pipeline and range-aware delivery",
    ),
    servers(
        (url = "/", description = "Default server")
    ),
    paths(
        super::health_check,
        super::routes_media::upload_media,
        super::routes_media::list_media,
        super::routes_media::get_media,
        super::routes_media::delete_media,
        super::routes_stream::stream_media,
        super::routes_sse::events_handler,
    ),
    components(
        schemas(
            super::HealthResponse,
            super::routes_media::MediaItemResponse,
            super::routes_media::UploadForm,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "media", description = "Media upload, lookup, deletion and streaming"),
        (name = "events", description = "Live pipeline events"),
    )
)]
pub struct ApiDoc;

/// Routes serving the OpenAPI document.
pub fn openapi_routes() -> Router<AppContext> {
    Router::new().route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}
