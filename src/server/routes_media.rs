//! Media item route handlers: upload, list, fetch, delete.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use vidsentry_core::{Error, MediaItemId};
use vidsentry_db::models::MediaItem;
use vidsentry_db::queries::media_items;

use crate::error::AppError;
use crate::ingest::{self, UploadMeta};
use crate::middleware::owner::Owner;
use crate::server::AppContext;

/// Multipart field names accepted for the uploaded file.
const FILE_FIELDS: [&str; 2] = ["file", "video"];

const MAX_PAGE_SIZE: i64 = 200;

pub fn media_routes() -> Router<AppContext> {
    Router::new()
        .route("/media", get(list_media).post(upload_media))
        .route("/media/{id}", get(get_media).delete(delete_media))
}

/// Query parameters for listing media items.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMediaParams {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Multipart upload body.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The media file (the field may also be named `video`).
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Media item as exposed over the API. The storage path is never included.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MediaItemResponse {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// One of `queued`, `processing`, `safe`, `flagged`, `failed`.
    pub status: String,
    pub progress: u8,
    pub confidence: Option<f64>,
    pub duration_seconds: Option<f64>,
    /// `error`, `cancelled` or `interrupted` when `status` is `failed`.
    pub failure_reason: Option<String>,
    pub error: Option<String>,
    pub stream_url: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl MediaItemResponse {
    pub fn from_model(item: &MediaItem) -> Self {
        Self {
            id: item.id.to_string(),
            owner_id: item.owner_id.to_string(),
            original_name: item.original_name.clone(),
            file_name: item.file_name.clone(),
            mime_type: item.mime_type.clone(),
            size_bytes: item.size_bytes,
            status: item.status.to_string(),
            progress: item.progress,
            confidence: item.confidence,
            duration_seconds: item.duration_seconds,
            failure_reason: item.failure_reason.map(|r| r.to_string()),
            error: item.error.clone(),
            stream_url: format!("/api/media/{}/stream", item.id),
            created_at: item.created_at.clone(),
            started_at: item.started_at.clone(),
            completed_at: item.completed_at.clone(),
        }
    }
}

pub(crate) fn parse_item_id(raw: &str) -> Result<MediaItemId, AppError> {
    raw.parse()
        .map_err(|_| Error::Validation("Invalid media item ID".into()).into())
}

/// POST /api/media
#[utoipa::path(
    post,
    path = "/api/media",
    tag = "media",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Upload accepted and queued", body = MediaItemResponse),
        (status = 400, description = "Missing, empty, oversized or disallowed file"),
        (status = 401, description = "No caller identity")
    )
)]
pub async fn upload_media(
    State(ctx): State<AppContext>,
    Owner(owner): Owner,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Failed to read multipart body: {e}")))?
    {
        let is_file = field
            .name()
            .is_some_and(|name| FILE_FIELDS.contains(&name));
        if !is_file {
            continue;
        }

        let meta = UploadMeta {
            file_name: field.file_name().map(String::from),
            content_type: field.content_type().map(String::from),
        };
        let item = ingest::submit(&ctx, &owner, meta, field).await?;
        return Ok((StatusCode::CREATED, Json(MediaItemResponse::from_model(&item))));
    }

    Err(Error::Validation("No file provided; send a multipart field named 'file'".into()).into())
}

/// GET /api/media
#[utoipa::path(
    get,
    path = "/api/media",
    tag = "media",
    params(ListMediaParams),
    responses(
        (status = 200, description = "Caller's media items, newest first", body = Vec<MediaItemResponse>),
        (status = 401, description = "No caller identity")
    )
)]
pub async fn list_media(
    State(ctx): State<AppContext>,
    Owner(owner): Owner,
    Query(params): Query<ListMediaParams>,
) -> Result<Json<Vec<MediaItemResponse>>, AppError> {
    let conn = vidsentry_db::pool::get_conn(&ctx.db)?;
    let items = media_items::list_for_owner(
        &conn,
        &owner,
        params.offset.max(0),
        params.limit.clamp(1, MAX_PAGE_SIZE),
    )?;
    Ok(Json(items.iter().map(MediaItemResponse::from_model).collect()))
}

/// GET /api/media/{id}
#[utoipa::path(
    get,
    path = "/api/media/{id}",
    tag = "media",
    params(("id" = String, Path, description = "Media item ID")),
    responses(
        (status = 200, description = "Media item", body = MediaItemResponse),
        (status = 404, description = "Not found or not owned by the caller")
    )
)]
pub async fn get_media(
    State(ctx): State<AppContext>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<MediaItemResponse>, AppError> {
    let item_id = parse_item_id(&id)?;
    let conn = vidsentry_db::pool::get_conn(&ctx.db)?;
    let item = media_items::get_owned_media_item(&conn, item_id, &owner)?
        .ok_or_else(|| Error::not_found("media item", item_id))?;
    Ok(Json(MediaItemResponse::from_model(&item)))
}

/// DELETE /api/media/{id}
#[utoipa::path(
    delete,
    path = "/api/media/{id}",
    tag = "media",
    params(("id" = String, Path, description = "Media item ID")),
    responses(
        (status = 204, description = "Item, content and any active run removed"),
        (status = 404, description = "Not found or not owned by the caller")
    )
)]
pub async fn delete_media(
    State(ctx): State<AppContext>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let item_id = parse_item_id(&id)?;
    let removed = {
        let conn = vidsentry_db::pool::get_conn(&ctx.db)?;
        media_items::delete_owned_media_item(&conn, item_id, &owner)?
    };
    let item = removed.ok_or_else(|| Error::not_found("media item", item_id))?;

    ctx.pipeline.cancel(item.id);

    let path = std::path::Path::new(&item.file_path);
    match ctx.content.remove(path).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(item_id = %item.id, "Content already missing at delete"),
        Err(e) => tracing::warn!(item_id = %item.id, "Failed to remove content: {e}"),
    }

    tracing::info!(item_id = %item.id, owner = %owner, "Media item deleted");
    Ok(StatusCode::NO_CONTENT)
}
