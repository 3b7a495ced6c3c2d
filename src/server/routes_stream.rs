//! Range-aware content delivery for media items.

use crate::error::AppError;
use crate::server::routes_media::parse_item_id;
use crate::server::AppContext;
use crate::streaming::{self, Delivery};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    routing::get,
    Router,
};
use vidsentry_core::{Error, MediaStatus};
use vidsentry_db::queries::media_items;

pub fn stream_routes() -> Router<AppContext> {
    Router::new().route("/media/{id}/stream", get(stream_media))
}

/// GET /api/media/{id}/stream
///
/// Not owner-scoped: the item id acts as the capability, so players can be
/// handed a plain URL.
#[utoipa::path(
    get,
    path = "/api/media/{id}/stream",
    tag = "media",
    params(
        ("id" = String, Path, description = "Media item ID"),
        ("Range" = Option<String>, Header, description = "Single byte range, e.g. bytes=0-1023")
    ),
    responses(
        (status = 200, description = "Full content"),
        (status = 206, description = "Requested byte range"),
        (status = 400, description = "Invalid media item ID"),
        (status = 403, description = "Item was flagged by moderation"),
        (status = 404, description = "Item or its content not found"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn stream_media(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Delivery, AppError> {
    let item_id = parse_item_id(&id)?;
    let item = {
        let conn = vidsentry_db::pool::get_conn(&ctx.db)?;
        media_items::get_media_item(&conn, item_id)?
    }
    .ok_or_else(|| Error::not_found("media item", item_id))?;

    if item.status == MediaStatus::Flagged && !ctx.config.delivery.serve_flagged {
        return Err(Error::Forbidden("media item was flagged by moderation".into()).into());
    }

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let delivery = streaming::open(&item, range).await?;

    tracing::debug!(
        item_id = %item.id,
        range = ?delivery.range,
        total = delivery.total,
        "Serving media content"
    );
    Ok(delivery)
}
