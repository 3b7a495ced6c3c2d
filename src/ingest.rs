//! Ingestion gate: validates an upload, stores it, creates the record and
//! schedules exactly one pipeline run.

use bytes::Bytes;
use futures::Stream;
use std::fmt::Display;
use vidsentry_core::config::UploadConfig;
use vidsentry_core::events::MediaEvent;
use vidsentry_core::{Error, OwnerId, Result};
use vidsentry_db::models::MediaItem;
use vidsentry_db::queries::media_items::{self, NewMediaItem};

use crate::server::AppContext;
use crate::storage::sanitize_file_name;

/// Metadata the client declared alongside the content.
#[derive(Debug, Clone, Default)]
pub struct UploadMeta {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// Lower-case `type/subtype` with parameters removed, or `None` if the
/// value is not a media type at all.
pub fn normalize_media_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase();
    let (kind, subtype) = essence.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
        return None;
    }
    Some(essence)
}

/// Whether `media_type` matches an allow-list entry. Entries are exact
/// types (`video/mp4`) or wildcards (`video/*`, `*/*`).
pub fn is_allowed(media_type: &str, allowed: &[String]) -> bool {
    let Some(media_type) = normalize_media_type(media_type) else {
        return false;
    };
    let kind = media_type.split('/').next().unwrap_or_default();

    allowed.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        match entry.split_once('/') {
            Some(("*", "*")) => true,
            Some((entry_kind, "*")) => entry_kind == kind,
            Some(_) => entry == media_type,
            None => false,
        }
    })
}

/// Check the declared type against the upload policy.
pub fn check_media_type(declared: Option<&str>, policy: &UploadConfig) -> Result<String> {
    let declared = declared.unwrap_or("application/octet-stream");
    let normalized = normalize_media_type(declared)
        .ok_or_else(|| Error::Validation(format!("invalid media type '{declared}'")))?;

    if !is_allowed(&normalized, &policy.allowed_types) {
        return Err(Error::Validation(format!(
            "unsupported media type '{normalized}' (allowed: {})",
            policy.allowed_types.join(", ")
        )));
    }
    Ok(normalized)
}

/// Admit an upload.
///
/// On success the item exists in `queued` state, a `queued` event has been
/// published and one pipeline run has been scheduled. Rejected uploads leave
/// neither a record nor content behind.
pub async fn submit<S, E>(
    ctx: &AppContext,
    owner: &OwnerId,
    meta: UploadMeta,
    content: S,
) -> Result<MediaItem>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    let policy = &ctx.config.upload;
    let mime_type = check_media_type(meta.content_type.as_deref(), policy)?;
    let original_name = sanitize_file_name(meta.file_name.as_deref().unwrap_or_default());

    let stored = ctx
        .content
        .write(&original_name, content, policy.max_size_bytes)
        .await?;

    let created = vidsentry_db::pool::get_conn(&ctx.db).and_then(|conn| {
        media_items::create_media_item(
            &conn,
            &NewMediaItem {
                owner_id: owner,
                original_name: &original_name,
                file_name: &stored.file_name,
                file_path: &stored.path.to_string_lossy(),
                mime_type: &mime_type,
                size_bytes: stored.size_bytes,
            },
        )
    });

    let item = match created {
        Ok(item) => item,
        Err(e) => {
            if let Err(remove_err) = ctx.content.remove(&stored.path).await {
                tracing::warn!(
                    path = %stored.path.display(),
                    "Failed to remove content after record creation failed: {remove_err}"
                );
            }
            return Err(e);
        }
    };

    tracing::info!(
        item_id = %item.id,
        owner = %owner,
        mime_type = %item.mime_type,
        bytes = item.size_bytes,
        "Media item admitted"
    );

    ctx.event_bus.publish(MediaEvent::queued(item.id));
    ctx.pipeline.schedule(item.id);

    Ok(item)
}
