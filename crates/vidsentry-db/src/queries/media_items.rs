//! Media item persistence.
//!
//! Every status change is a guarded `UPDATE ... WHERE status IN (...)`
//! built from [`MediaStatus::predecessors`], so the store itself refuses
//! transitions outside the status DAG. Functions that change state return
//! whether a row was actually affected.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use vidsentry_core::{Error, FailureReason, MediaItemId, MediaStatus, OwnerId, Result, Verdict};

use crate::models::{parse_id, MediaItem};

/// Fields supplied by the ingestion gate when admitting an upload.
#[derive(Debug, Clone)]
pub struct NewMediaItem<'a> {
    pub owner_id: &'a OwnerId,
    pub original_name: &'a str,
    pub file_name: &'a str,
    pub file_path: &'a str,
    pub mime_type: &'a str,
    pub size_bytes: u64,
}

/// Microsecond RFC 3339 timestamps sort lexically in creation order.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `'queued', 'processing'`-style list of the statuses that may enter `target`.
fn allowed_from(target: MediaStatus) -> String {
    MediaStatus::predecessors(target)
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn size_param(size_bytes: u64) -> Result<i64> {
    i64::try_from(size_bytes)
        .map_err(|_| Error::Validation(format!("size {size_bytes} exceeds storage range")))
}

/// Insert a new item in `queued` state.
pub fn create_media_item(conn: &Connection, new: &NewMediaItem<'_>) -> Result<MediaItem> {
    let id = MediaItemId::new();
    let created_at = now();

    conn.execute(
        "INSERT INTO media_items
            (id, owner_id, original_name, file_name, file_path, mime_type, size_bytes,
             status, progress, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'queued', 0, ?8)",
        rusqlite::params![
            id.to_string(),
            new.owner_id.as_str(),
            new.original_name,
            new.file_name,
            new.file_path,
            new.mime_type,
            size_param(new.size_bytes)?,
            &created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(MediaItem {
        id,
        owner_id: new.owner_id.clone(),
        original_name: new.original_name.to_string(),
        file_name: new.file_name.to_string(),
        file_path: new.file_path.to_string(),
        mime_type: new.mime_type.to_string(),
        size_bytes: new.size_bytes,
        status: MediaStatus::Queued,
        progress: 0,
        confidence: None,
        duration_seconds: None,
        failure_reason: None,
        error: None,
        created_at,
        started_at: None,
        completed_at: None,
    })
}

/// Get an item by ID regardless of owner.
pub fn get_media_item(conn: &Connection, id: MediaItemId) -> Result<Option<MediaItem>> {
    let q = format!("SELECT {} FROM media_items WHERE id = ?1", MediaItem::COLUMNS);
    conn.query_row(&q, [id.to_string()], MediaItem::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Get an item only if `owner` owns it.
pub fn get_owned_media_item(
    conn: &Connection,
    id: MediaItemId,
    owner: &OwnerId,
) -> Result<Option<MediaItem>> {
    let q = format!(
        "SELECT {} FROM media_items WHERE id = ?1 AND owner_id = ?2",
        MediaItem::COLUMNS
    );
    conn.query_row(
        &q,
        rusqlite::params![id.to_string(), owner.as_str()],
        MediaItem::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List an owner's items, newest first.
pub fn list_for_owner(
    conn: &Connection,
    owner: &OwnerId,
    offset: i64,
    limit: i64,
) -> Result<Vec<MediaItem>> {
    let q = format!(
        "SELECT {} FROM media_items WHERE owner_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
        MediaItem::COLUMNS
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![owner.as_str(), limit, offset],
            MediaItem::from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// All items currently in `status`, oldest first.
pub fn list_by_status(conn: &Connection, status: MediaStatus) -> Result<Vec<MediaItem>> {
    let q = format!(
        "SELECT {} FROM media_items WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
        MediaItem::COLUMNS
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([status.as_str()], MediaItem::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Move a `queued` item to `processing` with progress 0.
///
/// Returns the updated record, or `None` if the item is gone or not queued.
pub fn start_processing(conn: &Connection, id: MediaItemId) -> Result<Option<MediaItem>> {
    let q = format!(
        "UPDATE media_items SET status = 'processing', progress = 0, started_at = ?1
         WHERE id = ?2 AND status IN ({})
         RETURNING {}",
        allowed_from(MediaStatus::Processing),
        MediaItem::COLUMNS
    );
    conn.query_row(
        &q,
        rusqlite::params![now(), id.to_string()],
        MediaItem::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Raise the progress of a `processing` item.
///
/// Values above 100 are capped. Lower or equal values are ignored, so the
/// stored progress never decreases.
pub fn update_progress(conn: &Connection, id: MediaItemId, progress: u8) -> Result<bool> {
    let progress = progress.min(100);
    let n = conn
        .execute(
            "UPDATE media_items SET progress = ?1
             WHERE id = ?2 AND status = 'processing' AND progress < ?1",
            rusqlite::params![progress, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record a classifier verdict on a `processing` item.
pub fn complete_media_item(
    conn: &Connection,
    id: MediaItemId,
    verdict: &Verdict,
    duration_seconds: Option<f64>,
) -> Result<bool> {
    let status = verdict.status();
    let q = format!(
        "UPDATE media_items
         SET status = ?1, progress = 100, confidence = ?2,
             duration_seconds = COALESCE(?3, duration_seconds), completed_at = ?4
         WHERE id = ?5 AND status IN ({})",
        allowed_from(status)
    );
    let n = conn
        .execute(
            &q,
            rusqlite::params![
                status.as_str(),
                verdict.confidence,
                duration_seconds,
                now(),
                id.to_string()
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a non-terminal item as `failed`.
pub fn fail_media_item(
    conn: &Connection,
    id: MediaItemId,
    reason: FailureReason,
    error: Option<&str>,
) -> Result<bool> {
    let q = format!(
        "UPDATE media_items
         SET status = 'failed', failure_reason = ?1, error = ?2, completed_at = ?3
         WHERE id = ?4 AND status IN ({})",
        allowed_from(MediaStatus::Failed)
    );
    let n = conn
        .execute(
            &q,
            rusqlite::params![reason.as_str(), error, now(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Fail every item left in `processing` by a previous process.
///
/// Returns the IDs that were reset.
pub fn fail_orphaned_processing(conn: &Connection) -> Result<Vec<MediaItemId>> {
    let mut stmt = conn
        .prepare(
            "UPDATE media_items
             SET status = 'failed', failure_reason = ?1, error = ?2, completed_at = ?3
             WHERE status = 'processing'
             RETURNING id",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let ids = stmt
        .query_map(
            rusqlite::params![
                FailureReason::Interrupted.as_str(),
                "processing was interrupted by a restart",
                now()
            ],
            |row| parse_id(row, 0),
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(ids)
}

/// Delete an item owned by `owner`, returning the removed record.
pub fn delete_owned_media_item(
    conn: &Connection,
    id: MediaItemId,
    owner: &OwnerId,
) -> Result<Option<MediaItem>> {
    let q = format!(
        "DELETE FROM media_items WHERE id = ?1 AND owner_id = ?2 RETURNING {}",
        MediaItem::COLUMNS
    );
    conn.query_row(
        &q,
        rusqlite::params![id.to_string(), owner.as_str()],
        MediaItem::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}
