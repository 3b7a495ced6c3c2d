//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use rusqlite::types::Type;
use std::str::FromStr;
use uuid::Uuid;
use vidsentry_core::{FailureReason, MediaItemId, MediaStatus, OwnerId};

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Parse a UUID-based ID from a text column.
pub(crate) fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a text column through the type's `FromStr` impl.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: String| conversion_error(idx, e))
}

fn parse_opt_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse().map_err(|e: String| conversion_error(idx, e)))
        .transpose()
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

/// A submitted media file and its moderation state.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: MediaItemId,
    pub owner_id: OwnerId,
    pub original_name: String,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub status: MediaStatus,
    pub progress: u8,
    pub confidence: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub failure_reason: Option<FailureReason>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl MediaItem {
    /// Column list matching the order `from_row` reads.
    pub const COLUMNS: &'static str = "id, owner_id, original_name, file_name, file_path,
        mime_type, size_bytes, status, progress, confidence, duration_seconds,
        failure_reason, error, created_at, started_at, completed_at";

    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let owner: String = row.get(1)?;
        let size_bytes: i64 = row.get(6)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            owner_id: OwnerId::parse(&owner)
                .ok_or_else(|| conversion_error(1, "blank owner_id"))?,
            original_name: row.get(2)?,
            file_name: row.get(3)?,
            file_path: row.get(4)?,
            mime_type: row.get(5)?,
            size_bytes: u64::try_from(size_bytes).map_err(|e| conversion_error(6, e))?,
            status: parse_text(row, 7)?,
            progress: row.get(8)?,
            confidence: row.get(9)?,
            duration_seconds: row.get(10)?,
            failure_reason: parse_opt_text(row, 11)?,
            error: row.get(12)?,
            created_at: row.get(13)?,
            started_at: row.get(14)?,
            completed_at: row.get(15)?,
        })
    }
}
