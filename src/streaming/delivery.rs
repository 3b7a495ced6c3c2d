//! Range-aware file delivery.
//!
//! Every request opens its own file handle and streams it in 64 KiB chunks
//! via `ReaderStream`, so concurrent readers share no cursor and memory
//! stays bounded regardless of file size.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use vidsentry_core::{Error, Result};
use vidsentry_db::models::MediaItem;

use super::range::{self, ByteRange};

const CHUNK_SIZE: usize = 64 * 1024;

/// A ready-to-send response body for (part of) an item's content.
pub struct Delivery {
    pub range: ByteRange,
    pub total: u64,
    pub content_type: String,
    body: Body,
}

impl Delivery {
    /// HTTP status this delivery is sent with.
    pub fn status(&self) -> StatusCode {
        match self.range {
            ByteRange::Partial { .. } => StatusCode::PARTIAL_CONTENT,
            _ => StatusCode::OK,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.range.len(self.total)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("range", &self.range)
            .field("total", &self.total)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Open an item's content for the requested range.
///
/// A record whose file is gone is reported as not found. An unsatisfiable
/// range yields [`Error::RangeNotSatisfiable`].
pub async fn open(item: &MediaItem, range_header: Option<&str>) -> Result<Delivery> {
    open_path(
        Path::new(&item.file_path),
        &item.mime_type,
        range_header,
    )
    .await
    .map_err(|e| match e {
        Error::NotFound { .. } => Error::not_found("media content", item.id),
        other => other,
    })
}

/// Open `path` for the requested range.
pub async fn open_path(path: &Path, content_type: &str, range_header: Option<&str>) -> Result<Delivery> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("file", path.display()));
        }
        Err(e) => return Err(e.into()),
    };
    let total = file.metadata().await?.len();

    let range = range::resolve(range_header.and_then(range::parse_range_header), total);

    let body = match range {
        ByteRange::Unsatisfiable => return Err(Error::RangeNotSatisfiable { total }),
        ByteRange::Full => Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE)),
        ByteRange::Partial { start, end } => {
            file.seek(std::io::SeekFrom::Start(start)).await?;
            // Limit reads to exactly the requested slice.
            let limited = file.take(end - start + 1);
            Body::from_stream(ReaderStream::with_capacity(limited, CHUNK_SIZE))
        }
    };

    Ok(Delivery {
        range,
        total,
        content_type: content_type.to_string(),
        body,
    })
}

impl IntoResponse for Delivery {
    fn into_response(self) -> Response {
        let status = self.status();
        let length = self.content_length();
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

        let mut response = Response::new(self.body);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        if let ByteRange::Partial { start, end } = self.range {
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {start}-{end}/{}", self.total))
            {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}
