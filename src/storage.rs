//! On-disk content store for uploaded media.
//!
//! Each upload is streamed to its own file under the storage root with a
//! generated `{unix_millis}-{random}.{ext}` name, so client-supplied names
//! never reach the filesystem.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use rand::Rng;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vidsentry_core::{Error, Result};

const MAX_FILENAME_LENGTH: usize = 255;
const MAX_EXTENSION_LENGTH: usize = 10;

/// A file written by [`ContentStore::write`].
#[derive(Debug, Clone)]
pub struct StoredContent {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Directory holding one file per media item.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (and create if needed) the storage directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stream `content` to a new file, enforcing `max_bytes`.
    ///
    /// Oversized, empty and interrupted uploads leave nothing behind.
    pub async fn write<S, E>(
        &self,
        original_name: &str,
        content: S,
        max_bytes: u64,
    ) -> Result<StoredContent>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Display,
    {
        let file_name = generate_file_name(original_name);
        let path = self.root.join(&file_name);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut content = std::pin::pin!(content);
        let mut written: u64 = 0;

        let copied: Result<()> = async {
            while let Some(chunk) = content.next().await {
                let chunk =
                    chunk.map_err(|e| Error::Validation(format!("failed to read upload: {e}")))?;
                written += chunk.len() as u64;
                if written > max_bytes {
                    return Err(Error::Validation(format!(
                        "file exceeds the maximum size of {max_bytes} bytes"
                    )));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);

        let outcome = match copied {
            Ok(()) if written == 0 => Err(Error::Validation("uploaded file is empty".into())),
            other => other,
        };

        if let Err(e) = outcome {
            if let Err(remove_err) = self.remove(&path).await {
                tracing::warn!(path = %path.display(), "Failed to remove rejected upload: {remove_err}");
            }
            return Err(e);
        }

        tracing::debug!(file = %file_name, bytes = written, "Stored upload");
        Ok(StoredContent {
            file_name,
            path,
            size_bytes: written,
        })
    }

    /// Delete a stored file. Returns `false` if it was already gone.
    pub async fn remove(&self, path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Strip directory components and unsafe characters from a client file name.
pub fn sanitize_file_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let sanitized: String = last
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LENGTH)
        .collect();

    let trimmed = sanitized.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collision-resistant storage name keeping a short, safe extension.
fn generate_file_name(original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);

    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LENGTH
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) => format!("{millis}-{suffix}.{ext}"),
        None => format!("{millis}-{suffix}"),
    }
}
