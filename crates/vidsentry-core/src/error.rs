//! Unified error type for vidsentry.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in vidsentry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found (or is not visible to the
    /// caller).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media item").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not identified.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not access the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A byte range lies outside the content.
    #[error("Range not satisfiable for content of {total} bytes")]
    RangeNotSatisfiable {
        /// Total content length in bytes.
        total: u64,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The classifier could not produce a verdict.
    #[error("Classifier error [{classifier}]: {message}")]
    Classifier {
        /// Name of the classifier that failed.
        classifier: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Classifier { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Classifier`].
    pub fn classifier(classifier: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Classifier {
            classifier: classifier.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("media item", "abc-123");
        assert_eq!(err.to_string(), "media item not found: abc-123");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn unauthorized_display() {
        let err = Error::Unauthorized("missing identity".into());
        assert_eq!(err.to_string(), "Unauthorized: missing identity");
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn forbidden_display() {
        let err = Error::Forbidden("item is flagged".into());
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("file too large".into());
        assert_eq!(err.to_string(), "Validation error: file too large");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn range_not_satisfiable_status() {
        let err = Error::RangeNotSatisfiable { total: 1000 };
        assert_eq!(err.http_status(), 416);
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn database_display() {
        let err = Error::database("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn classifier_display() {
        let err = Error::classifier("mock", "model unavailable");
        assert_eq!(
            err.to_string(),
            "Classifier error [mock]: model unavailable"
        );
        assert_eq!(err.http_status(), 500);
    }
}
