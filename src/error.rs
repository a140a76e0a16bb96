//! Error taxonomy for the indexing and retrieval engine.
//!
//! Library APIs return `Result<T, SemIndexError>`; the binary edges fold
//! these into `anyhow`. The tool server maps each variant to a stable wire
//! code so external agents never see raw internals.

use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SemIndexError>;

#[derive(Debug, thiserror::Error)]
pub enum SemIndexError {
    /// Empty or malformed path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Absolute path escapes the project root.
    #[error("path outside project root: {0}")]
    PathOutsideRoot(PathBuf),

    /// Unknown project id.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Request carried no resolvable project id.
    #[error("a project id is required")]
    ProjectRequired,

    /// DB open or migration failure; fatal for that project.
    #[error("store initialization failed: {0}")]
    StoreInit(String),

    /// Queried row absent (file, chunk, project metadata).
    #[error("not found: {0}")]
    NotFound(String),

    /// Empty query or zero-norm query vector.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Vector length does not match the model dimension on write.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// File type has no parser. The indexer falls back to line windows; the
    /// outline surface reports this.
    #[error("no parser registered for: {0}")]
    ParserUnsupported(String),

    /// Required embedding runtime could not be initialized.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingBackendUnavailable(String),

    /// Response would exceed the configured byte cap.
    #[error("response exceeds limit of {limit} bytes")]
    ResourceLimitExceeded { limit: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl SemIndexError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable wire code for the tool protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::PathOutsideRoot(_) => "PATH_OUTSIDE_ROOT",
            Self::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            Self::ProjectRequired => "PROJECT_REQUIRED",
            Self::StoreInit(_) => "STORE_INIT_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::EmbeddingDimensionMismatch { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            Self::ParserUnsupported(_) => "PARSER_UNSUPPORTED",
            Self::EmbeddingBackendUnavailable(_) => "EMBEDDING_BACKEND_UNAVAILABLE",
            Self::ResourceLimitExceeded { .. } => "RESOURCE_LIMIT_EXCEEDED",
            Self::Io { .. } => "IO_ERROR",
            Self::Sqlite(_) => "STORE_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<anyhow::Error> for SemIndexError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            SemIndexError::InvalidPath("".into()).code(),
            "INVALID_PATH"
        );
        assert_eq!(SemIndexError::ProjectRequired.code(), "PROJECT_REQUIRED");
        assert_eq!(
            SemIndexError::EmbeddingDimensionMismatch {
                expected: 384,
                actual: 768
            }
            .code(),
            "EMBEDDING_DIMENSION_MISMATCH"
        );
        assert_eq!(
            SemIndexError::ResourceLimitExceeded { limit: 1024 }.code(),
            "RESOURCE_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let err = SemIndexError::EmbeddingDimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));

        let err = SemIndexError::io(PathBuf::from("/x/y"), std::io::Error::other("boom"));
        assert!(err.to_string().contains("/x/y"));
    }
}
