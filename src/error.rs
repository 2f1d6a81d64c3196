//! Error types for rss-chat.
//!
//! Library modules return [`Error`] via `thiserror`; the binary entry point
//! wraps it with `anyhow` for diagnostics. The HTTP layer maps each variant
//! to a status code and a sanitized response body — storage, network, and
//! generation causes are logged server-side and never echoed to clients.

/// Top-level error taxonomy for all rss-chat operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Feed fetch or discovery I/O failure. Never retried; discovery
    /// degrades to a best-effort empty result.
    #[error("network error: {0}")]
    Network(String),

    /// A feed that yielded zero usable entries. Fatal to that ingestion
    /// call; nothing is written.
    #[error("failed to parse feed")]
    Parse,

    /// Malformed identifier or request shape, rejected before any store
    /// access. The message is safe to return verbatim.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown session, article, or feed id.
    #[error("{0} not found")]
    NotFound(String),

    /// Relational or blob store unavailable. Surfaced as
    /// service-unavailable, not retried internally.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generation backend failure. The underlying cause is logged only.
    #[error("generation error: {0}")]
    Generation(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
