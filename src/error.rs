//! Error types for submit-queue

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the queue
#[derive(Debug, Error)]
pub enum Error {
    /// The Gerrit API returned an unexpected status or payload
    #[error("gerrit api error: {0}")]
    Gerrit(String),

    /// HTTP transport failure (connect, timeout, TLS)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gerrit refused a rebase because it does not apply cleanly
    #[error("rebase conflict on change {change_id}: {message}")]
    RebaseConflict {
        /// Change that failed to rebase
        change_id: String,
        /// Response body from Gerrit
        message: String,
    },

    /// A chain failed its integrity check
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    /// Chains must contain at least one changeset
    #[error("a chain may not be empty")]
    EmptyChain,

    /// Configuration error detected at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a rebase conflict (skipped, not fatal)
    #[must_use]
    pub const fn is_rebase_conflict(&self) -> bool {
        matches!(self, Self::RebaseConflict { .. })
    }
}
