//! Error types for snapshot operations.
//!
//! Provider failures and storage failures are kept apart: [`FetchError`] covers
//! everything that can go wrong while talking to a market-data provider,
//! [`StoreError`] covers persistence, and [`Error`] is what the service boundary
//! returns.

use thiserror::Error;

/// Errors raised while fetching statements from a provider.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network-related errors (connection failures, timeouts, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The requested symbol was not found.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// No provider is configured to serve the request.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Any other provider-reported failure.
    #[error("Provider error: {0}")]
    Provider(String),
}

/// Errors raised by a [`SnapshotStore`](crate::store::SnapshotStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database rejected or failed an operation.
    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness or integrity constraint was violated.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by the snapshot service boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Fetching from the provider failed; nothing was persisted.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Persisting or reading a snapshot failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No snapshot exists for the requested symbol.
    #[error("No snapshot stored for {0}")]
    NotFound(String),
}

impl Error {
    /// Returns true if the error originated at the provider.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }

    /// Returns true if the error originated in the store.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type alias for provider operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
