use std::io;

use thiserror::Error;

/// Failure taxonomy for the retrieval pipeline.
///
/// Join-level problems (a mapping table that cannot be matched, a key that
/// matches several rows) are not errors: they are recorded in the processing
/// log and the fold continues. Only the primary-path failures below surface
/// to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// A metadata or content request failed, or returned a non-success status.
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A completed download could not be persisted to the local cache.
    /// Degrades future calls only; the in-memory bytes are still usable.
    #[error("failed to persist cache entry `{cache_key}`: {source}")]
    CacheWrite {
        cache_key: String,
        #[source]
        source: io::Error,
    },

    /// A fetched file is structurally unrecoverable (no header row, a row
    /// with no usable fields, duplicate column names).
    #[error("unrecoverable table structure: {0}")]
    Parse(String),

    /// The HTTP client itself could not be constructed.
    #[error("failed to construct HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
