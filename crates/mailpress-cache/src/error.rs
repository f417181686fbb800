//! Error types for cache operations.

use std::io;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Cache error types.
///
/// A missing key is not an error; lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backend storage failed for an entry (`*` stands for a whole namespace).
    #[error("Cache I/O error on {namespace}/{item}: {source}")]
    Io {
        /// Namespace of the entry.
        namespace: String,
        /// Item of the entry.
        item: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The scratch directory of the disk backend could not be created.
    #[error("Failed to create cache directory: {0}")]
    Setup(#[source] io::Error),

    /// Reading the import source or writing the export sink failed.
    #[error("Stream error: {0}")]
    Stream(#[from] io::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(namespace: &str, item: &str, source: io::Error) -> Self {
        Self::Io {
            namespace: namespace.to_string(),
            item: item.to_string(),
            source,
        }
    }
}
