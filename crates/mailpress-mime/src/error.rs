//! Error types for MIME encoding operations.

use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Charset resolution or validation failed.
    #[error(transparent)]
    Charset(#[from] mailpress_charset::Error),

    /// Content cache failed.
    #[error(transparent)]
    Cache(#[from] mailpress_cache::Error),

    /// Reading the source or writing the sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),

    /// Unknown `Content-Transfer-Encoding` token.
    #[error("Unknown transfer encoding: {0}")]
    UnknownTransferEncoding(String),
}
