//! Error types for charset operations.

/// Result type alias for charset operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Charset error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No reader is known for the charset name.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// Bytes that are not valid in the bound charset.
    #[error(
        "Malformed {charset} data at byte offset {byte_offset} ({decoded_chars} characters decoded)"
    )]
    MalformedCharset {
        /// Charset the stream was bound to.
        charset: String,
        /// Offset of the first byte of the offending sequence.
        byte_offset: u64,
        /// Number of characters accepted before the failure.
        decoded_chars: u64,
    },

    /// I/O error while draining a byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
