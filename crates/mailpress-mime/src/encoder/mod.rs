//! Content transfer encoders.
//!
//! Every encoder works in two modes that produce identical output: whole
//! input at once ([`TransferEncoder::encode_string`]) or chunk by chunk from
//! a reader into a writer ([`TransferEncoder::encode_stream`]). Streaming
//! holds at most one chunk plus a few bytes of carry-over in memory.

mod base64;
mod plain;
mod quoted_printable;
mod rfc2231;

use std::io::{self, Read, Write};

pub use self::base64::Base64Encoder;
pub use plain::{PlainEncoder, SMTP_MAX_LINE_LENGTH};
pub use quoted_printable::{QpEncoder, QpOptions};
pub use rfc2231::{HEADER_MAX_LINE_LENGTH, RFC2231_MAX_LINE_LENGTH, Rfc2231Encoder};

use crate::error::Result;

/// Bytes read from the source per streaming step.
pub const ENCODE_CHUNK_SIZE: usize = 8192;

/// Line length limit of RFC 2045 encoded bodies.
pub const RFC2045_MAX_LINE_LENGTH: usize = 76;

/// Encodes raw bytes into a transfer-safe representation.
///
/// `first_line_offset` is the number of characters already on the first
/// output line (for example a header name), so the first line gets that much
/// less room. An offset that leaves no room still gets one column, so the
/// first line is never empty. `max_line_length` caps every output line
/// excluding its CRLF; `0` selects the encoder's default.
pub trait TransferEncoder: std::fmt::Debug {
    /// Returns the `Content-Transfer-Encoding` token of this encoder.
    fn name(&self) -> &'static str;

    /// Encodes everything `src` yields into `dst`.
    ///
    /// Returns the number of bytes written to `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, writing or charset validation fails.
    fn encode_stream(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<u64>;

    /// Encodes `input` into a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if charset validation fails.
    fn encode_bytes(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<Vec<u8>> {
        let mut src = input;
        let mut out = Vec::with_capacity(input.len() + input.len() / 2);
        self.encode_stream(&mut src, &mut out, first_line_offset, max_line_length)?;
        Ok(out)
    }

    /// Encodes `input` into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if charset validation fails, or
    /// [`Error::Utf8Decode`](crate::Error::Utf8Decode) if the encoder passes
    /// through bytes that are not UTF-8.
    fn encode_string(
        &self,
        input: &[u8],
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<String> {
        let bytes = self.encode_bytes(input, first_line_offset, max_line_length)?;
        String::from_utf8(bytes).map_err(Into::into)
    }
}

/// Resolves a requested line length: `0` and anything above `cap` fall back
/// to `cap`.
/// Room on the first line, never less than one column.
pub(crate) const fn first_line_budget(max: usize, first_line_offset: usize) -> usize {
    let budget = max.saturating_sub(first_line_offset);
    if budget == 0 { 1 } else { budget }
}

pub(crate) const fn clamp_line_length(requested: usize, cap: usize) -> usize {
    if requested == 0 || requested > cap {
        cap
    } else {
        requested
    }
}

/// Reads into `buf`, retrying on interruption.
pub(crate) fn read_chunk(src: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match src.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}

/// Output buffer that tracks how much was written.
#[derive(Debug, Default)]
pub(crate) struct Output {
    buf: Vec<u8>,
    written: u64,
}

impl Output {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            written: 0,
        }
    }

    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Hands buffered output to `dst`.
    pub(crate) fn drain_into(&mut self, dst: &mut dyn Write) -> io::Result<()> {
        if !self.buf.is_empty() {
            dst.write_all(&self.buf)?;
            self.written += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    /// Drains remaining output and flushes `dst`.
    pub(crate) fn finish(mut self, dst: &mut dyn Write) -> io::Result<u64> {
        self.drain_into(dst)?;
        dst.flush()?;
        Ok(self.written)
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Returns `escape` followed by the two uppercase hex digits of `byte`.
pub(crate) const fn hex_escape(escape: u8, byte: u8) -> [u8; 3] {
    [
        escape,
        HEX_DIGITS[(byte >> 4) as usize],
        HEX_DIGITS[(byte & 0x0F) as usize],
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_line_length() {
        assert_eq!(clamp_line_length(0, 76), 76);
        assert_eq!(clamp_line_length(100, 76), 76);
        assert_eq!(clamp_line_length(40, 76), 40);
    }

    #[test]
    fn test_first_line_budget_keeps_a_column() {
        assert_eq!(first_line_budget(76, 0), 76);
        assert_eq!(first_line_budget(76, 30), 46);
        assert_eq!(first_line_budget(76, 76), 1);
        assert_eq!(first_line_budget(76, 200), 1);
    }

    #[test]
    fn test_hex_escape_uppercase() {
        assert_eq!(&hex_escape(b'=', 0xAB), b"=AB");
        assert_eq!(&hex_escape(b'%', 0x0A), b"%0A");
    }

    #[test]
    fn test_output_counts_written_bytes() {
        let mut out = Output::with_capacity(8);
        let mut sink = Vec::new();
        out.push(b"abc");
        out.drain_into(&mut sink).unwrap();
        out.push(b"d");
        assert_eq!(out.finish(&mut sink).unwrap(), 4);
        assert_eq!(sink, b"abcd");
    }
}
