//! Base64 encoder (RFC 2045 section 6.8).

use std::io::{Read, Write};

use ::base64::Engine;
use ::base64::engine::general_purpose::STANDARD;
use tracing::trace;

use super::{
    ENCODE_CHUNK_SIZE, Output, RFC2045_MAX_LINE_LENGTH, TransferEncoder, clamp_line_length,
    first_line_budget, read_chunk,
};
use crate::error::Result;

/// Base64 transfer encoder.
///
/// Output lines are wrapped with CRLF at the line limit and the output does
/// not end with a line break. Streaming carries up to two bytes between
/// chunks, so the result never depends on how the input was split.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encoder;

impl Base64Encoder {
    /// Creates a Base64 encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransferEncoder for Base64Encoder {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn encode_stream(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<u64> {
        let max = clamp_line_length(max_line_length, RFC2045_MAX_LINE_LENGTH);
        let mut wrapper = LineWrapper::new(max, first_line_offset);
        let mut out = Output::with_capacity(ENCODE_CHUNK_SIZE * 2);
        let mut encoded = String::with_capacity(ENCODE_CHUNK_SIZE * 2);
        // Two spare bytes in front hold the carry of the previous chunk.
        let mut buf = vec![0u8; ENCODE_CHUNK_SIZE + 2];
        let mut carry = 0usize;
        let mut consumed = 0u64;

        loop {
            let n = read_chunk(src, &mut buf[carry..carry + ENCODE_CHUNK_SIZE])?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            let filled = carry + n;
            let whole = filled / 3 * 3;

            encoded.clear();
            STANDARD.encode_string(&buf[..whole], &mut encoded);
            wrapper.push(encoded.as_bytes(), &mut out);
            out.drain_into(dst)?;

            buf.copy_within(whole..filled, 0);
            carry = filled - whole;
        }

        if carry > 0 {
            encoded.clear();
            STANDARD.encode_string(&buf[..carry], &mut encoded);
            wrapper.push(encoded.as_bytes(), &mut out);
        }
        let written = out.finish(dst)?;
        trace!(bytes_in = consumed, bytes_out = written, "Base64 encoded");
        Ok(written)
    }
}

/// Splits a continuous run of characters into CRLF separated lines.
#[derive(Debug)]
pub(crate) struct LineWrapper {
    max: usize,
    budget: usize,
    len: usize,
}

impl LineWrapper {
    pub(crate) const fn new(max: usize, first_line_offset: usize) -> Self {
        Self {
            max,
            budget: first_line_budget(max, first_line_offset),
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, mut text: &[u8], out: &mut Output) {
        while !text.is_empty() {
            if self.len >= self.budget {
                out.push(b"\r\n");
                self.len = 0;
                self.budget = self.max;
            }
            let take = (self.budget - self.len).min(text.len());
            out.push(&text[..take]);
            self.len += take;
            text = &text[take..];
        }
    }
}
