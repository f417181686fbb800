//! Identity encoders: `7bit`, `8bit` and `binary`.

use std::io::{Read, Write};

use tracing::trace;

use super::{ENCODE_CHUNK_SIZE, Output, TransferEncoder, first_line_budget, read_chunk};
use crate::error::Result;

/// Line length limit of SMTP (RFC 5322 section 2.1.1).
pub const SMTP_MAX_LINE_LENGTH: usize = 998;

/// Encoder that passes content through, only folding long lines.
///
/// Lines longer than the limit are broken after their last space or tab,
/// or hard-broken at the limit if they have none. `binary` never folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainEncoder {
    name: &'static str,
    canonical: bool,
    folding: bool,
}

impl PlainEncoder {
    /// Creates a `7bit` encoder.
    #[must_use]
    pub const fn seven_bit() -> Self {
        Self {
            name: "7bit",
            canonical: false,
            folding: true,
        }
    }

    /// Creates an `8bit` encoder.
    #[must_use]
    pub const fn eight_bit() -> Self {
        Self {
            name: "8bit",
            canonical: false,
            folding: true,
        }
    }

    /// Creates a `binary` encoder, which copies content untouched.
    #[must_use]
    pub const fn binary() -> Self {
        Self {
            name: "binary",
            canonical: false,
            folding: false,
        }
    }

    /// Turns lone CR and LF into CRLF.
    #[must_use]
    pub const fn canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }
}

impl TransferEncoder for PlainEncoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn encode_stream(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<u64> {
        let max = if max_line_length == 0 {
            SMTP_MAX_LINE_LENGTH
        } else {
            max_line_length
        };
        let mut folder = Folder {
            max,
            budget: first_line_budget(max, first_line_offset),
            line: Vec::with_capacity(max + 1),
            pending_cr: false,
            canonical: self.canonical,
        };
        let mut buf = vec![0u8; ENCODE_CHUNK_SIZE];
        let mut out = Output::with_capacity(ENCODE_CHUNK_SIZE + max);
        let mut consumed = 0u64;

        loop {
            let n = read_chunk(src, &mut buf)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            if self.folding {
                for &byte in &buf[..n] {
                    folder.push(byte, &mut out);
                }
            } else {
                out.push(&buf[..n]);
            }
            out.drain_into(dst)?;
        }
        if self.folding {
            folder.finish(&mut out);
        }

        let written = out.finish(dst)?;
        trace!(encoding = self.name, bytes_in = consumed, bytes_out = written, "Copied content");
        Ok(written)
    }
}

/// Line folding state carried across chunks.
struct Folder {
    max: usize,
    budget: usize,
    line: Vec<u8>,
    /// A CR was seen and its LF may still follow.
    pending_cr: bool,
    canonical: bool,
}

impl Folder {
    fn push(&mut self, byte: u8, out: &mut Output) {
        if self.pending_cr {
            self.pending_cr = false;
            if byte == b'\n' {
                self.end_line(out);
                return;
            }
            if self.canonical {
                self.end_line(out);
            } else {
                self.content(b'\r', out);
            }
        }
        match byte {
            b'\r' => self.pending_cr = true,
            b'\n' if self.canonical => self.end_line(out),
            _ => self.content(byte, out),
        }
    }

    fn content(&mut self, byte: u8, out: &mut Output) {
        if self.line.len() >= self.budget {
            self.fold(out);
        }
        self.line.push(byte);
    }

    /// Breaks the full line after its last whitespace, or at the limit.
    fn fold(&mut self, out: &mut Output) {
        let split = self
            .line
            .iter()
            .rposition(|&b| b == b' ' || b == b'\t')
            .filter(|&pos| pos > 0)
            .map_or(self.line.len(), |pos| pos + 1);
        out.push(&self.line[..split]);
        out.push(b"\r\n");
        self.line.drain(..split);
        self.budget = self.max;
    }

    fn end_line(&mut self, out: &mut Output) {
        out.push(&self.line);
        out.push(b"\r\n");
        self.line.clear();
        self.budget = self.max;
    }

    fn finish(&mut self, out: &mut Output) {
        if self.pending_cr {
            self.pending_cr = false;
            if self.canonical {
                self.end_line(out);
                return;
            }
            self.content(b'\r', out);
        }
        out.push(&self.line);
        self.line.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_unchanged() {
        let text = b"Hello\r\nWorld";
        assert_eq!(PlainEncoder::seven_bit().encode_bytes(text, 0, 0).unwrap(), text);
        assert_eq!(PlainEncoder::eight_bit().name(), "8bit");
    }

    #[test]
    fn test_fold_at_whitespace() {
        let encoded = PlainEncoder::seven_bit()
            .encode_string(b"aaaa bbbb cccc", 0, 10)
            .unwrap();
        assert_eq!(encoded, "aaaa bbbb \r\ncccc");
    }

    #[test]
    fn test_hard_fold_without_whitespace() {
        let encoded = PlainEncoder::seven_bit()
            .encode_string(b"abcdefghijkl", 0, 5)
            .unwrap();
        assert_eq!(encoded, "abcde\r\nfghij\r\nkl");
    }

    #[test]
    fn test_canonical_line_breaks() {
        let encoder = PlainEncoder::eight_bit().canonical(true);
        assert_eq!(encoder.encode_string(b"a\nb\rc\r\nd\r", 0, 0).unwrap(), "a\r\nb\r\nc\r\nd\r\n");

        let raw = PlainEncoder::eight_bit();
        assert_eq!(raw.encode_string(b"a\nb\rc", 0, 0).unwrap(), "a\nb\rc");
    }

    #[test]
    fn test_binary_passes_through() {
        let data: Vec<u8> = (0..=255).collect();
        let encoder = PlainEncoder::binary();
        assert_eq!(encoder.encode_bytes(&data, 0, 4).unwrap(), data);
        assert!(encoder.encode_string(&data, 0, 0).is_err());
    }
}
