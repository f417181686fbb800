//! Quoted-Printable encoder (RFC 2045 section 6.7).
//!
//! Works on characters, not bytes: a soft line break never lands inside a
//! multi-byte character, so every line decodes to whole characters.

use std::io::{Read, Write};
use std::sync::Arc;

use mailpress_charset::{CharacterStream, CharsetReader, CharsetReaderFactory};
use tracing::trace;

use super::{
    ENCODE_CHUNK_SIZE, Output, RFC2045_MAX_LINE_LENGTH, TransferEncoder, clamp_line_length,
    first_line_budget, hex_escape, read_chunk,
};
use crate::error::Result;

/// Characters held back while streaming. Whitespace is escaped when a line
/// break follows it, and a CRLF pair must be seen whole.
const LOOKAHEAD: usize = 2;

/// Optional Quoted-Printable behaviours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QpOptions {
    /// Treat a lone CR or LF as a line break and emit CRLF for it.
    /// Otherwise lone CR and LF are escaped as `=0D` and `=0A`.
    pub canonical: bool,
    /// Escape a `.` at the start of a line as `=2E` so SMTP transports do
    /// not mistake it for the end of data.
    pub dot_escape: bool,
}

impl QpOptions {
    /// Creates the default options: no canonicalization, no dot escaping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            canonical: false,
            dot_escape: false,
        }
    }

    /// Sets line break canonicalization.
    #[must_use]
    pub const fn canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    /// Sets leading dot escaping.
    #[must_use]
    pub const fn dot_escape(mut self, dot_escape: bool) -> Self {
        self.dot_escape = dot_escape;
        self
    }
}

/// Quoted-Printable transfer encoder.
///
/// Printable ASCII passes through except `=`; everything else becomes
/// `=XX`. Lines are at most 76 characters including the trailing `=` of a
/// soft break.
#[derive(Debug, Clone)]
pub struct QpEncoder {
    factory: CharsetReaderFactory,
    charset: String,
    reader: Arc<dyn CharsetReader>,
    options: QpOptions,
}

impl QpEncoder {
    /// Creates an encoder for text in `charset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`](crate::Error::Charset) if the charset is
    /// unknown.
    pub fn new(charset: &str) -> Result<Self> {
        Self::with_factory(CharsetReaderFactory::new(), charset)
    }

    /// Creates an encoder resolving charsets through `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`](crate::Error::Charset) if the charset is
    /// unknown.
    pub fn with_factory(factory: CharsetReaderFactory, charset: &str) -> Result<Self> {
        let reader = factory.resolve(charset)?;
        Ok(Self {
            factory,
            charset: charset.to_string(),
            reader,
            options: QpOptions::new(),
        })
    }

    /// Replaces the encoding options.
    #[must_use]
    pub fn with_options(mut self, options: QpOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the charset of the text being encoded.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Returns the encoding options.
    #[must_use]
    pub const fn options(&self) -> QpOptions {
        self.options
    }

    /// Switches to another charset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`](crate::Error::Charset) if the charset is
    /// unknown; the encoder keeps its previous charset.
    pub fn set_charset(&mut self, charset: &str) -> Result<()> {
        self.reader = self.factory.resolve(charset)?;
        self.charset = charset.to_string();
        Ok(())
    }

    /// Encodes the character at the stream cursor and moves past it.
    fn step(
        &self,
        stream: &mut CharacterStream,
        line: &mut LineState,
        out: &mut Output,
        token: &mut Vec<u8>,
    ) {
        let at = stream.pointer();
        let advance = match stream.char_at(at) {
            Some(ch) => self.encode_char(
                ch,
                stream.char_at(at + 1),
                stream.char_at(at + 2),
                line,
                out,
                token,
            ),
            None => return,
        };
        stream.set_pointer(at + advance);
    }

    /// Encodes one character given the two that follow it. Returns how many
    /// characters were consumed.
    fn encode_char(
        &self,
        ch: &[u8],
        next: Option<&[u8]>,
        after_next: Option<&[u8]>,
        line: &mut LineState,
        out: &mut Output,
        token: &mut Vec<u8>,
    ) -> usize {
        match ch {
            b"\r" if next == Some(b"\n".as_slice()) => {
                line.hard_break(out);
                return 2;
            }
            b"\r" | b"\n" if self.options.canonical => {
                line.hard_break(out);
                return 1;
            }
            _ => {}
        }

        let trailing = match next {
            None => true,
            Some(b"\r") => self.options.canonical || after_next == Some(b"\n".as_slice()),
            Some(b"\n") => self.options.canonical,
            Some(_) => false,
        };

        self.build_token(ch, trailing, line.at_start, token);
        if line.needs_soft_break(token.len()) {
            line.soft_break(out);
            if self.options.dot_escape && ch == b"." {
                self.build_token(ch, trailing, true, token);
            }
        }
        out.push(token);
        line.len += token.len();
        line.at_start = false;
        1
    }

    fn build_token(&self, ch: &[u8], trailing: bool, at_start: bool, token: &mut Vec<u8>) {
        token.clear();
        if let &[byte] = ch {
            let literal = match byte {
                b'.' => !(self.options.dot_escape && at_start),
                33..=60 | 62..=126 => true,
                b' ' | b'\t' => !trailing,
                _ => false,
            };
            if literal {
                token.push(byte);
                return;
            }
        }
        for &byte in ch {
            token.extend_from_slice(&hex_escape(b'=', byte));
        }
    }
}

impl TransferEncoder for QpEncoder {
    fn name(&self) -> &'static str {
        "quoted-printable"
    }

    fn encode_stream(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<u64> {
        let max = clamp_line_length(max_line_length, RFC2045_MAX_LINE_LENGTH);
        let mut line = LineState::new(max, first_line_offset);
        let mut stream = CharacterStream::with_reader(&self.charset, Arc::clone(&self.reader));
        let mut buf = vec![0u8; ENCODE_CHUNK_SIZE];
        let mut out = Output::with_capacity(ENCODE_CHUNK_SIZE * 3);
        let mut token = Vec::with_capacity(16);
        let mut consumed = 0u64;

        loop {
            let n = read_chunk(src, &mut buf)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            stream.write(&buf[..n])?;
            while stream.pointer() + LOOKAHEAD < stream.len() {
                self.step(&mut stream, &mut line, &mut out, &mut token);
            }
            stream.discard_read();
            out.drain_into(dst)?;
        }

        stream.finish()?;
        while stream.pointer() < stream.len() {
            self.step(&mut stream, &mut line, &mut out, &mut token);
        }
        let written = out.finish(dst)?;
        trace!(
            charset = %self.charset,
            bytes_in = consumed,
            bytes_out = written,
            "Quoted-printable encoded"
        );
        Ok(written)
    }
}

/// Position on the current output line.
#[derive(Debug)]
struct LineState {
    max: usize,
    /// Room on the current line; smaller than `max` on the first line.
    budget: usize,
    len: usize,
    at_start: bool,
}

impl LineState {
    const fn new(max: usize, first_line_offset: usize) -> Self {
        Self {
            max,
            budget: first_line_budget(max, first_line_offset),
            len: 0,
            at_start: first_line_offset == 0,
        }
    }

    /// Whether a token must go on a fresh line. One column is kept free for
    /// the `=` of a soft break.
    const fn needs_soft_break(&self, token_len: usize) -> bool {
        self.len + token_len >= self.budget && (self.len > 0 || self.budget < self.max)
    }

    fn soft_break(&mut self, out: &mut Output) {
        out.push(b"=\r\n");
        self.new_line();
    }

    fn hard_break(&mut self, out: &mut Output) {
        out.push(b"\r\n");
        self.new_line();
    }

    const fn new_line(&mut self) {
        self.len = 0;
        self.budget = self.max;
        self.at_start = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use std::io;

    use super::*;
    use crate::error::Error;

    fn utf8() -> QpEncoder {
        QpEncoder::new("utf-8").unwrap()
    }

    /// Reader that hands out one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.split_first() {
                Some((&byte, rest)) if !buf.is_empty() => {
                    buf[0] = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn test_printable_ascii_unchanged() {
        let encoded = utf8().encode_string(b"Hello, World!", 0, 0).unwrap();
        assert_eq!(encoded, "Hello, World!");
    }

    #[test]
    fn test_non_ascii_escaped_uppercase() {
        let encoded = utf8().encode_string("Héllo".as_bytes(), 0, 0).unwrap();
        assert_eq!(encoded, "H=C3=A9llo");
    }

    #[test]
    fn test_equals_sign_escaped() {
        let encoded = utf8().encode_string(b"a=b", 0, 0).unwrap();
        assert_eq!(encoded, "a=3Db");
    }

    #[test]
    fn test_whitespace_before_line_break_escaped() {
        let encoded = utf8().encode_string(b"a \r\nb\t\r\nc", 0, 0).unwrap();
        assert_eq!(encoded, "a=20\r\nb=09\r\nc");
    }

    #[test]
    fn test_whitespace_at_end_escaped() {
        assert_eq!(utf8().encode_string(b"a ", 0, 0).unwrap(), "a=20");
        assert_eq!(utf8().encode_string(b"a\t", 0, 0).unwrap(), "a=09");
        assert_eq!(utf8().encode_string(b"a b", 0, 0).unwrap(), "a b");
    }

    #[test]
    fn test_soft_breaks_respect_line_length() {
        let input = "a".repeat(200);
        let encoded = utf8().encode_string(input.as_bytes(), 0, 0).unwrap();
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        assert!(lines.len() > 2);
        for line in &lines {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
        for line in &lines[..lines.len() - 1] {
            assert!(line.ends_with('='));
        }
        assert_eq!(encoded.replace("=\r\n", ""), input);
    }

    #[test]
    fn test_first_line_offset_shortens_first_line() {
        let input = "b".repeat(100);
        let encoded = utf8().encode_string(input.as_bytes(), 30, 0).unwrap();
        let first = encoded.split("\r\n").next().unwrap();
        assert!(first.len() <= 46);
        assert!(encoded.split("\r\n").skip(1).all(|l| l.len() <= 76));
    }

    #[test]
    fn test_offset_past_limit_starts_with_soft_break() {
        let encoded = utf8().encode_string(b"abc", 76, 0).unwrap();
        assert_eq!(encoded, "=\r\nabc");
        assert_eq!(encoded.split("\r\n").next().unwrap().len(), 1);
        assert_eq!(utf8().encode_string(b"abc", 100, 0).unwrap(), "=\r\nabc");
    }

    #[test]
    fn test_oversized_max_clamped() {
        let input = "c".repeat(300);
        let encoded = utf8().encode_string(input.as_bytes(), 0, 500).unwrap();
        assert!(encoded.split("\r\n").all(|l| l.len() <= 76));
    }

    #[test]
    fn test_multibyte_character_never_split() {
        let input = "€".repeat(40);
        let encoded = utf8().encode_string(input.as_bytes(), 0, 0).unwrap();
        for line in encoded.split("\r\n") {
            let body = line.strip_suffix('=').unwrap_or(line);
            assert_eq!(body.len() % 9, 0, "split character in {line:?}");
            assert!(body.starts_with("=E2=82=AC"));
        }
    }

    #[test]
    fn test_lone_line_feed() {
        assert_eq!(utf8().encode_string(b"a\nb", 0, 0).unwrap(), "a=0Ab");

        let canonical = utf8().with_options(QpOptions::new().canonical(true));
        assert_eq!(canonical.encode_string(b"a\nb\rc", 0, 0).unwrap(), "a\r\nb\r\nc");
        assert_eq!(canonical.encode_string(b"a \nb", 0, 0).unwrap(), "a=20\r\nb");
    }

    #[test]
    fn test_dot_escape() {
        let plain = utf8().encode_string(b".\r\n.x", 0, 0).unwrap();
        assert_eq!(plain, ".\r\n.x");

        let escaping = utf8().with_options(QpOptions::new().dot_escape(true));
        assert_eq!(escaping.encode_string(b".\r\n.x.", 0, 0).unwrap(), "=2E\r\n=2Ex.");
    }

    #[test]
    fn test_streaming_matches_string_encoding() {
        let mut input = Vec::new();
        for i in 0..50 {
            input.extend_from_slice(format!("line {i} with € and trailing space \r\n").as_bytes());
        }
        input.extend_from_slice("ünïcödé ".as_bytes());

        let encoder = utf8();
        let expected = encoder.encode_string(&input, 10, 0).unwrap();
        let mut out = Vec::new();
        let written = encoder
            .encode_stream(&mut Trickle(&input), &mut out, 10, 0)
            .unwrap();
        assert_eq!(written, out.len() as u64);
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_invalid_input_rejected() {
        let result = utf8().encode_string(b"ok \xC3\x28", 0, 0);
        assert!(matches!(result, Err(Error::Charset(_))));
    }

    #[test]
    fn test_unknown_charset() {
        assert!(matches!(QpEncoder::new("x-klingon"), Err(Error::Charset(_))));

        let mut encoder = utf8();
        assert!(encoder.set_charset("x-klingon").is_err());
        assert_eq!(encoder.charset(), "utf-8");
        encoder.set_charset("iso-8859-1").unwrap();
        assert_eq!(encoder.encode_string(b"\xE9", 0, 0).unwrap(), "=E9");
    }
}
