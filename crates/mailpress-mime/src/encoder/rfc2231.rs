//! RFC 2231 parameter value encoder.
//!
//! Non-ASCII header parameters such as attachment file names are written as
//! percent-encoded, charset-tagged continuations:
//!
//! ```text
//! filename*0*=utf-8''%E2%82%AC%20rates;
//!  filename*1*=%20report.pdf
//! ```

use std::fmt::Write as _;
use std::io::{Read, Write};
use std::sync::Arc;

use mailpress_charset::{CharacterStream, CharsetReader, CharsetReaderFactory};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_encode};
use tracing::trace;

use super::{ENCODE_CHUNK_SIZE, Output, TransferEncoder, read_chunk};
use crate::error::Result;

/// Default segment length of encoded values.
pub const RFC2231_MAX_LINE_LENGTH: usize = 75;

/// Default line length of a header carrying parameters.
pub const HEADER_MAX_LINE_LENGTH: usize = 78;

/// Bytes that may appear unescaped in an encoded value.
const ATTRIBUTE_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encoding encoder for header parameter values.
///
/// The streaming form emits the encoded value as CRLF separated segments;
/// [`encode_parameter`](Self::encode_parameter) turns them into numbered
/// `name*N*=` continuations.
#[derive(Debug, Clone)]
pub struct Rfc2231Encoder {
    factory: CharsetReaderFactory,
    charset: String,
    reader: Arc<dyn CharsetReader>,
}

impl Rfc2231Encoder {
    /// Creates an encoder for values in `charset`.
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
        })
    }

    /// Returns the charset of the values being encoded.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
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

    /// Renders a complete `name=value` header parameter.
    ///
    /// Token values are written bare and other ASCII values quoted. Values
    /// that are not ASCII, or too long for one line, are percent-encoded and
    /// split into `name*0*=`, `name*1*=` continuations joined by `;` and a
    /// folding line break. `language` may be empty. A `max_line_length` of
    /// `0` selects [`HEADER_MAX_LINE_LENGTH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`](crate::Error::Charset) if `value` is not
    /// valid in the encoder's charset.
    pub fn encode_parameter(
        &self,
        name: &str,
        value: &[u8],
        language: &str,
        max_line_length: usize,
    ) -> Result<String> {
        let max = if max_line_length == 0 {
            HEADER_MAX_LINE_LENGTH
        } else {
            max_line_length
        };
        let prefix = format!("{}'{}'", self.charset, language);

        let ascii = value.iter().all(|&b| is_ascii_text(b));
        let plain_room = max.saturating_sub(name.len() + "=*N\"\";".len() + 1);
        if ascii && value.len() <= plain_room {
            return Ok(format!("{name}={}", quote_if_needed(value)));
        }

        let room = max.saturating_sub(name.len() + "*N*=\"\";".len() + 1);
        let encoded = self.encode_string(value, prefix.len(), room)?;
        let segments: Vec<&str> = encoded.split("\r\n").collect();
        if let [single] = segments.as_slice() {
            return Ok(format!("{name}*={prefix}{single}"));
        }

        let mut result = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                result.push_str(";\r\n ");
            }
            let _ = write!(result, "{name}*{i}*=");
            if i == 0 {
                result.push_str(&prefix);
            }
            result.push_str(segment);
        }
        Ok(result)
    }
}

impl TransferEncoder for Rfc2231Encoder {
    fn name(&self) -> &'static str {
        "rfc2231"
    }

    fn encode_stream(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        first_line_offset: usize,
        max_line_length: usize,
    ) -> Result<u64> {
        let max = if max_line_length == 0 {
            RFC2231_MAX_LINE_LENGTH
        } else {
            max_line_length
        };
        let mut budget = max.saturating_sub(first_line_offset);
        let mut line_len = 0usize;
        let mut stream = CharacterStream::with_reader(&self.charset, Arc::clone(&self.reader));
        let mut buf = vec![0u8; ENCODE_CHUNK_SIZE];
        let mut out = Output::with_capacity(ENCODE_CHUNK_SIZE * 3);
        let mut token = String::with_capacity(16);
        let mut consumed = 0u64;

        loop {
            let n = read_chunk(src, &mut buf)?;
            if n == 0 {
                break;
            }
            consumed += n as u64;
            stream.write(&buf[..n])?;
            while let Some(ch) = stream.next_char() {
                token.clear();
                token.extend(percent_encode(ch, ATTRIBUTE_CHAR));
                if line_len > 0 && line_len + token.len() > budget {
                    out.push(b"\r\n");
                    line_len = 0;
                    budget = max;
                }
                out.push(token.as_bytes());
                line_len += token.len();
            }
            stream.discard_read();
            out.drain_into(dst)?;
        }
        stream.finish()?;

        let written = out.finish(dst)?;
        trace!(
            charset = %self.charset,
            bytes_in = consumed,
            bytes_out = written,
            "Parameter value encoded"
        );
        Ok(written)
    }
}

/// RFC 2045 `token` characters.
const fn is_token_char(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x27 | 0x2A | 0x2B | 0x2D | 0x2E | 0x30..=0x39 | 0x41..=0x5A | 0x5E..=0x7E)
}

/// ASCII that can sit in a quoted string: no CR, LF or tab.
const fn is_ascii_text(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x7F)
}

fn quote_if_needed(value: &[u8]) -> String {
    let text: String = value.iter().map(|&b| char::from(b)).collect();
    if !value.is_empty() && value.iter().all(|&b| is_token_char(b)) {
        return text;
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn utf8() -> Rfc2231Encoder {
        Rfc2231Encoder::new("utf-8").unwrap()
    }

    #[test]
    fn test_unreserved_characters_literal() {
        let encoded = utf8().encode_string(b"report-2024_v1.0~final", 0, 0).unwrap();
        assert_eq!(encoded, "report-2024_v1.0~final");
    }

    #[test]
    fn test_percent_encodes_the_rest() {
        let encoded = utf8().encode_string("€ a/b".as_bytes(), 0, 0).unwrap();
        assert_eq!(encoded, "%E2%82%AC%20a%2Fb");
    }

    #[test]
    fn test_segments_split_at_characters() {
        let encoded = utf8().encode_string("€€€€".as_bytes(), 0, 20).unwrap();
        assert_eq!(encoded, "%E2%82%AC%E2%82%AC\r\n%E2%82%AC%E2%82%AC");

        let offset = utf8().encode_string("€€€€".as_bytes(), 5, 20).unwrap();
        assert_eq!(offset, "%E2%82%AC\r\n%E2%82%AC%E2%82%AC\r\n%E2%82%AC");
    }

    #[test]
    fn test_parameter_token_and_quoted() {
        let encoder = utf8();
        assert_eq!(
            encoder.encode_parameter("name", b"file.txt", "", 0).unwrap(),
            "name=file.txt"
        );
        assert_eq!(
            encoder.encode_parameter("name", b"my \"file\".txt", "", 0).unwrap(),
            "name=\"my \\\"file\\\".txt\""
        );
    }

    #[test]
    fn test_parameter_single_encoded_line() {
        let encoded = utf8()
            .encode_parameter("filename", "€.pdf".as_bytes(), "en", 0)
            .unwrap();
        assert_eq!(encoded, "filename*=utf-8'en'%E2%82%AC.pdf");
    }

    #[test]
    fn test_parameter_continuations() {
        let value = "Prüfbericht über die Qualität der Übertragung.pdf";
        let encoded = utf8()
            .encode_parameter("filename", value.as_bytes(), "de", 0)
            .unwrap();
        let lines: Vec<&str> = encoded.split(";\r\n ").collect();
        assert!(lines.len() > 1);
        assert!(lines[0].starts_with("filename*0*=utf-8'de'Pr%C3%BC"));
        for (i, line) in lines.iter().enumerate() {
            assert!(line.starts_with(&format!("filename*{i}*=")));
            assert!(line.len() <= 78);
        }
    }

    #[test]
    fn test_long_ascii_value_is_encoded() {
        let value = "x".repeat(120);
        let encoded = utf8().encode_parameter("name", value.as_bytes(), "", 0).unwrap();
        assert!(encoded.starts_with("name*0*=utf-8''xxx"));
        assert!(encoded.contains(";\r\n name*1*="));
    }
}
