//! RFC 2047 encoded words for header text.
//!
//! Format: `=?charset?encoding?encoded-text?=`, where the encoding is `B`
//! (Base64) or `Q` (a Quoted-Printable variant with `_` for space).

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailpress_charset::{CharacterStream, CharsetKind, CharsetReader, CharsetReaderFactory};

use crate::decode::{decode_base64, decode_quoted_printable};
use crate::encoder::hex_escape;
use crate::error::{Error, Result};

/// Maximum length of one encoded word, delimiters included.
pub const ENCODED_WORD_MAX_LENGTH: usize = 75;

/// Encoding applied to the text inside an encoded word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WordScheme {
    /// Base64 (`B`).
    #[default]
    Base64,
    /// Quoted-Printable variant (`Q`).
    Q,
}

impl WordScheme {
    /// Returns the letter naming this scheme inside a word.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Base64 => 'B',
            Self::Q => 'Q',
        }
    }

    fn encoded_len(self, raw_len: usize, q_len: usize) -> usize {
        match self {
            Self::Base64 => raw_len.div_ceil(3) * 4,
            Self::Q => q_len,
        }
    }
}

/// Encodes header text as a sequence of encoded words.
///
/// Words are split between characters, never inside one, and joined with a
/// folding line break.
#[derive(Debug, Clone)]
pub struct EncodedWordEncoder {
    charset: String,
    reader: Arc<dyn CharsetReader>,
    scheme: WordScheme,
}

impl EncodedWordEncoder {
    /// Creates a `B` encoder for text in `charset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`] if the charset is unknown.
    pub fn new(charset: &str) -> Result<Self> {
        Self::with_factory(&CharsetReaderFactory::new(), charset)
    }

    /// Creates an encoder resolving `charset` through `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`] if the charset is unknown.
    pub fn with_factory(factory: &CharsetReaderFactory, charset: &str) -> Result<Self> {
        Ok(Self {
            charset: charset.to_string(),
            reader: factory.resolve(charset)?,
            scheme: WordScheme::default(),
        })
    }

    /// Selects the word encoding.
    #[must_use]
    pub fn with_scheme(mut self, scheme: WordScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Returns the charset of the text being encoded.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Returns the word encoding.
    #[must_use]
    pub const fn scheme(&self) -> WordScheme {
        self.scheme
    }

    /// Encodes `text` only if it cannot appear in a header as is.
    ///
    /// Printable ASCII without `=` or `?` is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`] if `text` is not valid in the charset.
    pub fn encode_if_needed(&self, text: &[u8], first_line_offset: usize) -> Result<String> {
        if text
            .iter()
            .all(|&b| matches!(b, b' ' | 0x21..=0x7E) && b != b'=' && b != b'?')
        {
            return Ok(text.iter().map(|&b| char::from(b)).collect());
        }
        self.encode(text, first_line_offset)
    }

    /// Encodes `text` as one or more encoded words.
    ///
    /// The first word leaves room for `first_line_offset` characters
    /// already on the line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`] if `text` is not valid in the charset.
    pub fn encode(&self, text: &[u8], first_line_offset: usize) -> Result<String> {
        let mut stream = CharacterStream::with_reader(&self.charset, Arc::clone(&self.reader));
        stream.import_string(text)?;

        let room = ENCODED_WORD_MAX_LENGTH.saturating_sub(self.charset.len() + 7);
        let mut budget = room.saturating_sub(first_line_offset);
        let mut words = Vec::new();
        let mut raw = Vec::new();
        let mut q_len = 0;

        while let Some(ch) = stream.next_char() {
            let ch_q_len = q_encoded_len(ch);
            let grown = self.scheme.encoded_len(raw.len() + ch.len(), q_len + ch_q_len);
            if !raw.is_empty() && grown > budget {
                words.push(self.word(&raw));
                raw.clear();
                q_len = 0;
                budget = room;
            }
            raw.extend_from_slice(ch);
            q_len += ch_q_len;
        }
        if !raw.is_empty() {
            words.push(self.word(&raw));
        }
        Ok(words.join("\r\n "))
    }

    fn word(&self, raw: &[u8]) -> String {
        let payload = match self.scheme {
            WordScheme::Base64 => STANDARD.encode(raw),
            WordScheme::Q => q_encode(raw),
        };
        format!("=?{}?{}?{payload}?=", self.charset, self.scheme.letter())
    }
}

/// Bytes the `Q` encoding leaves as they are.
const fn is_q_safe(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/')
}

fn q_encoded_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .map(|&b| if is_q_safe(b) || b == b' ' { 1 } else { 3 })
        .sum()
}

fn q_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        if b == b' ' {
            out.push('_');
        } else if is_q_safe(b) {
            out.push(char::from(b));
        } else {
            out.extend(hex_escape(b'=', b).map(char::from));
        }
    }
    out
}

/// Decodes every encoded word in a header value.
///
/// Text outside encoded words is kept; whitespace between two adjacent
/// encoded words is dropped.
///
/// # Errors
///
/// Returns an error if a word has an unknown encoding, invalid payload, or
/// a charset that cannot be converted to text.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = parse_word(candidate)? {
            if !(after_word && before.chars().all(char::is_whitespace)) {
                result.push_str(before);
            }
            result.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            result.push_str(before);
            result.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }
    result.push_str(rest);
    Ok(result)
}

/// Parses the encoded word at the start of `candidate`. Returns the decoded
/// text and the number of bytes consumed, or `None` if it is not a word.
fn parse_word(candidate: &str) -> Result<Option<(String, usize)>> {
    let body = &candidate[2..];
    let Some((charset, rest)) = body.split_once('?') else {
        return Ok(None);
    };
    let Some((encoding, rest)) = rest.split_once('?') else {
        return Ok(None);
    };
    let Some(end) = rest.find("?=") else {
        return Ok(None);
    };
    let payload = &rest[..end];
    if charset.is_empty()
        || encoding.len() != 1
        || charset.contains(char::is_whitespace)
        || payload.contains(char::is_whitespace)
    {
        return Ok(None);
    }

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(payload)?,
        "Q" => decode_quoted_printable(&payload.replace('_', " "))?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };
    let consumed = "=?".len() + charset.len() + 1 + encoding.len() + 1 + end + "?=".len();
    // RFC 2231 allows a language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    Ok(Some((bytes_to_text(charset, bytes)?, consumed)))
}

fn bytes_to_text(charset: &str, bytes: Vec<u8>) -> Result<String> {
    match CharsetReaderFactory::kind_of(charset) {
        Some(CharsetKind::Utf8 | CharsetKind::UsAscii) => String::from_utf8(bytes).map_err(Into::into),
        _ if is_latin1(charset) => Ok(bytes.into_iter().map(char::from).collect()),
        _ => Err(Error::InvalidEncoding(format!(
            "Cannot convert {charset} to text"
        ))),
    }
}

fn is_latin1(charset: &str) -> bool {
    ["iso-8859-1", "iso8859-1", "latin1", "latin-1", "l1"]
        .iter()
        .any(|name| charset.eq_ignore_ascii_case(name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2047_encode() {
        let encoder = EncodedWordEncoder::new("utf-8").unwrap();
        assert_eq!(encoder.encode_if_needed(b"Hello", 0).unwrap(), "Hello");

        let encoded = encoder.encode_if_needed("Héllo".as_bytes(), 0).unwrap();
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_q_scheme() {
        let encoder = EncodedWordEncoder::new("utf-8")
            .unwrap()
            .with_scheme(WordScheme::Q);
        let encoded = encoder.encode("a b€=?".as_bytes(), 0).unwrap();
        assert_eq!(encoded, "=?utf-8?Q?a_b=E2=82=AC=3D=3F?=");
    }

    #[test]
    fn test_long_text_split_into_words() {
        let text = "Grüße aus München, wo das Oktoberfest jedes Jahr Millionen Besucher anzieht";
        for scheme in [WordScheme::Base64, WordScheme::Q] {
            let encoder = EncodedWordEncoder::new("utf-8").unwrap().with_scheme(scheme);
            let encoded = encoder.encode(text.as_bytes(), 9).unwrap();
            let words: Vec<&str> = encoded.split("\r\n ").collect();
            assert!(words.len() > 1);
            assert!(words[0].len() <= ENCODED_WORD_MAX_LENGTH - 9);
            assert!(words.iter().all(|w| w.len() <= ENCODED_WORD_MAX_LENGTH));
            assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
        }
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?=").unwrap(), "Héllo");
        assert_eq!(decode_rfc2047("=?iso-8859-1?q?caf=E9_au_lait?=").unwrap(), "café au lait");
    }

    #[test]
    fn test_rfc2047_mixed_text() {
        let decoded = decode_rfc2047("Re: =?utf-8?Q?caf=C3=A9?= =?utf-8?Q?_cr=C3=A8me?= today").unwrap();
        assert_eq!(decoded, "Re: café crème today");
        assert_eq!(decode_rfc2047("a =? b").unwrap(), "a =? b");
    }

    #[test]
    fn test_rfc2047_errors() {
        assert!(decode_rfc2047("=?utf-8?X?abc?=").is_err());
        assert!(decode_rfc2047("=?x-unknown?B?SGk=?=").is_err());
    }
}
