//! Transfer decoding.
//!
//! The inverse of the body encoders, used to read content back and to
//! verify what the encoders produce.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    STANDARD.decode(compact).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// Soft line breaks (`=` followed by CRLF or LF) are removed and `=XX`
/// escapes are resolved in either letter case.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(byte) = bytes.next() {
        if byte != b'=' {
            result.push(byte);
            continue;
        }

        // Soft line break
        if bytes.next_if_eq(&b'\r').is_some() {
            if bytes.next_if_eq(&b'\n').is_some() {
                continue;
            }
            return Err(Error::InvalidEncoding("Bare CR after '='".to_string()));
        }
        if bytes.next_if_eq(&b'\n').is_some() {
            continue;
        }

        match (bytes.next(), bytes.next()) {
            (Some(high), Some(low)) => result.push(hex_pair(high, low)?),
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

fn hex_pair(high: u8, low: u8) -> Result<u8> {
    let digit = |b: u8| {
        char::from(b)
            .to_digit(16)
            .ok_or_else(|| Error::InvalidEncoding(format!("Invalid hex: {}", char::from(b))))
    };
    let value = (digit(high)? << 4) | digit(low)?;
    u8::try_from(value).map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
        assert_eq!(decode_base64("SGVs\r\nbG8=").unwrap(), b"Hello");
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(decode_quoted_printable("H=C3=A9llo").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable("caf=e9").unwrap(), b"caf\xE9");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable("Hello=\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable("a\r\nb").unwrap(), b"a\r\nb");
    }

    #[test]
    fn test_quoted_printable_invalid() {
        assert!(decode_quoted_printable("abc=").is_err());
        assert!(decode_quoted_printable("abc=4").is_err());
        assert!(decode_quoted_printable("abc=ZZ").is_err());
    }
}
