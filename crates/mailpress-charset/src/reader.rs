//! Byte classifiers for individual charsets.
//!
//! A [`CharsetReader`] looks at the bytes buffered for the next character and
//! decides whether they already form a complete character, whether more bytes
//! are needed, or whether the sequence can never be valid. Readers hold no
//! per-stream state, so one instance can be shared by any number of streams.

use std::fmt;

/// Outcome of classifying a buffered byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The first `n` buffered bytes form one complete character.
    Valid(usize),
    /// The prefix is valid so far but `n` more bytes are required.
    NeedMore(usize),
    /// The prefix can never start a valid character.
    Invalid,
}

/// Per-charset byte classifier.
pub trait CharsetReader: fmt::Debug + Send + Sync {
    /// Number of bytes to buffer before the first classification attempt.
    fn initial_byte_count(&self) -> usize;

    /// Classifies the bytes buffered for the next character.
    ///
    /// The result depends on `buffered` alone, never on stream position.
    fn classify(&self, buffered: &[u8]) -> Classification;

    /// Width in bytes of every character, when the charset is fixed-width.
    fn fixed_width(&self) -> Option<usize> {
        None
    }
}

/// Reader for charsets where every character has the same byte width.
///
/// Used for single-byte charsets as well as UCS-2/UTF-16 (two bytes) and
/// UCS-4/UTF-32 (four bytes). Surrogate pairs are not recognized; each
/// two-byte unit counts as one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidthReader {
    width: usize,
}

impl FixedWidthReader {
    /// Creates a reader for characters of `width` bytes. A zero width is
    /// treated as one.
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self {
            width: if width == 0 { 1 } else { width },
        }
    }

    /// Returns the character width in bytes.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }
}

impl CharsetReader for FixedWidthReader {
    fn initial_byte_count(&self) -> usize {
        self.width
    }

    fn classify(&self, buffered: &[u8]) -> Classification {
        if buffered.len() >= self.width {
            Classification::Valid(self.width)
        } else {
            Classification::NeedMore(self.width - buffered.len())
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        Some(self.width)
    }
}

/// Reader for US-ASCII, which rejects any byte with the high bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsAsciiReader;

impl CharsetReader for UsAsciiReader {
    fn initial_byte_count(&self) -> usize {
        1
    }

    fn classify(&self, buffered: &[u8]) -> Classification {
        match buffered.first() {
            None => Classification::NeedMore(1),
            Some(byte) if byte.is_ascii() => Classification::Valid(1),
            Some(_) => Classification::Invalid,
        }
    }

    fn fixed_width(&self) -> Option<usize> {
        Some(1)
    }
}

/// Reader for UTF-8.
///
/// By default the reader accepts the original 1–6 byte form of UTF-8 (lead
/// bytes up to `0xFD`), which is what older mail archives contain.
/// [`Utf8Reader::rfc3629`] restricts it to the modern 4-byte maximum and
/// rejects the lead bytes that can only start overlong or out-of-range
/// sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Utf8Reader {
    strict: bool,
}

impl Utf8Reader {
    /// Creates a reader accepting legacy 5 and 6 byte sequences.
    #[must_use]
    pub const fn legacy() -> Self {
        Self { strict: false }
    }

    /// Creates a reader limited to RFC 3629 sequences.
    #[must_use]
    pub const fn rfc3629() -> Self {
        Self { strict: true }
    }

    /// Returns true if the reader only accepts RFC 3629 sequences.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Expected sequence length for a lead byte, or `None` if the byte
    /// cannot start a character.
    const fn sequence_len(&self, lead: u8) -> Option<usize> {
        match lead {
            0x00..=0x7F => Some(1),
            0xC0 | 0xC1 | 0xF5..=0xF7 if self.strict => None,
            0xC0..=0xDF => Some(2),
            0xE0..=0xEF => Some(3),
            0xF0..=0xF7 => Some(4),
            0xF8..=0xFB if !self.strict => Some(5),
            0xFC | 0xFD if !self.strict => Some(6),
            _ => None,
        }
    }
}

impl CharsetReader for Utf8Reader {
    fn initial_byte_count(&self) -> usize {
        1
    }

    fn classify(&self, buffered: &[u8]) -> Classification {
        let Some(&lead) = buffered.first() else {
            return Classification::NeedMore(1);
        };
        let Some(len) = self.sequence_len(lead) else {
            return Classification::Invalid;
        };

        let seen = buffered.len().min(len);
        if buffered[1..seen].iter().any(|b| b & 0xC0 != 0x80) {
            return Classification::Invalid;
        }

        if buffered.len() < len {
            Classification::NeedMore(len - buffered.len())
        } else {
            Classification::Valid(len)
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_needs_full_unit() {
        let reader = FixedWidthReader::new(2);
        assert_eq!(reader.initial_byte_count(), 2);
        assert_eq!(reader.classify(&[0x00]), Classification::NeedMore(1));
        assert_eq!(reader.classify(&[0x00, 0x41]), Classification::Valid(2));
        assert_eq!(reader.fixed_width(), Some(2));
    }

    #[test]
    fn test_fixed_width_zero_is_one() {
        assert_eq!(FixedWidthReader::new(0).width(), 1);
    }

    #[test]
    fn test_us_ascii() {
        let reader = UsAsciiReader;
        assert_eq!(reader.classify(b"A"), Classification::Valid(1));
        assert_eq!(reader.classify(&[0x7F]), Classification::Valid(1));
        assert_eq!(reader.classify(&[0x80]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xFF]), Classification::Invalid);
    }

    #[test]
    fn test_utf8_single_byte() {
        let reader = Utf8Reader::legacy();
        assert_eq!(reader.classify(b"a"), Classification::Valid(1));
    }

    #[test]
    fn test_utf8_euro_sign() {
        let reader = Utf8Reader::legacy();
        assert_eq!(reader.classify(&[0xE2]), Classification::NeedMore(2));
        assert_eq!(reader.classify(&[0xE2, 0x82]), Classification::NeedMore(1));
        assert_eq!(
            reader.classify(&[0xE2, 0x82, 0xAC]),
            Classification::Valid(3)
        );
    }

    #[test]
    fn test_utf8_bad_continuation() {
        let reader = Utf8Reader::legacy();
        assert_eq!(reader.classify(&[0xE2, 0x41]), Classification::Invalid);
        assert_eq!(
            reader.classify(&[0xE2, 0x82, 0xC0]),
            Classification::Invalid
        );
    }

    #[test]
    fn test_utf8_stray_continuation_lead() {
        let reader = Utf8Reader::legacy();
        assert_eq!(reader.classify(&[0x80]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xBF]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xFE]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xFF]), Classification::Invalid);
    }

    #[test]
    fn test_utf8_legacy_six_byte_form() {
        let reader = Utf8Reader::legacy();
        assert_eq!(reader.classify(&[0xFC]), Classification::NeedMore(5));
        assert_eq!(
            reader.classify(&[0xFC, 0x84, 0x80, 0x80, 0x80, 0x80]),
            Classification::Valid(6)
        );
        assert_eq!(reader.classify(&[0xF8]), Classification::NeedMore(4));
    }

    #[test]
    fn test_utf8_strict_rejects_extended_forms() {
        let reader = Utf8Reader::rfc3629();
        assert!(reader.is_strict());
        assert_eq!(reader.classify(&[0xFC]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xF8]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xC0]), Classification::Invalid);
        assert_eq!(reader.classify(&[0xF5]), Classification::Invalid);
        assert_eq!(
            reader.classify(&[0xF0, 0x9F, 0x98, 0x80]),
            Classification::Valid(4)
        );
    }
}
