//! Charset name resolution.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::reader::{CharsetReader, FixedWidthReader, UsAsciiReader, Utf8Reader};

/// Reader family a charset name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetKind {
    /// UTF-8.
    Utf8,
    /// US-ASCII.
    UsAscii,
    /// Fixed-width charset with the given byte width.
    FixedWidth(usize),
}

/// Factory configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactoryConfig {
    /// Resolve UTF-8 to the RFC 3629 reader instead of the legacy 6-byte one.
    pub strict_utf8: bool,
}

/// Resolves charset names to [`CharsetReader`] instances.
#[derive(Debug, Clone, Default)]
pub struct CharsetReaderFactory {
    config: FactoryConfig,
}

impl CharsetReaderFactory {
    /// Creates a factory with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with the given configuration.
    #[must_use]
    pub const fn with_config(config: FactoryConfig) -> Self {
        Self { config }
    }

    /// Returns the factory configuration.
    #[must_use]
    pub const fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Resolves a charset name to a reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCharset`] if the name is not recognized.
    pub fn resolve(&self, charset: &str) -> Result<Arc<dyn CharsetReader>> {
        let kind = Self::kind_of(charset)
            .ok_or_else(|| Error::UnsupportedCharset(charset.to_string()))?;
        debug!(charset, ?kind, "Resolved charset reader");

        let reader: Arc<dyn CharsetReader> = match kind {
            CharsetKind::Utf8 if self.config.strict_utf8 => Arc::new(Utf8Reader::rfc3629()),
            CharsetKind::Utf8 => Arc::new(Utf8Reader::legacy()),
            CharsetKind::UsAscii => Arc::new(UsAsciiReader),
            CharsetKind::FixedWidth(width) => Arc::new(FixedWidthReader::new(width)),
        };
        Ok(reader)
    }

    /// Returns the reader family for a charset name, if it is known.
    ///
    /// Matching ignores ASCII case and surrounding whitespace.
    #[must_use]
    pub fn kind_of(charset: &str) -> Option<CharsetKind> {
        let name = charset.trim().to_ascii_lowercase();

        match name.as_str() {
            "utf8" | "utf-8" => return Some(CharsetKind::Utf8),
            "ascii" | "us-ascii" => return Some(CharsetKind::UsAscii),
            "ansi" | "macintosh" | "mik" | "cork" | "t1" | "viscii" | "iscii" | "koi7"
            | "koi-7" => return Some(CharsetKind::FixedWidth(1)),
            _ => {}
        }

        if is_iso_8859(&name)
            || is_numbered(&name, "latin")
            || is_numbered(&name, "l")
            || is_numbered(&name, "cp")
            || is_windows_125x(&name)
            || is_koi8(&name)
        {
            return Some(CharsetKind::FixedWidth(1));
        }

        if is_unicode_form(&name, "ucs", "2") || is_unicode_form(&name, "utf", "16") {
            return Some(CharsetKind::FixedWidth(2));
        }
        if is_unicode_form(&name, "ucs", "4") || is_unicode_form(&name, "utf", "32") {
            return Some(CharsetKind::FixedWidth(4));
        }

        None
    }
}

/// Strips one optional `-` or `_` separator.
fn skip_separator(s: &str) -> &str {
    s.strip_prefix(['-', '_']).unwrap_or(s)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `prefix`, optional separator, digits: `latin1`, `latin-2`, `cp1252`, `l9`.
fn is_numbered(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| is_digits(skip_separator(rest)))
}

/// `iso-8859-1`, `iso8859_15`, `iec-8859-2`.
fn is_iso_8859(name: &str) -> bool {
    name.strip_prefix("iso")
        .or_else(|| name.strip_prefix("iec"))
        .and_then(|rest| skip_separator(rest).strip_prefix("8859"))
        .is_some_and(|rest| is_digits(skip_separator(rest)))
}

/// `windows-1250` through `windows-1259`.
fn is_windows_125x(name: &str) -> bool {
    name.strip_prefix("windows")
        .and_then(|rest| skip_separator(rest).strip_prefix("125"))
        .is_some_and(|rest| rest.len() == 1 && is_digits(rest))
}

/// `koi8-r`, `koi8-u`, `koi-8-ru`.
fn is_koi8(name: &str) -> bool {
    name.strip_prefix("koi")
        .and_then(|rest| skip_separator(rest).strip_prefix('8'))
        .is_some_and(|rest| !skip_separator(rest).is_empty())
}

/// `ucs-2`, `utf16`, `utf-16le`, `utf-32-be`.
fn is_unicode_form(name: &str, family: &str, bits: &str) -> bool {
    name.strip_prefix(family)
        .and_then(|rest| skip_separator(rest).strip_prefix(bits))
        .is_some_and(|rest| matches!(skip_separator(rest), "" | "le" | "be"))
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
    use crate::reader::Classification;

    #[test]
    fn test_utf8_aliases() {
        for name in ["utf-8", "UTF-8", "utf8", " Utf-8 "] {
            assert_eq!(CharsetReaderFactory::kind_of(name), Some(CharsetKind::Utf8));
        }
    }

    #[test]
    fn test_single_byte_aliases() {
        for name in [
            "iso-8859-1",
            "ISO-8859-15",
            "iso8859-2",
            "iso_8859_7",
            "latin-1",
            "latin1",
            "l9",
            "windows-1252",
            "Windows1250",
            "cp-850",
            "cp1251",
            "koi8-r",
            "KOI8-U",
            "koi7",
            "macintosh",
            "viscii",
        ] {
            assert_eq!(
                CharsetReaderFactory::kind_of(name),
                Some(CharsetKind::FixedWidth(1)),
                "{name}"
            );
        }
    }

    #[test]
    fn test_wide_charsets() {
        assert_eq!(
            CharsetReaderFactory::kind_of("utf-16"),
            Some(CharsetKind::FixedWidth(2))
        );
        assert_eq!(
            CharsetReaderFactory::kind_of("UCS-2"),
            Some(CharsetKind::FixedWidth(2))
        );
        assert_eq!(
            CharsetReaderFactory::kind_of("utf-16le"),
            Some(CharsetKind::FixedWidth(2))
        );
        assert_eq!(
            CharsetReaderFactory::kind_of("utf-32"),
            Some(CharsetKind::FixedWidth(4))
        );
        assert_eq!(
            CharsetReaderFactory::kind_of("ucs4"),
            Some(CharsetKind::FixedWidth(4))
        );
    }

    #[test]
    fn test_ascii() {
        assert_eq!(
            CharsetReaderFactory::kind_of("us-ascii"),
            Some(CharsetKind::UsAscii)
        );
        assert_eq!(
            CharsetReaderFactory::kind_of("ASCII"),
            Some(CharsetKind::UsAscii)
        );
    }

    #[test]
    fn test_unknown_charsets_rejected() {
        for name in ["", "shift_jis", "windows-874", "iso-8859", "utf-7", "koi8", "big5"] {
            assert_eq!(CharsetReaderFactory::kind_of(name), None, "{name}");
        }

        let factory = CharsetReaderFactory::new();
        let err = factory.resolve("big5").unwrap_err();
        assert!(matches!(err, Error::UnsupportedCharset(name) if name == "big5"));
    }

    #[test]
    fn test_strict_utf8_config() {
        let factory = CharsetReaderFactory::with_config(FactoryConfig { strict_utf8: true });
        let reader = factory.resolve("utf-8").unwrap();
        assert_eq!(reader.classify(&[0xFC]), Classification::Invalid);

        let reader = CharsetReaderFactory::new().resolve("utf-8").unwrap();
        assert_eq!(reader.classify(&[0xFC]), Classification::NeedMore(5));
    }
}
