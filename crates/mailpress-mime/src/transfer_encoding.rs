//! `Content-Transfer-Encoding` values and the encoders behind them.

use std::fmt;
use std::str::FromStr;

use mailpress_charset::CharsetReaderFactory;

use crate::decode::{decode_base64, decode_quoted_printable};
use crate::encoder::{Base64Encoder, PlainEncoder, QpEncoder, QpOptions, TransferEncoder};
use crate::error::{Error, Result};

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a header value leniently: anything unknown is `7bit`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Returns the header token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Binary => "binary",
        }
    }

    /// Builds the encoder for this transfer encoding.
    ///
    /// `charset` only matters for Quoted-Printable, which must know where
    /// characters begin and end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Charset`] if the charset is unknown.
    pub fn encoder(
        self,
        factory: &CharsetReaderFactory,
        charset: &str,
        options: QpOptions,
    ) -> Result<Box<dyn TransferEncoder>> {
        Ok(match self {
            Self::SevenBit => Box::new(PlainEncoder::seven_bit().canonical(options.canonical)),
            Self::EightBit => Box::new(PlainEncoder::eight_bit().canonical(options.canonical)),
            Self::Binary => Box::new(PlainEncoder::binary()),
            Self::Base64 => Box::new(Base64Encoder::new()),
            Self::QuotedPrintable => Box::new(
                QpEncoder::with_factory(factory.clone(), charset)?.with_options(options),
            ),
        })
    }

    /// Decodes a body written in this transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(self, body: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(body)),
            Self::QuotedPrintable => decode_quoted_printable(&String::from_utf8_lossy(body)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(body.to_vec()),
        }
    }
}

impl FromStr for TransferEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "base64" => Ok(Self::Base64),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "binary" => Ok(Self::Binary),
            other => Err(Error::UnknownTransferEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for encoding in [
            TransferEncoding::SevenBit,
            TransferEncoding::EightBit,
            TransferEncoding::Base64,
            TransferEncoding::QuotedPrintable,
            TransferEncoding::Binary,
        ] {
            assert_eq!(TransferEncoding::parse(&encoding.to_string()), encoding);
        }
        assert_eq!(TransferEncoding::parse(" Base64 "), TransferEncoding::Base64);
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "x-uuencode".parse::<TransferEncoding>().unwrap_err();
        assert!(matches!(err, Error::UnknownTransferEncoding(ref t) if t == "x-uuencode"));
    }

    #[test]
    fn test_encoder_names_match() {
        let factory = CharsetReaderFactory::new();
        for encoding in [
            TransferEncoding::SevenBit,
            TransferEncoding::EightBit,
            TransferEncoding::Base64,
            TransferEncoding::QuotedPrintable,
            TransferEncoding::Binary,
        ] {
            let encoder = encoding.encoder(&factory, "utf-8", QpOptions::new()).unwrap();
            assert_eq!(encoder.name(), encoding.as_str());
        }
    }

    #[test]
    fn test_encode_then_decode() {
        let factory = CharsetReaderFactory::new();
        let body = "Grüße, 世界\r\n".repeat(20);
        for encoding in [TransferEncoding::Base64, TransferEncoding::QuotedPrintable] {
            let encoder = encoding.encoder(&factory, "utf-8", QpOptions::new()).unwrap();
            let encoded = encoder.encode_bytes(body.as_bytes(), 0, 0).unwrap();
            assert_eq!(encoding.decode(&encoded).unwrap(), body.as_bytes());
        }
    }

    #[test]
    fn test_qp_encoder_needs_known_charset() {
        let factory = CharsetReaderFactory::new();
        let result = TransferEncoding::QuotedPrintable.encoder(&factory, "x-klingon", QpOptions::new());
        assert!(matches!(result, Err(Error::Charset(_))));
    }
}
