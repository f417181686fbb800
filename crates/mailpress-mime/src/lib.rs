//! # mailpress-mime
//!
//! Streaming content transfer encoders for email.
//!
//! ## Features
//!
//! - **Body encoders**: Quoted-Printable, Base64, 7bit/8bit/binary
//! - **Header encoders**: RFC 2231 parameters, RFC 2047 encoded words
//! - **Streaming**: every encoder reads and writes in bounded chunks
//! - **Charset aware**: lines never break inside a multi-byte character
//! - **Cached bodies**: encode once, write out many times
//!
//! ## Quick Start
//!
//! ### Encoding a Body
//!
//! ```ignore
//! use mailpress_mime::{QpEncoder, TransferEncoder};
//!
//! let encoder = QpEncoder::new("utf-8")?;
//! let encoded = encoder.encode_string("Grüße".as_bytes(), 0, 0)?;
//! assert_eq!(encoded, "Gr=C3=BC=C3=9Fe");
//! ```
//!
//! ### Streaming an Attachment
//!
//! ```ignore
//! use mailpress_mime::{Base64Encoder, TransferEncoder};
//! use std::fs::File;
//!
//! let mut src = File::open("video.mp4")?;
//! let mut dst = File::create("video.b64")?;
//! Base64Encoder::new().encode_stream(&mut src, &mut dst, 0, 0)?;
//! ```
//!
//! ### Header Parameters
//!
//! ```ignore
//! use mailpress_mime::Rfc2231Encoder;
//!
//! let encoder = Rfc2231Encoder::new("utf-8")?;
//! let param = encoder.encode_parameter("filename", "€ rates.pdf".as_bytes(), "en", 0)?;
//! assert_eq!(param, "filename*=utf-8'en'%E2%82%AC%20rates.pdf");
//! ```
//!
//! ### Cached Bodies
//!
//! ```ignore
//! use mailpress_cache::ContentCache;
//! use mailpress_mime::{CachedBody, QpEncoder};
//!
//! let cache = ContentCache::disk()?;
//! let mut body = CachedBody::new(cache, "part-1", Box::new(QpEncoder::new("utf-8")?));
//! body.set_body_from_stream(&mut File::open("letter.txt")?)?;
//! body.write_to(&mut smtp_data)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod body;
mod decode;
mod encoded_word;
mod encoder;
mod error;
mod transfer_encoding;

pub use body::{CachedBody, ENCODED_ITEM, RAW_ITEM};
pub use decode::{decode_base64, decode_quoted_printable};
pub use encoded_word::{
    ENCODED_WORD_MAX_LENGTH, EncodedWordEncoder, WordScheme, decode_rfc2047,
};
pub use encoder::{
    Base64Encoder, ENCODE_CHUNK_SIZE, HEADER_MAX_LINE_LENGTH, PlainEncoder, QpEncoder, QpOptions,
    RFC2045_MAX_LINE_LENGTH, RFC2231_MAX_LINE_LENGTH, Rfc2231Encoder, SMTP_MAX_LINE_LENGTH,
    TransferEncoder,
};
pub use error::{Error, Result};
pub use transfer_encoding::TransferEncoding;
