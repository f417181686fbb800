//! # mailpress-charset
//!
//! Charset-aware character streams for MIME content encoding.
//!
//! Encoders that wrap lines (Quoted-Printable, RFC 2231, RFC 2047) must never
//! break a line in the middle of a multi-byte character. This crate groups raw
//! bytes into characters without decoding them, so encoders can walk content
//! one character at a time and still reproduce the exact input bytes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpress_charset::CharacterStream;
//!
//! let mut stream = CharacterStream::new("utf-8")?;
//! stream.import_string("a€b")?;
//!
//! assert_eq!(stream.len(), 3);
//! assert_eq!(stream.read_bytes(2).as_deref(), Some("a€".as_bytes()));
//! ```
//!
//! ## Charsets
//!
//! [`CharsetReaderFactory`] resolves names such as `utf-8`, `iso-8859-15`,
//! `latin1`, `windows-1252`, `koi8-r` or `utf-16` to a [`CharsetReader`].
//! Unknown names are rejected with [`Error::UnsupportedCharset`] instead of
//! being guessed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod factory;
mod reader;
mod stream;

pub use error::{Error, Result};
pub use factory::{CharsetKind, CharsetReaderFactory, FactoryConfig};
pub use reader::{CharsetReader, Classification, FixedWidthReader, UsAsciiReader, Utf8Reader};
pub use stream::{CharacterStream, CharsetBinding, READ_CHUNK_SIZE};
