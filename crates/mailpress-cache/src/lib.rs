//! # mailpress-cache
//!
//! Bounded-memory key/value cache for MIME entity bodies.
//!
//! Entries are addressed by a `(namespace, item)` pair: the namespace scopes
//! one message or entity, the item one named resource such as `body`.
//! Bodies can be streamed in and out chunk by chunk, so a multi-gigabyte
//! attachment never has to sit in memory as a whole.
//!
//! ## Backends
//!
//! - [`MemoryBackend`]: growable buffers, for small messages
//! - [`DiskBackend`]: one temporary file per entry
//! - [`NullBackend`]: stores nothing, disables caching
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailpress_cache::{ContentCache, WriteMode};
//! use std::fs::File;
//!
//! let cache = ContentCache::disk()?;
//! let mut attachment = File::open("video.mp4")?;
//! cache.import_from_stream("msg-1", "body", &mut attachment, WriteMode::Write)?;
//!
//! let mut out = Vec::new();
//! cache.export_to_stream("msg-1", "body", &mut out)?;
//! cache.clear_all("msg-1")?;
//! ```
//!
//! ### Incremental producers
//!
//! ```ignore
//! use std::io::Write;
//!
//! let mut sink = cache.input_stream_for("msg-1", "encoded");
//! sink.write_all(b"SGVsbG8=")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod backend;
mod cache;
mod config;
mod error;
mod input_stream;

pub use backend::{CacheBackend, DiskBackend, MemoryBackend, NullBackend, WriteMode};
pub use cache::ContentCache;
pub use config::{BackendKind, CacheConfig, CacheConfigBuilder, DEFAULT_CHUNK_SIZE};
pub use error::{Error, Result};
pub use input_stream::CacheInputStream;
