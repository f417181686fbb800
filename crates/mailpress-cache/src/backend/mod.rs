//! Storage backends.
//!
//! A backend stores the bytes of each `(namespace, item)` entry. It only
//! hands out writers and readers; chunking and error context live in
//! [`ContentCache`](crate::ContentCache).

use std::fmt;
use std::io::{self, Read, Write};

use crate::config::BackendKind;

mod disk;
mod memory;
mod null;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;
pub use null::NullBackend;

/// How a write treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing content.
    Write,
    /// Extend existing content.
    Append,
}

/// Storage for cache entries.
pub trait CacheBackend: fmt::Debug {
    /// Returns the backend kind.
    fn kind(&self) -> BackendKind;

    /// Opens a writer for an entry, creating it if needed.
    ///
    /// With [`WriteMode::Write`] existing content is dropped before the
    /// writer is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be opened.
    fn open_writer(
        &mut self,
        namespace: &str,
        item: &str,
        mode: WriteMode,
    ) -> io::Result<Box<dyn Write + '_>>;

    /// Opens an independent reader over an entry's current content.
    ///
    /// The reader does not borrow the backend. Returns `None` if the entry
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be opened.
    fn open_reader(&mut self, namespace: &str, item: &str) -> io::Result<Option<Box<dyn Read>>>;

    /// Returns true if the entry exists.
    fn has_key(&self, namespace: &str, item: &str) -> bool;

    /// Removes one entry. Missing entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be removed.
    fn clear_key(&mut self, namespace: &str, item: &str) -> io::Result<()>;

    /// Removes every entry of a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be removed.
    fn clear_all(&mut self, namespace: &str) -> io::Result<()>;
}
