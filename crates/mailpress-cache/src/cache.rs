//! Shared cache handle.

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;

use tracing::trace;

use crate::backend::{CacheBackend, DiskBackend, MemoryBackend, NullBackend, WriteMode};
use crate::config::{BackendKind, CacheConfig, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::input_stream::CacheInputStream;

/// Content cache keyed by `(namespace, item)`.
///
/// Cloning is cheap and every clone talks to the same backend. The handle is
/// single-threaded (`!Send`); concurrent message builders use one cache
/// each.
///
/// Streaming import and export move at most one chunk through memory at a
/// time. [`set_string`](Self::set_string) and
/// [`get_string`](Self::get_string) hold the whole value and are meant for
/// small entries.
#[derive(Debug, Clone)]
pub struct ContentCache {
    backend: Rc<RefCell<Box<dyn CacheBackend>>>,
    chunk_size: usize,
}

impl ContentCache {
    /// Creates a cache over the given backend.
    #[must_use]
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Rc::new(RefCell::new(Box::new(backend))),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Creates an in-memory cache.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Creates a cache backed by temporary files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the scratch directory cannot be created.
    pub fn disk() -> Result<Self> {
        Ok(Self::new(DiskBackend::new()?))
    }

    /// Creates a cache that stores nothing.
    #[must_use]
    pub fn null() -> Self {
        Self::new(NullBackend)
    }

    /// Creates a cache from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero chunk size and [`Error::Setup`]
    /// if the disk backend cannot create its directory.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }
        let cache = match config.backend {
            BackendKind::Memory => Self::memory(),
            BackendKind::Null => Self::null(),
            BackendKind::Disk => match &config.disk_root {
                Some(root) => Self::new(DiskBackend::in_dir(root)?),
                None => Self::disk()?,
            },
        };
        Ok(cache.with_chunk_size(config.chunk_size))
    }

    /// Sets the streaming chunk size. Zero is treated as one.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Returns the streaming chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.borrow().kind()
    }

    /// Stores `data` under the key, replacing or extending existing content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails.
    pub fn set_string(
        &self,
        namespace: &str,
        item: &str,
        data: impl AsRef<[u8]>,
        mode: WriteMode,
    ) -> Result<()> {
        let mut backend = self.backend.borrow_mut();
        backend
            .open_writer(namespace, item, mode)
            .and_then(|mut writer| writer.write_all(data.as_ref()))
            .map_err(|e| Error::io(namespace, item, e))
    }

    /// Returns the whole content of an entry, or `None` if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails.
    pub fn get_string(&self, namespace: &str, item: &str) -> Result<Option<Vec<u8>>> {
        let Some(mut reader) = self.reader(namespace, item)? else {
            return Ok(None);
        };
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|e| Error::io(namespace, item, e))?;
        Ok(Some(out))
    }

    /// Drains `src` into an entry one chunk at a time.
    ///
    /// Returns the number of bytes imported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] if reading `src` fails and [`Error::Io`] if
    /// the backend fails.
    pub fn import_from_stream<R: Read + ?Sized>(
        &self,
        namespace: &str,
        item: &str,
        src: &mut R,
        mode: WriteMode,
    ) -> Result<u64> {
        let mut backend = self.backend.borrow_mut();
        let mut writer = backend
            .open_writer(namespace, item, mode)
            .map_err(|e| Error::io(namespace, item, e))?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Stream(e)),
            };
            writer
                .write_all(&buf[..n])
                .map_err(|e| Error::io(namespace, item, e))?;
            total += n as u64;
        }
        writer.flush().map_err(|e| Error::io(namespace, item, e))?;

        trace!(namespace, item, bytes = total, "Imported cache entry");
        Ok(total)
    }

    /// Copies an entry into `dst` one chunk at a time.
    ///
    /// Returns the number of bytes exported, or `None` if the entry does not
    /// exist. The backend is not borrowed while `dst` is written, so `dst`
    /// may be a [`CacheInputStream`] of this same cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails and [`Error::Stream`] if
    /// writing `dst` fails.
    pub fn export_to_stream<W: Write + ?Sized>(
        &self,
        namespace: &str,
        item: &str,
        dst: &mut W,
    ) -> Result<Option<u64>> {
        let Some(mut reader) = self.reader(namespace, item)? else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(namespace, item, e)),
            };
            dst.write_all(&buf[..n])?;
            total += n as u64;
        }

        trace!(namespace, item, bytes = total, "Exported cache entry");
        Ok(Some(total))
    }

    /// Opens an independent reader over an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails.
    pub fn reader(&self, namespace: &str, item: &str) -> Result<Option<Box<dyn Read>>> {
        self.backend
            .borrow_mut()
            .open_reader(namespace, item)
            .map_err(|e| Error::io(namespace, item, e))
    }

    /// Returns true if the entry exists.
    #[must_use]
    pub fn has_key(&self, namespace: &str, item: &str) -> bool {
        self.backend.borrow().has_key(namespace, item)
    }

    /// Removes one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails.
    pub fn clear_key(&self, namespace: &str, item: &str) -> Result<()> {
        self.backend
            .borrow_mut()
            .clear_key(namespace, item)
            .map_err(|e| Error::io(namespace, item, e))
    }

    /// Removes every entry of a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails.
    pub fn clear_all(&self, namespace: &str) -> Result<()> {
        self.backend
            .borrow_mut()
            .clear_all(namespace)
            .map_err(|e| Error::io(namespace, "*", e))
    }

    /// Returns a sink appending everything written to it to the entry.
    #[must_use]
    pub fn input_stream_for(&self, namespace: &str, item: &str) -> CacheInputStream {
        CacheInputStream::new(self.clone(), namespace, item)
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

    fn caches() -> Vec<ContentCache> {
        vec![ContentCache::memory(), ContentCache::disk().unwrap()]
    }

    #[test]
    fn test_namespaces_are_partitioned() {
        for cache in caches() {
            cache.set_string("ns1", "foo", "a", WriteMode::Write).unwrap();
            cache.set_string("ns2", "foo", "b", WriteMode::Write).unwrap();
            assert_eq!(cache.get_string("ns1", "foo").unwrap().unwrap(), b"a");
            assert_eq!(cache.get_string("ns2", "foo").unwrap().unwrap(), b"b");
        }
    }

    #[test]
    fn test_append_accumulates() {
        for cache in caches() {
            cache.set_string("ns", "k", "test", WriteMode::Write).unwrap();
            cache.set_string("ns", "k", "ing", WriteMode::Append).unwrap();
            assert_eq!(cache.get_string("ns", "k").unwrap().unwrap(), b"testing");
        }
    }

    #[test]
    fn test_write_replaces() {
        for cache in caches() {
            cache.set_string("ns", "k", "first", WriteMode::Write).unwrap();
            cache.set_string("ns", "k", "2nd", WriteMode::Write).unwrap();
            assert_eq!(cache.get_string("ns", "k").unwrap().unwrap(), b"2nd");
        }
    }

    #[test]
    fn test_miss_is_none() {
        for cache in caches() {
            assert!(cache.get_string("ns", "missing").unwrap().is_none());
            let mut out = Vec::new();
            assert!(
                cache
                    .export_to_stream("ns", "missing", &mut out)
                    .unwrap()
                    .is_none()
            );
            assert!(!cache.has_key("ns", "missing"));
        }
    }

    #[test]
    fn test_empty_entry_is_not_a_miss() {
        for cache in caches() {
            cache.set_string("ns", "empty", "", WriteMode::Write).unwrap();
            assert!(cache.has_key("ns", "empty"));
            assert_eq!(cache.get_string("ns", "empty").unwrap(), Some(Vec::new()));
        }
    }

    #[test]
    fn test_clear_key_and_clear_all() {
        for cache in caches() {
            cache.set_string("ns", "a", "1", WriteMode::Write).unwrap();
            cache.set_string("ns", "b", "2", WriteMode::Write).unwrap();
            cache.set_string("other", "a", "3", WriteMode::Write).unwrap();

            cache.clear_key("ns", "a").unwrap();
            assert!(!cache.has_key("ns", "a"));
            assert!(cache.has_key("ns", "b"));

            cache.clear_all("ns").unwrap();
            assert!(!cache.has_key("ns", "b"));
            assert!(cache.has_key("other", "a"));
        }
    }

    #[test]
    fn test_import_export_roundtrip() {
        for cache in caches() {
            let data: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
            let imported = cache
                .import_from_stream("ns", "body", &mut data.as_slice(), WriteMode::Write)
                .unwrap();
            assert_eq!(imported, data.len() as u64);

            let mut out = Vec::new();
            let exported = cache.export_to_stream("ns", "body", &mut out).unwrap();
            assert_eq!(exported, Some(data.len() as u64));
            assert_eq!(out, data);
        }
    }

    #[test]
    fn test_export_into_same_cache() {
        for cache in caches() {
            cache.set_string("ns", "src", "copy me", WriteMode::Write).unwrap();
            let mut sink = cache.input_stream_for("ns", "dst");
            cache.export_to_stream("ns", "src", &mut sink).unwrap();
            assert_eq!(cache.get_string("ns", "dst").unwrap().unwrap(), b"copy me");
        }
    }

    #[test]
    fn test_null_cache() {
        let cache = ContentCache::null();
        assert_eq!(cache.kind(), BackendKind::Null);
        cache.set_string("ns", "k", "data", WriteMode::Write).unwrap();
        assert!(!cache.has_key("ns", "k"));
        assert!(cache.get_string("ns", "k").unwrap().is_none());
        let imported = cache
            .import_from_stream("ns", "k", &mut &b"abc"[..], WriteMode::Append)
            .unwrap();
        assert_eq!(imported, 3);
        assert!(cache.get_string("ns", "k").unwrap().is_none());
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig::builder()
            .backend(BackendKind::Disk)
            .chunk_size(512)
            .build();
        let cache = ContentCache::from_config(&config).unwrap();
        assert_eq!(cache.kind(), BackendKind::Disk);
        assert_eq!(cache.chunk_size(), 512);

        let bad = CacheConfig::builder().chunk_size(0).build();
        assert!(matches!(
            ContentCache::from_config(&bad),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_clones_share_backend() {
        let cache = ContentCache::memory();
        let other = cache.clone();
        other.set_string("ns", "k", "shared", WriteMode::Write).unwrap();
        assert_eq!(cache.get_string("ns", "k").unwrap().unwrap(), b"shared");
    }
}
