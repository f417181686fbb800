//! Push-style sink into a cache entry.

use std::fmt;
use std::io::{self, Write};

use crate::backend::WriteMode;
use crate::cache::ContentCache;

/// Sink that appends every write to one cache entry.
///
/// An optional write-through sink receives the same bytes after they are
/// cached, which lets an encoder fill the cache and the output in one pass.
///
/// Cloning yields a stream bound to the same cache and key but without the
/// write-through sink; [`bind`](Self::bind) points it at another key.
pub struct CacheInputStream {
    cache: ContentCache,
    namespace: String,
    item: String,
    write_through: Option<Box<dyn Write>>,
}

impl CacheInputStream {
    /// Creates a stream appending to `(namespace, item)` of `cache`.
    #[must_use]
    pub fn new(cache: ContentCache, namespace: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            item: item.into(),
            write_through: None,
        }
    }

    /// Rebinds the stream to another entry of the same cache.
    pub fn bind(&mut self, namespace: impl Into<String>, item: impl Into<String>) {
        self.namespace = namespace.into();
        self.item = item.into();
    }

    /// Returns the namespace the stream writes to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the item the stream writes to.
    #[must_use]
    pub fn item(&self) -> &str {
        &self.item
    }

    /// Returns the cache the stream writes to.
    #[must_use]
    pub const fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Sets a sink that receives every byte after it is cached.
    pub fn set_write_through(&mut self, sink: Box<dyn Write>) {
        self.write_through = Some(sink);
    }

    /// Removes and returns the write-through sink.
    pub fn take_write_through(&mut self) -> Option<Box<dyn Write>> {
        self.write_through.take()
    }
}

impl Write for CacheInputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cache
            .set_string(&self.namespace, &self.item, buf, WriteMode::Append)
            .map_err(io::Error::other)?;
        if let Some(sink) = &mut self.write_through {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.write_through {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl Clone for CacheInputStream {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            namespace: self.namespace.clone(),
            item: self.item.clone(),
            write_through: None,
        }
    }
}

impl fmt::Debug for CacheInputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInputStream")
            .field("namespace", &self.namespace)
            .field("item", &self.item)
            .field("write_through", &self.write_through.is_some())
            .finish_non_exhaustive()
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
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Write-through sink the test can inspect afterwards.
    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writes_append() {
        let cache = ContentCache::memory();
        let mut stream = cache.input_stream_for("ns", "body");
        stream.write_all(b"a").unwrap();
        stream.write_all(b"bc").unwrap();
        write!(stream, "{}", 42).unwrap();
        assert_eq!(cache.get_string("ns", "body").unwrap().unwrap(), b"abc42");
    }

    #[test]
    fn test_write_through() {
        let cache = ContentCache::memory();
        let seen = Shared::default();
        let mut stream = cache.input_stream_for("ns", "body");
        stream.set_write_through(Box::new(seen.clone()));
        stream.write_all(b"hello").unwrap();
        stream.flush().unwrap();

        assert_eq!(*seen.0.borrow(), b"hello");
        assert_eq!(cache.get_string("ns", "body").unwrap().unwrap(), b"hello");
        assert!(stream.take_write_through().is_some());
    }

    #[test]
    fn test_clone_rebinds_without_write_through() {
        let cache = ContentCache::memory();
        let seen = Shared::default();
        let mut first = cache.input_stream_for("ns1", "body");
        first.set_write_through(Box::new(seen.clone()));

        let mut second = first.clone();
        second.bind("ns2", "body");
        second.write_all(b"second").unwrap();
        first.write_all(b"first").unwrap();

        assert_eq!(second.namespace(), "ns2");
        assert_eq!(second.item(), "body");
        assert_eq!(*seen.0.borrow(), b"first");
        assert_eq!(cache.get_string("ns1", "body").unwrap().unwrap(), b"first");
        assert_eq!(cache.get_string("ns2", "body").unwrap().unwrap(), b"second");
    }
}
