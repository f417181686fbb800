//! Entity body stored in a content cache.
//!
//! The raw body lives in the cache entry `(namespace, "body")`. The first
//! time the body is written out it is encoded into `(namespace,
//! "body.encoded")` and the sink at the same time; later writes copy the
//! cached encoding. Replacing the body or the encoder drops the cached
//! encoding.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes};
use mailpress_cache::{BackendKind, CacheInputStream, ContentCache, WriteMode};
use tracing::{debug, warn};

use crate::encoder::TransferEncoder;
use crate::error::Result;

/// Cache item holding the raw body.
pub const RAW_ITEM: &str = "body";

/// Cache item holding the encoded body.
pub const ENCODED_ITEM: &str = "body.encoded";

/// Body of one MIME entity, encoded lazily and cached.
#[derive(Debug)]
pub struct CachedBody {
    cache: ContentCache,
    namespace: String,
    encoder: Box<dyn TransferEncoder>,
    max_line_length: usize,
    /// Raw body when the cache stores nothing.
    inline: Option<Bytes>,
}

impl CachedBody {
    /// Creates an empty body in `namespace` of `cache`.
    #[must_use]
    pub fn new(
        cache: ContentCache,
        namespace: impl Into<String>,
        encoder: Box<dyn TransferEncoder>,
    ) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            encoder,
            max_line_length: 0,
            inline: None,
        }
    }

    /// Returns the cache namespace of this body.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the active encoder.
    #[must_use]
    pub fn encoder(&self) -> &dyn TransferEncoder {
        self.encoder.as_ref()
    }

    /// Replaces the encoder and drops the cached encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the cached encoding cannot be removed.
    pub fn set_encoder(&mut self, encoder: Box<dyn TransferEncoder>) -> Result<()> {
        self.encoder = encoder;
        self.invalidate()
    }

    /// Sets the output line limit; `0` selects the encoder default.
    ///
    /// # Errors
    ///
    /// Returns an error if the cached encoding cannot be removed.
    pub fn set_max_line_length(&mut self, max_line_length: usize) -> Result<()> {
        if self.max_line_length != max_line_length {
            self.max_line_length = max_line_length;
            self.invalidate()?;
        }
        Ok(())
    }

    /// Replaces the body with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot store the body. The cached
    /// encoding is gone either way.
    pub fn set_body(&mut self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.invalidate()?;
        if self.caches_nothing() {
            self.inline = Some(data);
        } else {
            self.inline = None;
            self.cache
                .set_string(&self.namespace, RAW_ITEM, &data, WriteMode::Write)?;
        }
        Ok(())
    }

    /// Replaces the body with everything read from `src`, chunk by chunk.
    ///
    /// Returns the number of bytes imported.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the cache cannot store the body.
    /// A failed import leaves the body unset.
    pub fn set_body_from_stream(&mut self, src: &mut dyn Read) -> Result<u64> {
        self.invalidate()?;
        self.inline = None;
        if self.caches_nothing() {
            let mut data = Vec::new();
            let n = src.read_to_end(&mut data)? as u64;
            self.inline = Some(Bytes::from(data));
            return Ok(n);
        }

        match self
            .cache
            .import_from_stream(&self.namespace, RAW_ITEM, src, WriteMode::Write)
        {
            Ok(n) => Ok(n),
            Err(e) => {
                self.discard(RAW_ITEM);
                Err(e.into())
            }
        }
    }

    /// Returns true if an encoded copy is cached.
    #[must_use]
    pub fn is_encoding_cached(&self) -> bool {
        self.cache.has_key(&self.namespace, ENCODED_ITEM)
    }

    /// Writes the encoded body to `dst`.
    ///
    /// Returns the number of bytes written. A body that was never set
    /// writes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the body, encoding or writing fails. A
    /// failed encoding leaves no cached copy behind.
    pub fn write_to(&self, dst: &mut dyn Write) -> Result<u64> {
        if let Some(written) = self
            .cache
            .export_to_stream(&self.namespace, ENCODED_ITEM, &mut *dst)?
        {
            debug!(namespace = %self.namespace, bytes = written, "Wrote cached encoding");
            return Ok(written);
        }

        let mut raw: Box<dyn Read> = match &self.inline {
            Some(bytes) => Box::new(bytes.clone().reader()),
            None => match self.cache.reader(&self.namespace, RAW_ITEM)? {
                Some(reader) => reader,
                None => return Ok(0),
            },
        };

        let mut tee = Tee {
            cache: self.cache.input_stream_for(&self.namespace, ENCODED_ITEM),
            dst,
        };
        match self
            .encoder
            .encode_stream(&mut raw, &mut tee, 0, self.max_line_length)
        {
            Ok(written) => {
                debug!(
                    namespace = %self.namespace,
                    encoding = self.encoder.name(),
                    bytes = written,
                    "Encoded body"
                );
                Ok(written)
            }
            Err(e) => {
                self.discard(ENCODED_ITEM);
                Err(e)
            }
        }
    }

    /// Returns the encoded body.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the body or encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Drops the body and its cached encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache entries cannot be removed.
    pub fn clear(&mut self) -> Result<()> {
        self.inline = None;
        self.cache.clear_all(&self.namespace)?;
        Ok(())
    }

    fn caches_nothing(&self) -> bool {
        self.cache.kind() == BackendKind::Null
    }

    /// Removes a partial entry after a failure without masking that failure.
    fn discard(&self, item: &str) {
        if let Err(e) = self.cache.clear_key(&self.namespace, item) {
            warn!(
                namespace = %self.namespace,
                item,
                error = %e,
                "Failed to remove partial cache entry"
            );
        }
    }

    fn invalidate(&self) -> Result<()> {
        self.cache.clear_key(&self.namespace, ENCODED_ITEM)?;
        Ok(())
    }
}

/// Writes to the cache first, then to the caller's sink.
struct Tee<'a> {
    cache: CacheInputStream,
    dst: &'a mut dyn Write,
}

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cache.write_all(buf)?;
        self.dst.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.cache.flush()?;
        self.dst.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use mailpress_cache::{CacheBackend, MemoryBackend};

    use super::*;
    use crate::encoder::{Base64Encoder, QpEncoder};

    fn qp() -> Box<dyn TransferEncoder> {
        Box::new(QpEncoder::new("utf-8").unwrap())
    }

    #[test]
    fn test_encodes_once_then_serves_cache() {
        let cache = ContentCache::memory();
        let mut body = CachedBody::new(cache.clone(), "part-1", qp());
        body.set_body("café".as_bytes().to_vec()).unwrap();
        assert!(!body.is_encoding_cached());

        assert_eq!(body.to_bytes().unwrap(), b"caf=C3=A9");
        assert!(body.is_encoding_cached());
        assert_eq!(cache.get_string("part-1", ENCODED_ITEM).unwrap().unwrap(), b"caf=C3=A9");

        // A tampered cache entry proves the second write does not re-encode.
        cache
            .set_string("part-1", ENCODED_ITEM, b"cached", WriteMode::Write)
            .unwrap();
        assert_eq!(body.to_bytes().unwrap(), b"cached");
    }

    #[test]
    fn test_changes_invalidate_encoding() {
        let cache = ContentCache::memory();
        let mut body = CachedBody::new(cache, "part", qp());
        body.set_body(Bytes::from_static(b"Man")).unwrap();
        body.to_bytes().unwrap();

        body.set_encoder(Box::new(Base64Encoder::new())).unwrap();
        assert!(!body.is_encoding_cached());
        assert_eq!(body.to_bytes().unwrap(), b"TWFu");

        body.set_body(Bytes::from_static(b"Ma")).unwrap();
        assert_eq!(body.to_bytes().unwrap(), b"TWE=");
    }

    #[test]
    fn test_failed_encoding_leaves_no_cache() {
        let cache = ContentCache::memory();
        let mut body = CachedBody::new(cache.clone(), "bad", qp());
        body.set_body(Bytes::from_static(b"valid text then \xFF")).unwrap();
        assert!(body.to_bytes().is_err());
        assert!(!cache.has_key("bad", ENCODED_ITEM));
    }

    /// Yields `data` once, then fails.
    struct FailingSource {
        data: &'static [u8],
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(io::Error::other("disk gone"));
            }
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_failed_import_drops_old_encoding() {
        for cache in [ContentCache::memory(), ContentCache::disk().unwrap()] {
            let mut body = CachedBody::new(cache.clone(), "part", Box::new(Base64Encoder::new()));
            body.set_body(Bytes::from_static(b"Man")).unwrap();
            assert_eq!(body.to_bytes().unwrap(), b"TWFu");

            let mut src = FailingSource { data: b"new" };
            let err = body.set_body_from_stream(&mut src).unwrap_err();
            assert!(matches!(
                err,
                crate::Error::Cache(mailpress_cache::Error::Stream(_))
            ));

            assert!(!body.is_encoding_cached());
            assert!(!cache.has_key("part", RAW_ITEM));
            assert_eq!(body.to_bytes().unwrap(), b"");
        }
    }

    #[test]
    fn test_failed_import_on_null_cache_unsets_body() {
        let mut body = CachedBody::new(ContentCache::null(), "part", qp());
        body.set_body(Bytes::from_static(b"old")).unwrap();
        let mut src = FailingSource { data: b"new" };
        assert!(body.set_body_from_stream(&mut src).is_err());
        assert_eq!(body.to_bytes().unwrap(), b"");
    }

    /// Memory backend whose `clear_key` can be made to fail.
    #[derive(Debug)]
    struct StickyBackend {
        inner: MemoryBackend,
        stuck: Rc<Cell<bool>>,
    }

    impl CacheBackend for StickyBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Memory
        }

        fn open_writer(
            &mut self,
            namespace: &str,
            item: &str,
            mode: WriteMode,
        ) -> io::Result<Box<dyn Write + '_>> {
            self.inner.open_writer(namespace, item, mode)
        }

        fn open_reader(&mut self, namespace: &str, item: &str) -> io::Result<Option<Box<dyn Read>>> {
            self.inner.open_reader(namespace, item)
        }

        fn has_key(&self, namespace: &str, item: &str) -> bool {
            self.inner.has_key(namespace, item)
        }

        fn clear_key(&mut self, namespace: &str, item: &str) -> io::Result<()> {
            if self.stuck.get() {
                return Err(io::Error::other("entry locked"));
            }
            self.inner.clear_key(namespace, item)
        }

        fn clear_all(&mut self, namespace: &str) -> io::Result<()> {
            self.inner.clear_all(namespace)
        }
    }

    #[test]
    fn test_cleanup_failure_keeps_encoding_error() {
        let stuck = Rc::new(Cell::new(false));
        let cache = ContentCache::new(StickyBackend {
            inner: MemoryBackend::new(),
            stuck: stuck.clone(),
        });
        let mut body = CachedBody::new(cache, "bad", qp());
        body.set_body(Bytes::from_static(b"valid text then \xFF")).unwrap();

        stuck.set(true);
        let err = body.to_bytes().unwrap_err();
        assert!(matches!(err, crate::Error::Charset(_)), "got {err:?}");
    }

    #[test]
    fn test_null_cache_keeps_body_inline() {
        let mut body = CachedBody::new(ContentCache::null(), "part", qp());
        body.set_body(Bytes::from_static(b"a=b")).unwrap();
        assert_eq!(body.to_bytes().unwrap(), b"a=3Db");
        assert_eq!(body.to_bytes().unwrap(), b"a=3Db");
        assert!(!body.is_encoding_cached());

        let mut src: &[u8] = b"x y";
        assert_eq!(body.set_body_from_stream(&mut src).unwrap(), 3);
        assert_eq!(body.to_bytes().unwrap(), b"x y");
    }

    #[test]
    fn test_unset_body_writes_nothing() {
        let body = CachedBody::new(ContentCache::memory(), "empty", qp());
        assert_eq!(body.to_bytes().unwrap(), b"");
    }

    #[test]
    fn test_clear_drops_everything() {
        let cache = ContentCache::memory();
        let mut body = CachedBody::new(cache.clone(), "part", qp());
        body.set_body(Bytes::from_static(b"hello")).unwrap();
        body.to_bytes().unwrap();
        body.clear().unwrap();
        assert!(!cache.has_key("part", RAW_ITEM));
        assert!(!cache.has_key("part", ENCODED_ITEM));
        assert_eq!(body.to_bytes().unwrap(), b"");
    }
}
