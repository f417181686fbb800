//! Streaming tests for the content cache.
//!
//! These use instrumented readers and writers to check that import and
//! export never move more than one chunk at a time, however large the entry.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};

use mailpress_cache::{BackendKind, CacheConfig, ContentCache, DiskBackend, Error, WriteMode};
use proptest::prelude::*;

/// Synthetic source of `len` bytes that records the largest read request it
/// served.
struct CountingSource {
    remaining: u64,
    position: u64,
    reads: usize,
    largest_read: usize,
}

impl CountingSource {
    fn new(len: u64) -> Self {
        Self {
            remaining: len,
            position: 0,
            reads: 0,
            largest_read: 0,
        }
    }
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining) as usize;
        for byte in &mut buf[..n] {
            *byte = (self.position % 253) as u8;
            self.position += 1;
        }
        self.remaining -= n as u64;
        if n > 0 {
            self.reads += 1;
            self.largest_read = self.largest_read.max(n);
        }
        Ok(n)
    }
}

/// Sink that checks content against the synthetic pattern without keeping
/// it.
#[derive(Default)]
struct CountingSink {
    written: u64,
    writes: usize,
    largest_write: usize,
    mismatch: bool,
}

impl Write for CountingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte != (self.written % 253) as u8 {
                self.mismatch = true;
            }
            self.written += 1;
        }
        self.writes += 1;
        self.largest_write = self.largest_write.max(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn roundtrip_in_chunks(cache: &ContentCache, len: u64) {
    let chunk = cache.chunk_size();
    let mut source = CountingSource::new(len);
    let imported = cache
        .import_from_stream("msg", "attachment", &mut source, WriteMode::Write)
        .unwrap();
    assert_eq!(imported, len);
    assert!(source.largest_read <= chunk);
    assert_eq!(source.reads as u64, len.div_ceil(chunk as u64));

    let mut sink = CountingSink::default();
    let exported = cache.export_to_stream("msg", "attachment", &mut sink).unwrap();
    assert_eq!(exported, Some(len));
    assert_eq!(sink.written, len);
    assert!(!sink.mismatch);
    assert!(sink.largest_write <= chunk);
}

#[test]
fn disk_cache_moves_one_chunk_at_a_time() {
    init_tracing();
    let cache = ContentCache::disk().unwrap();
    roundtrip_in_chunks(&cache, 100 * cache.chunk_size() as u64 + 17);
}

#[test]
fn memory_cache_moves_one_chunk_at_a_time() {
    init_tracing();
    let cache = ContentCache::memory();
    roundtrip_in_chunks(&cache, 10 * cache.chunk_size() as u64 + 1);
}

#[test]
fn small_chunk_size_from_config() {
    let parent = tempfile::tempdir().unwrap();
    let config = CacheConfig::builder()
        .backend(BackendKind::Disk)
        .chunk_size(100)
        .disk_root(parent.path())
        .build();
    let cache = ContentCache::from_config(&config).unwrap();
    roundtrip_in_chunks(&cache, 12_345);
}

#[test]
fn input_stream_appends_incrementally() {
    let cache = ContentCache::disk().unwrap();
    let mut sink = cache.input_stream_for("msg", "encoded");
    for line in 0..1000 {
        writeln!(sink, "line {line}").unwrap();
    }
    let content = cache.get_string("msg", "encoded").unwrap().unwrap();
    let text = String::from_utf8(content).unwrap();
    assert_eq!(text.lines().count(), 1000);
    assert!(text.ends_with("line 999\n"));
}

/// Source that yields `data` once, then fails.
struct FailingSource<'a> {
    data: &'a [u8],
}

impl Read for FailingSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "source gone"));
        }
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Sink that rejects every write.
struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn backend_failure_names_the_entry() {
    let parent = tempfile::tempdir().unwrap();
    let config = CacheConfig::builder()
        .backend(BackendKind::Disk)
        .disk_root(parent.path())
        .build();
    let cache = ContentCache::from_config(&config).unwrap();
    cache.set_string("msg", "first", "a", WriteMode::Write).unwrap();

    // Remove every namespace directory under the scratch root.
    let scratch = std::fs::read_dir(parent.path()).unwrap().next().unwrap().unwrap().path();
    for dir in std::fs::read_dir(&scratch).unwrap() {
        std::fs::remove_dir_all(dir.unwrap().path()).unwrap();
    }

    let err = cache.set_string("msg", "second", "b", WriteMode::Write).unwrap_err();
    match &err {
        Error::Io { namespace, item, source } => {
            assert_eq!(namespace, "msg");
            assert_eq!(item, "second");
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected Error::Io, got {other:?}"),
    }
    assert!(err.to_string().contains("msg/second"));
    assert!(!cache.has_key("msg", "second"));
    assert_eq!(cache.get_string("msg", "second").unwrap(), None);
}

#[test]
fn failing_source_is_a_stream_error() {
    for cache in [ContentCache::memory(), ContentCache::disk().unwrap()] {
        let mut src = FailingSource { data: b"partial" };
        let err = cache
            .import_from_stream("msg", "body", &mut src, WriteMode::Write)
            .unwrap_err();
        match err {
            Error::Stream(e) => {
                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                assert_eq!(e.to_string(), "source gone");
            }
            other => panic!("expected Error::Stream, got {other:?}"),
        }
    }
}

#[test]
fn failing_sink_error_surfaces_unchanged() {
    for cache in [ContentCache::memory(), ContentCache::disk().unwrap()] {
        cache.set_string("msg", "body", "hello", WriteMode::Write).unwrap();
        let err = cache
            .export_to_stream("msg", "body", &mut FailingSink)
            .unwrap_err();
        match err {
            Error::Stream(e) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "peer closed");
            }
            other => panic!("expected Error::Stream, got {other:?}"),
        }
        assert_eq!(cache.get_string("msg", "body").unwrap().unwrap(), b"hello");
    }
}

#[test]
fn unusable_disk_root_is_a_setup_error() {
    let parent = tempfile::tempdir().unwrap();
    let missing = parent.path().join("does-not-exist");
    assert!(matches!(DiskBackend::in_dir(&missing), Err(Error::Setup(_))));

    let config = CacheConfig::builder()
        .backend(BackendKind::Disk)
        .disk_root(&missing)
        .build();
    assert!(matches!(ContentCache::from_config(&config), Err(Error::Setup(_))));
}

proptest! {
    #[test]
    fn append_sequence_concatenates(parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..12)) {
        let cache = ContentCache::memory();
        let mut expected = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let mode = if i == 0 { WriteMode::Write } else { WriteMode::Append };
            cache.set_string("ns", "k", part, mode).unwrap();
            expected.extend_from_slice(part);
        }
        prop_assert_eq!(cache.get_string("ns", "k").unwrap().unwrap(), expected);
    }
}
