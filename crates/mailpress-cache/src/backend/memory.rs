//! In-memory backend.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};

use super::{CacheBackend, WriteMode};
use crate::config::BackendKind;

/// Size at which the growing tail of an entry is frozen into a segment.
const SEGMENT_SIZE: usize = 64 * 1024;

/// Entry content: frozen segments followed by a growable tail.
#[derive(Debug, Default)]
struct Entry {
    segments: Vec<Bytes>,
    tail: BytesMut,
}

impl Entry {
    fn clear(&mut self) {
        self.segments.clear();
        self.tail.clear();
    }

    fn freeze_tail(&mut self) {
        if !self.tail.is_empty() {
            self.segments.push(self.tail.split().freeze());
        }
    }
}

/// Keeps entries in process memory.
///
/// Memory use grows with the total size of cached content, so this backend
/// suits small messages. Readers share the stored segments instead of
/// copying them.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    namespaces: HashMap<String, HashMap<String, Entry>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, namespace: &str, item: &str) -> Option<&Entry> {
        self.namespaces.get(namespace)?.get(item)
    }
}

impl CacheBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn open_writer(
        &mut self,
        namespace: &str,
        item: &str,
        mode: WriteMode,
    ) -> io::Result<Box<dyn Write + '_>> {
        let entry = self
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .entry(item.to_string())
            .or_default();
        if mode == WriteMode::Write {
            entry.clear();
        }
        Ok(Box::new(EntryWriter { entry }))
    }

    fn open_reader(&mut self, namespace: &str, item: &str) -> io::Result<Option<Box<dyn Read>>> {
        let Some(entry) = self
            .namespaces
            .get_mut(namespace)
            .and_then(|items| items.get_mut(item))
        else {
            return Ok(None);
        };
        entry.freeze_tail();
        Ok(Some(Box::new(SegmentReader {
            segments: entry.segments.iter().cloned().collect(),
        })))
    }

    fn has_key(&self, namespace: &str, item: &str) -> bool {
        self.entry(namespace, item).is_some()
    }

    fn clear_key(&mut self, namespace: &str, item: &str) -> io::Result<()> {
        if let Some(items) = self.namespaces.get_mut(namespace) {
            items.remove(item);
            if items.is_empty() {
                self.namespaces.remove(namespace);
            }
        }
        Ok(())
    }

    fn clear_all(&mut self, namespace: &str) -> io::Result<()> {
        self.namespaces.remove(namespace);
        Ok(())
    }
}

struct EntryWriter<'a> {
    entry: &'a mut Entry,
}

impl Write for EntryWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.entry.tail.extend_from_slice(buf);
        if self.entry.tail.len() >= SEGMENT_SIZE {
            self.entry.freeze_tail();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads a snapshot of an entry's segments.
struct SegmentReader {
    segments: VecDeque<Bytes>,
}

impl Read for SegmentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(front) = self.segments.front_mut() {
            if front.is_empty() {
                self.segments.pop_front();
                continue;
            }
            let n = front.len().min(buf.len());
            buf[..n].copy_from_slice(&front[..n]);
            front.advance(n);
            return Ok(n);
        }
        Ok(0)
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

    fn read_all(backend: &mut MemoryBackend, ns: &str, item: &str) -> Option<Vec<u8>> {
        let mut reader = backend.open_reader(ns, item).unwrap()?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        Some(out)
    }

    #[test]
    fn test_write_then_append() {
        let mut backend = MemoryBackend::new();
        backend
            .open_writer("ns", "body", WriteMode::Write)
            .unwrap()
            .write_all(b"test")
            .unwrap();
        backend
            .open_writer("ns", "body", WriteMode::Append)
            .unwrap()
            .write_all(b"ing")
            .unwrap();
        assert_eq!(read_all(&mut backend, "ns", "body").unwrap(), b"testing");
    }

    #[test]
    fn test_reader_is_a_snapshot() {
        let mut backend = MemoryBackend::new();
        backend
            .open_writer("ns", "body", WriteMode::Write)
            .unwrap()
            .write_all(b"abc")
            .unwrap();
        let mut reader = backend.open_reader("ns", "body").unwrap().unwrap();
        backend
            .open_writer("ns", "body", WriteMode::Append)
            .unwrap()
            .write_all(b"def")
            .unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(read_all(&mut backend, "ns", "body").unwrap(), b"abcdef");
    }

    #[test]
    fn test_large_entry_spans_segments() {
        let mut backend = MemoryBackend::new();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        {
            let mut writer = backend.open_writer("ns", "big", WriteMode::Write).unwrap();
            for chunk in data.chunks(1000) {
                writer.write_all(chunk).unwrap();
            }
        }
        assert_eq!(read_all(&mut backend, "ns", "big").unwrap(), data);
    }

    #[test]
    fn test_clear_key_and_missing() {
        let mut backend = MemoryBackend::new();
        backend.open_writer("ns", "a", WriteMode::Write).unwrap();
        assert!(backend.has_key("ns", "a"));
        backend.clear_key("ns", "a").unwrap();
        assert!(!backend.has_key("ns", "a"));
        assert!(read_all(&mut backend, "ns", "a").is_none());
        backend.clear_key("other", "a").unwrap();
    }
}
