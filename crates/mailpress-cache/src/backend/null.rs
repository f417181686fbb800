//! Backend that stores nothing.

use std::io::{self, Read, Write};

use super::{CacheBackend, WriteMode};
use crate::config::BackendKind;

/// Discards every write; every lookup misses.
///
/// Used to switch caching off, e.g. for trivial messages where streaming
/// through a cache costs more than it saves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl CacheBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn open_writer(
        &mut self,
        _namespace: &str,
        _item: &str,
        _mode: WriteMode,
    ) -> io::Result<Box<dyn Write + '_>> {
        Ok(Box::new(io::sink()))
    }

    fn open_reader(&mut self, _namespace: &str, _item: &str) -> io::Result<Option<Box<dyn Read>>> {
        Ok(None)
    }

    fn has_key(&self, _namespace: &str, _item: &str) -> bool {
        false
    }

    fn clear_key(&mut self, _namespace: &str, _item: &str) -> io::Result<()> {
        Ok(())
    }

    fn clear_all(&mut self, _namespace: &str) -> io::Result<()> {
        Ok(())
    }
}
