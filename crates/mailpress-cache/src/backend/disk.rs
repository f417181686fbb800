//! On-disk backend.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::{CacheBackend, WriteMode};
use crate::config::BackendKind;
use crate::error::{Error, Result};

/// Files of one namespace.
#[derive(Debug)]
struct Namespace {
    dir: PathBuf,
    items: HashMap<String, PathBuf>,
}

/// Keeps each entry in its own temporary file.
///
/// All files live under a private scratch directory that is removed when
/// the backend is dropped. Namespaces map to subdirectories and items to
/// files; on-disk names are generated, so keys never reach the filesystem.
/// Cleanup after an abnormal exit is left to the operating system's
/// temporary directory policy.
#[derive(Debug)]
pub struct DiskBackend {
    root: Option<TempDir>,
    namespaces: HashMap<String, Namespace>,
    /// Last file appended to, kept open for consecutive appends.
    appender: Option<(PathBuf, File)>,
    next_id: u64,
}

impl DiskBackend {
    /// Creates a backend under the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the scratch directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("mailpress-cache-")
            .tempdir()
            .map_err(Error::Setup)?;
        Ok(Self::with_root(root))
    }

    /// Creates a backend whose scratch directory lives under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Setup`] if the scratch directory cannot be created.
    pub fn in_dir(parent: impl AsRef<Path>) -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("mailpress-cache-")
            .tempdir_in(parent)
            .map_err(Error::Setup)?;
        Ok(Self::with_root(root))
    }

    fn with_root(root: TempDir) -> Self {
        debug!(path = %root.path().display(), "Created disk cache directory");
        Self {
            root: Some(root),
            namespaces: HashMap::new(),
            appender: None,
            next_id: 0,
        }
    }

    /// Returns the scratch directory.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.root.as_ref().map(TempDir::path)
    }

    fn path_of(&self, namespace: &str, item: &str) -> Option<&PathBuf> {
        self.namespaces.get(namespace)?.items.get(item)
    }

    /// Returns the file for an entry and whether it is new.
    ///
    /// A new item is not registered here; the caller does that once its file
    /// exists.
    fn ensure_path(&mut self, namespace: &str, item: &str) -> io::Result<(PathBuf, bool)> {
        if let Some(path) = self.path_of(namespace, item) {
            return Ok((path.clone(), false));
        }

        let root = self
            .root
            .as_ref()
            .map(|r| r.path().to_path_buf())
            .ok_or_else(|| io::Error::other("disk cache already closed"))?;

        if !self.namespaces.contains_key(namespace) {
            self.next_id += 1;
            let dir = root.join(format!("ns-{}", self.next_id));
            fs::create_dir(&dir)?;
            debug!(namespace, dir = %dir.display(), "Created cache namespace");
            self.namespaces.insert(
                namespace.to_string(),
                Namespace {
                    dir,
                    items: HashMap::new(),
                },
            );
        }

        self.next_id += 1;
        let id = self.next_id;
        let Some(ns) = self.namespaces.get(namespace) else {
            return Err(io::Error::other("namespace vanished"));
        };
        Ok((ns.dir.join(format!("item-{id}")), true))
    }

    fn register(&mut self, namespace: &str, item: &str, path: PathBuf) {
        if let Some(ns) = self.namespaces.get_mut(namespace) {
            debug!(namespace, item, path = %path.display(), "Created cache entry");
            ns.items.insert(item.to_string(), path);
        }
    }

    fn drop_appender_under(&mut self, prefix: &Path) {
        if self
            .appender
            .as_ref()
            .is_some_and(|(path, _)| path.starts_with(prefix))
        {
            self.appender = None;
        }
    }
}

impl CacheBackend for DiskBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    fn open_writer(
        &mut self,
        namespace: &str,
        item: &str,
        mode: WriteMode,
    ) -> io::Result<Box<dyn Write + '_>> {
        let (path, created) = self.ensure_path(namespace, item)?;

        let reuse = mode == WriteMode::Append
            && self.appender.as_ref().is_some_and(|(open, _)| *open == path);
        if !reuse {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(mode == WriteMode::Append)
                .truncate(mode == WriteMode::Write)
                .open(&path)?;
            if created {
                self.register(namespace, item, path.clone());
            }
            self.appender = Some((path, file));
        }

        match &mut self.appender {
            Some((_, file)) => Ok(Box::new(file)),
            None => Err(io::Error::other("cache file not open")),
        }
    }

    fn open_reader(&mut self, namespace: &str, item: &str) -> io::Result<Option<Box<dyn Read>>> {
        let Some(path) = self.path_of(namespace, item) else {
            return Ok(None);
        };
        let file = File::open(path)?;
        Ok(Some(Box::new(file)))
    }

    fn has_key(&self, namespace: &str, item: &str) -> bool {
        self.path_of(namespace, item).is_some()
    }

    fn clear_key(&mut self, namespace: &str, item: &str) -> io::Result<()> {
        let Some(path) = self
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.items.remove(item))
        else {
            return Ok(());
        };
        self.drop_appender_under(&path);
        debug!(namespace, item, "Removing cache entry");
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn clear_all(&mut self, namespace: &str) -> io::Result<()> {
        let Some(ns) = self.namespaces.remove(namespace) else {
            return Ok(());
        };
        self.drop_appender_under(&ns.dir);
        debug!(namespace, entries = ns.items.len(), "Removing cache namespace");
        match fs::remove_dir_all(&ns.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for DiskBackend {
    fn drop(&mut self) {
        self.appender = None;
        if let Some(root) = self.root.take() {
            let path = root.path().to_path_buf();
            if let Err(e) = root.close() {
                warn!(?e, path = %path.display(), "Failed to remove disk cache directory");
            }
        }
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

    fn write(backend: &mut DiskBackend, ns: &str, item: &str, data: &[u8], mode: WriteMode) {
        backend
            .open_writer(ns, item, mode)
            .unwrap()
            .write_all(data)
            .unwrap();
    }

    fn read_all(backend: &mut DiskBackend, ns: &str, item: &str) -> Option<Vec<u8>> {
        let mut reader = backend.open_reader(ns, item).unwrap()?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        Some(out)
    }

    #[test]
    fn test_write_append_overwrite() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "ns", "body", b"test", WriteMode::Write);
        write(&mut backend, "ns", "body", b"ing", WriteMode::Append);
        assert_eq!(read_all(&mut backend, "ns", "body").unwrap(), b"testing");

        write(&mut backend, "ns", "body", b"new", WriteMode::Write);
        assert_eq!(read_all(&mut backend, "ns", "body").unwrap(), b"new");
    }

    #[test]
    fn test_interleaved_appends() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "ns", "a", b"1", WriteMode::Append);
        write(&mut backend, "ns", "b", b"x", WriteMode::Append);
        write(&mut backend, "ns", "a", b"2", WriteMode::Append);
        write(&mut backend, "ns", "b", b"y", WriteMode::Append);
        assert_eq!(read_all(&mut backend, "ns", "a").unwrap(), b"12");
        assert_eq!(read_all(&mut backend, "ns", "b").unwrap(), b"xy");
    }

    #[test]
    fn test_keys_never_touch_the_filesystem() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "../../etc", "passwd", b"safe", WriteMode::Write);
        assert_eq!(read_all(&mut backend, "../../etc", "passwd").unwrap(), b"safe");
        let root = backend.path().unwrap().to_path_buf();
        let created: Vec<_> = fs::read_dir(&root).unwrap().collect();
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn test_clear_removes_files() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "ns", "a", b"1", WriteMode::Write);
        write(&mut backend, "ns", "b", b"2", WriteMode::Write);
        let dir = backend.namespaces["ns"].dir.clone();

        backend.clear_key("ns", "a").unwrap();
        assert!(!backend.has_key("ns", "a"));
        assert!(backend.has_key("ns", "b"));

        backend.clear_all("ns").unwrap();
        assert!(!backend.has_key("ns", "b"));
        assert!(!dir.exists());
    }

    #[test]
    fn test_failed_open_registers_nothing() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "ns", "a", b"1", WriteMode::Write);
        fs::remove_dir_all(&backend.namespaces["ns"].dir).unwrap();

        let err = backend.open_writer("ns", "b", WriteMode::Write).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!backend.has_key("ns", "b"));
        assert!(backend.open_reader("ns", "b").unwrap().is_none());
    }

    #[test]
    fn test_vanished_file_is_an_error() {
        let mut backend = DiskBackend::new().unwrap();
        write(&mut backend, "ns", "a", b"1", WriteMode::Write);
        backend.appender = None;
        fs::remove_file(backend.path_of("ns", "a").unwrap()).unwrap();

        assert!(backend.has_key("ns", "a"));
        assert!(backend.open_reader("ns", "a").is_err());
    }

    #[test]
    fn test_drop_removes_root() {
        let backend = DiskBackend::new().unwrap();
        let root = backend.path().unwrap().to_path_buf();
        assert!(root.exists());
        drop(backend);
        assert!(!root.exists());
    }

    #[test]
    fn test_in_dir() {
        let parent = tempfile::tempdir().unwrap();
        let backend = DiskBackend::in_dir(parent.path()).unwrap();
        assert!(backend.path().unwrap().starts_with(parent.path()));
    }
}
