//! Cache configuration types.

use std::path::PathBuf;

/// Default chunk size for streaming import and export.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BackendKind {
    /// Growable buffers in process memory.
    #[default]
    Memory,
    /// One temporary file per entry.
    Disk,
    /// Discards everything. Disables caching.
    Null,
}

/// Content cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Storage backend.
    pub backend: BackendKind,
    /// Bytes moved per step when importing or exporting a stream.
    pub chunk_size: usize,
    /// Parent directory for the disk backend. `None` uses the system
    /// temporary directory.
    pub disk_root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            chunk_size: DEFAULT_CHUNK_SIZE,
            disk_root: None,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration for the given backend.
    #[must_use]
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::new()
    }
}

/// Builder for cache configuration.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend.
    #[must_use]
    pub const fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    /// Sets the streaming chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Sets the parent directory for the disk backend.
    #[must_use]
    pub fn disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.disk_root = Some(root.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> CacheConfig {
        self.config
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

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.chunk_size, 8192);
        assert!(config.disk_root.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .backend(BackendKind::Disk)
            .chunk_size(1024)
            .disk_root("/var/tmp")
            .build();

        assert_eq!(config.backend, BackendKind::Disk);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.disk_root, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn test_config_new() {
        let config = CacheConfig::new(BackendKind::Null);
        assert_eq!(config.backend, BackendKind::Null);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
