//! Archive stores: where the registry gets bundle bytes from.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bale_core::alloc::HashMap;
use bale_core::dependency::INDEX_FILE_NAME;
use bale_core::{Archive, DependencyTable, offset};

use crate::error::{BundleError, BundleResult};

/// Future type for async archive opens.
pub type ArchiveFuture = Pin<Box<dyn Future<Output = BundleResult<Arc<Archive>>> + Send + 'static>>;

/// Source of bundle archives and the bundle dependency index.
pub trait ArchiveStore: Send + Sync {
    /// Open the archive for `id`, blocking until it is available.
    fn open(&self, id: &str) -> BundleResult<Arc<Archive>>;

    /// Start opening the archive for `id`.
    ///
    /// The default implementation opens synchronously and returns a ready future.
    fn open_async(&self, id: &str) -> ArchiveFuture {
        let result = self.open(id);
        Box::pin(async move { result })
    }

    /// Read the bundle dependency index. Stores without one return an empty table.
    fn read_index(&self) -> BundleResult<DependencyTable> {
        Ok(DependencyTable::new())
    }
}

/// Reads bundles from a directory on disk.
///
/// Uses blocking I/O wrapped in ready futures.
#[derive(Debug, Clone)]
pub struct FileArchiveStore {
    base_path: PathBuf,
    offset_factor: u32,
}

impl FileArchiveStore {
    /// Create a store reading `<base_path>/<id>`.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            offset_factor: 0,
        }
    }

    /// Strip the header offset written by a build with the same factor.
    pub fn with_offset_factor(mut self, factor: u32) -> Self {
        self.offset_factor = factor;
        self
    }

    /// The directory bundles are read from.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read(&self, name: &str) -> BundleResult<Option<Vec<u8>>> {
        let path = self.base_path.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BundleError::IoError { path, source: e }),
        }
    }
}

impl ArchiveStore for FileArchiveStore {
    fn open(&self, id: &str) -> BundleResult<Arc<Archive>> {
        if id.is_empty() {
            return Err(BundleError::ArchiveNotFound { id: String::new() });
        }
        let bytes = self
            .read(id)?
            .ok_or_else(|| BundleError::ArchiveNotFound { id: id.to_string() })?;

        let body = offset::strip(&bytes, id, self.offset_factor);
        let archive = Archive::parse(body).map_err(|source| BundleError::ArchiveCorrupt {
            id: id.to_string(),
            source,
        })?;

        tracing::trace!("Opened bundle {} ({} objects)", id, archive.len());
        Ok(Arc::new(archive))
    }

    fn read_index(&self) -> BundleResult<DependencyTable> {
        let Some(bytes) = self.read(INDEX_FILE_NAME)? else {
            tracing::debug!(
                "No dependency index in {}, assuming no bundle dependencies",
                self.base_path.display()
            );
            return Ok(DependencyTable::new());
        };

        let text = String::from_utf8_lossy(&bytes);
        DependencyTable::parse(&text).map_err(|source| BundleError::InvalidIndex { source })
    }
}

/// In-memory archive store for testing or embedded bundles.
#[derive(Default)]
pub struct MemoryArchiveStore {
    archives: HashMap<String, Arc<Archive>>,
    index: DependencyTable,
}

impl MemoryArchiveStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an archive under `id`.
    pub fn insert(&mut self, id: impl Into<String>, archive: Archive) -> &mut Self {
        self.archives.insert(id.into(), Arc::new(archive));
        self
    }

    /// Declare the direct dependencies of `id`.
    pub fn set_dependencies(&mut self, id: impl Into<String>, deps: &[&str]) -> &mut Self {
        self.index.insert(id, deps.iter().map(|d| d.to_string()));
        self
    }

    /// Replace the whole dependency index.
    pub fn set_index(&mut self, index: DependencyTable) -> &mut Self {
        self.index = index;
        self
    }

    /// Check if an archive exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.archives.contains_key(id)
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn open(&self, id: &str) -> BundleResult<Arc<Archive>> {
        self.archives
            .get(id)
            .cloned()
            .ok_or_else(|| BundleError::ArchiveNotFound { id: id.to_string() })
    }

    fn read_index(&self) -> BundleResult<DependencyTable> {
        Ok(self.index.clone())
    }
}
