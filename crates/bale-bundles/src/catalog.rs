//! Catalogs: object sources for direct (non-bundle) loading.
//!
//! In direct mode the loader skips the registry and asks a catalog for the raw
//! bytes of an asset path. Lookups go through [`object_key`], so callers may
//! omit the extension exactly as they do when loading from bundles.

use std::path::{Path, PathBuf};

use bale_core::alloc::HashMap;
use bale_core::name::object_key;

/// Source of serialized objects keyed by asset path.
pub trait Catalog: Send + Sync {
    /// Read the bytes of the object at `path`, if it exists.
    fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// Reads objects from a project directory.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    /// Create a catalog rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The catalog root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the file in `path`'s directory whose object key matches.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let exact = self.root.join(path);
        if exact.is_file() {
            return Some(exact);
        }

        let unified = path.trim().replace('\\', "/");
        let dir = unified.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let key = object_key(path);

        let entries = std::fs::read_dir(self.root.join(dir)).ok()?;
        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|candidate| candidate.is_file())
            .filter(|candidate| {
                candidate
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| object_key(&format!("{}/{}", dir, name)) == key)
            })
            .collect();
        matches.sort();
        matches.into_iter().next()
    }
}

impl Catalog for DirectoryCatalog {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        let file = self.resolve(path)?;
        match std::fs::read(&file) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", file.display(), e);
                None
            }
        }
    }
}

/// In-memory catalog for testing or embedded objects.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    objects: HashMap<String, Vec<u8>>,
}

impl MemoryCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object. The path is reduced to its object key.
    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.objects.insert(object_key(path), bytes.into());
        self
    }

    /// Check if an object exists for `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(&object_key(path))
    }
}

impl Catalog for MemoryCatalog {
    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.get(&object_key(path)).cloned()
    }
}
