//! Direct dependency sources for the builder.

use std::path::Path;

use bale_core::DependencyTable;
use bale_core::name::normalize_path;

use crate::error::{BuildError, BuildResult};

/// Supplies the direct dependencies of an asset.
///
/// Paths are project-relative with `/` separators. Returned paths are used
/// verbatim to read the asset from disk, so they should keep their case.
pub trait AssetGraph {
    /// Direct dependencies of `asset`. Unknown assets have none.
    fn dependencies(&self, asset: &str) -> BuildResult<Vec<String>>;
}

/// An [`AssetGraph`] backed by a [`DependencyTable`].
///
/// Lookups normalize the asset path, so `Assets\Main.unity` and
/// `assets/main.unity` hit the same record.
///
/// # Example
///
/// ```
/// use bale_builder::{AssetGraph, MemoryAssetGraph};
///
/// let mut graph = MemoryAssetGraph::new();
/// graph.insert("Assets/Main.unity", &["Assets/Mat/Rock.mat"]);
/// assert_eq!(graph.dependencies("assets/main.unity").unwrap(), vec!["Assets/Mat/Rock.mat"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetGraph {
    table: DependencyTable,
}

impl MemoryAssetGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an existing table.
    pub fn from_table(table: &DependencyTable) -> Self {
        let mut graph = Self::new();
        for (key, deps) in table.iter() {
            graph.table.insert(normalize_path(key), deps.iter().cloned());
        }
        graph
    }

    /// Parse a `key|dep,dep` listing.
    pub fn parse(text: &str) -> BuildResult<Self> {
        let table = DependencyTable::parse(text).map_err(|source| BuildError::Format {
            context: "dependency listing".to_string(),
            source,
        })?;
        Ok(Self::from_table(&table))
    }

    /// Read a `key|dep,dep` listing from disk.
    pub fn load(path: &Path) -> BuildResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::parse(&text)
    }

    /// Set the direct dependencies of `asset`.
    pub fn insert(&mut self, asset: &str, deps: &[&str]) -> &mut Self {
        self.table
            .insert(normalize_path(asset), deps.iter().map(|d| d.to_string()));
        self
    }

    /// Number of assets with a record.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no asset has a record.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl AssetGraph for MemoryAssetGraph {
    fn dependencies(&self, asset: &str) -> BuildResult<Vec<String>> {
        Ok(self.table.get(&normalize_path(asset)).to_vec())
    }
}
