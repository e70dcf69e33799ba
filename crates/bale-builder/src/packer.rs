//! Writing bundles to disk.

use std::path::Path;

use bale_core::ArchiveWriter;
use bale_core::name::object_key;

use crate::error::{BuildError, BuildResult};
use crate::graph::BundleEntry;

/// Turns one partition entry into a bundle file.
pub trait BundlePacker {
    /// Write bundle `name` holding `entry`'s contents to `output`.
    ///
    /// Asset paths are relative to `project_root`.
    fn pack(&self, name: &str, entry: &BundleEntry, project_root: &Path, output: &Path) -> BuildResult<()>;
}

/// Packs bundles into the bale archive format.
///
/// Each asset is stored under its object key. Folded assets are written
/// into the bundle next to its own assets. An asset that cannot be read is
/// left out with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePacker;

impl ArchivePacker {
    /// Create a packer.
    pub fn new() -> Self {
        Self
    }
}

impl BundlePacker for ArchivePacker {
    fn pack(&self, name: &str, entry: &BundleEntry, project_root: &Path, output: &Path) -> BuildResult<()> {
        let mut writer = ArchiveWriter::new();

        for asset in entry.contents() {
            let path = project_root.join(asset);
            match std::fs::read(&path) {
                Ok(bytes) => {
                    writer.insert(object_key(asset), bytes);
                }
                Err(e) => tracing::warn!("Skipping unreadable asset {} in {}: {}", asset, name, e),
            }
        }

        let bytes = writer.finish().map_err(|source| BuildError::Format {
            context: format!("bundle {}", name),
            source,
        })?;
        std::fs::write(output, bytes).map_err(|e| BuildError::io(output, e))?;

        tracing::trace!("Packed {} ({} objects)", name, writer.len());
        Ok(())
    }
}
