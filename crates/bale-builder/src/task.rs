//! The build pipeline.
//!
//! [`BuildTask::run`] partitions the project, packs every bundle into a
//! staging directory, applies the offset transform, hashes the results and
//! commits them next to a fresh manifest. The previous manifest is backed up
//! first; if any later step fails, staging is discarded and the backup is put
//! back.

use std::fs;
use std::path::Path;

use bale_core::dependency::INDEX_FILE_NAME;
use bale_core::offset;
use bale_core::profiling::{profile_function, profile_scope};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::graph::{DependencyBuilder, Partition};
use crate::manifest::{self, BACKUP_FILE_NAME, MANIFEST_FILE_NAME, Manifest, ManifestChange, ManifestEntry};
use crate::packer::{ArchivePacker, BundlePacker};
use crate::source::AssetGraph;

/// Name of the staging directory inside the output directory.
pub const STAGING_DIR_NAME: &str = ".staging";

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The partition that was packed.
    pub partition: Partition,
    /// The manifest that was written.
    pub manifest: Manifest,
    /// Differences from the previous manifest.
    pub changes: Vec<ManifestChange>,
    /// Bundles deleted because they are no longer produced.
    pub removed: Vec<String>,
}

impl BuildReport {
    /// Number of bundles written.
    pub fn bundle_count(&self) -> usize {
        self.partition.len()
    }
}

/// One packaging run.
pub struct BuildTask {
    config: BuildConfig,
    graph: Box<dyn AssetGraph>,
    packer: Box<dyn BundlePacker>,
}

impl BuildTask {
    /// Create a task using the [`ArchivePacker`].
    pub fn new(config: BuildConfig, graph: impl AssetGraph + 'static) -> Self {
        Self {
            config,
            graph: Box::new(graph),
            packer: Box::new(ArchivePacker::new()),
        }
    }

    /// Use a different packer.
    pub fn with_packer(mut self, packer: impl BundlePacker + 'static) -> Self {
        self.packer = Box::new(packer);
        self
    }

    /// The task's settings.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Partition the project without writing anything.
    pub fn partition(&self) -> Partition {
        DependencyBuilder::new(&self.config, self.graph.as_ref()).build()
    }

    /// Run the whole pipeline.
    pub fn run(&self) -> BuildResult<BuildReport> {
        profile_function!();

        let output = self.config.output_path();
        fs::create_dir_all(&output).map_err(|e| BuildError::io(&output, e))?;

        let manifest_path = output.join(MANIFEST_FILE_NAME);
        let backup_path = output.join(BACKUP_FILE_NAME);

        let previous = load_previous(&manifest_path, &backup_path)?;
        let had_manifest = manifest_path.is_file();
        if had_manifest {
            fs::copy(&manifest_path, &backup_path).map_err(|e| BuildError::io(&backup_path, e))?;
        }

        let staging = output.join(STAGING_DIR_NAME);
        match self.execute(&output, &staging, &previous) {
            Ok(report) => {
                tracing::info!(
                    "Built {} bundles into {} ({} changes)",
                    report.bundle_count(),
                    output.display(),
                    report.changes.len()
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Build failed, rolling back: {}", e);
                rollback(&staging, &manifest_path, &backup_path, had_manifest);
                Err(BuildError::Aborted { source: Box::new(e) })
            }
        }
    }

    fn execute(&self, output: &Path, staging: &Path, previous: &Manifest) -> BuildResult<BuildReport> {
        if staging.exists() {
            fs::remove_dir_all(staging).map_err(|e| BuildError::io(staging, e))?;
        }
        fs::create_dir_all(staging).map_err(|e| BuildError::io(staging, e))?;

        let partition = {
            profile_scope!("partition");
            self.partition()
        };

        {
            profile_scope!("pack");
            for (name, entry) in partition.bundles() {
                let path = staging.join(name);
                self.packer
                    .pack(name, entry, &self.config.project_root, &path)?;

                if self.config.offset_factor > 0 {
                    offset::apply_file(&path, name, self.config.offset_factor)
                        .map_err(|e| BuildError::io(&path, e))?;
                }
            }
        }

        let table = partition.dependency_table();
        let index_path = staging.join(INDEX_FILE_NAME);
        fs::write(&index_path, table.to_string()).map_err(|e| BuildError::io(&index_path, e))?;

        let names: Vec<String> = partition.bundles().keys().cloned().collect();
        let ordered = manifest::tier_order(&names, &table);

        let index_entry = hash_file(&index_path, INDEX_FILE_NAME)?;
        let mut bundles = Vec::with_capacity(ordered.len());
        {
            profile_scope!("hash");
            for name in &ordered {
                bundles.push(hash_file(&staging.join(name), name)?);
            }
        }
        let manifest = Manifest::with_index(index_entry, bundles);

        // Commit
        for name in manifest.names() {
            let from = staging.join(name);
            let to = output.join(name);
            if to.exists() {
                fs::remove_file(&to).map_err(|e| BuildError::io(&to, e))?;
            }
            fs::rename(&from, &to).map_err(|e| BuildError::io(&from, e))?;
        }

        let mut removed = Vec::new();
        for name in previous.names() {
            if manifest.get(name).is_some() {
                continue;
            }
            let stale = output.join(name);
            if stale.is_file() {
                fs::remove_file(&stale).map_err(|e| BuildError::io(&stale, e))?;
                tracing::debug!("Removed stale bundle {}", name);
            }
            removed.push(name.to_string());
        }

        fs::remove_dir_all(staging).map_err(|e| BuildError::io(staging, e))?;
        manifest.save(&output.join(MANIFEST_FILE_NAME))?;

        let changes = manifest.diff(previous);
        Ok(BuildReport {
            partition,
            manifest,
            changes,
            removed,
        })
    }
}

/// Load the previous manifest, falling back to the backup when it is corrupt.
fn load_previous(manifest_path: &Path, backup_path: &Path) -> BuildResult<Manifest> {
    match Manifest::load(manifest_path) {
        Ok(Some(manifest)) => Ok(manifest),
        Ok(None) => Ok(Manifest::new()),
        Err(BuildError::Format { source, .. }) => {
            tracing::warn!("Manifest is corrupt ({}), restoring from backup", source);
            match Manifest::load(backup_path) {
                Ok(Some(backup)) => {
                    backup.save(manifest_path)?;
                    Ok(backup)
                }
                Ok(None) => {
                    tracing::warn!("No manifest backup, starting from an empty manifest");
                    remove_quietly(manifest_path);
                    Ok(Manifest::new())
                }
                Err(e) => {
                    tracing::warn!("Manifest backup is unusable too: {}", e);
                    remove_quietly(manifest_path);
                    Ok(Manifest::new())
                }
            }
        }
        Err(e) => Err(e),
    }
}

fn rollback(staging: &Path, manifest_path: &Path, backup_path: &Path, had_manifest: bool) {
    if staging.exists() {
        if let Err(e) = fs::remove_dir_all(staging) {
            tracing::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
        }
    }

    if had_manifest {
        if let Err(e) = fs::copy(backup_path, manifest_path) {
            tracing::error!("Failed to restore manifest backup: {}", e);
        }
    } else {
        remove_quietly(manifest_path);
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

fn hash_file(path: &Path, name: &str) -> BuildResult<ManifestEntry> {
    let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
    Ok(ManifestEntry::of_bytes(name, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BundleEntry;
    use crate::source::MemoryAssetGraph;

    struct FailingPacker;

    impl BundlePacker for FailingPacker {
        fn pack(&self, name: &str, _: &BundleEntry, _: &Path, _: &Path) -> BuildResult<()> {
            Err(BuildError::Pack {
                bundle: name.to_string(),
                message: "refused".to_string(),
            })
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Assets")).unwrap();
        fs::write(dir.path().join("Assets/Main.unity"), b"scene data").unwrap();
        dir
    }

    #[test]
    fn test_run_writes_index_first() {
        let dir = project();
        let config = BuildConfig::new(dir.path()).include(["Assets"]);
        let report = BuildTask::new(config, MemoryAssetGraph::new()).run().unwrap();

        let output = dir.path().join("bundles");
        assert_eq!(report.manifest.names().next(), Some(INDEX_FILE_NAME));
        assert!(output.join(INDEX_FILE_NAME).is_file());
        assert!(output.join(MANIFEST_FILE_NAME).is_file());
        assert!(!output.join(STAGING_DIR_NAME).exists());
        assert_eq!(report.bundle_count(), 1);
    }

    #[test]
    fn test_failed_pack_restores_backup() {
        let dir = project();
        let output = dir.path().join("bundles");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join(MANIFEST_FILE_NAME), "old.bundle|abc|3\n").unwrap();

        let config = BuildConfig::new(dir.path()).include(["Assets"]);
        let err = BuildTask::new(config, MemoryAssetGraph::new())
            .with_packer(FailingPacker)
            .run()
            .unwrap_err();

        assert!(matches!(err, BuildError::Aborted { .. }));
        assert_eq!(
            fs::read_to_string(output.join(MANIFEST_FILE_NAME)).unwrap(),
            "old.bundle|abc|3\n"
        );
        assert_eq!(
            fs::read_to_string(output.join(BACKUP_FILE_NAME)).unwrap(),
            "old.bundle|abc|3\n"
        );
        assert!(!output.join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn test_missing_dependency_is_skipped() {
        let dir = project();
        let mut graph = MemoryAssetGraph::new();
        graph.insert("Assets/Main.unity", &["Assets/Tex/Gone.png"]);

        let config = BuildConfig::new(dir.path()).include(["Assets"]);
        let report = BuildTask::new(config, graph).run().unwrap();
        assert_eq!(report.bundle_count(), 2);

        let output = dir.path().join("bundles");
        let scene_id = bale_core::name::bundle_name("Assets/Main.unity");
        let scene = bale_core::Archive::parse(&fs::read(output.join(&scene_id)).unwrap()).unwrap();
        assert!(scene.contains("assets/main.unity"));
        assert!(!scene.contains("assets/tex/gone"));
        assert!(report.manifest.get(&scene_id).is_some());
    }

    #[test]
    fn test_corrupt_manifest_restored_from_backup() {
        let dir = project();
        let output = dir.path().join("bundles");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join(MANIFEST_FILE_NAME), "garbage\n").unwrap();
        fs::write(output.join(BACKUP_FILE_NAME), "old.bundle|abc|3\n").unwrap();

        let previous =
            load_previous(&output.join(MANIFEST_FILE_NAME), &output.join(BACKUP_FILE_NAME)).unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(
            fs::read_to_string(output.join(MANIFEST_FILE_NAME)).unwrap(),
            "old.bundle|abc|3\n"
        );
    }
}
