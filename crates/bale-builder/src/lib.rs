//! Bale Builder - offline bundle partitioning and packing.
//!
//! A build expands the configured include/exclude rules into a candidate set,
//! follows each candidate's dependencies through an [`AssetGraph`], and
//! partitions the assets into file, directory and custom bundles. The
//! [`BuildTask`] then packs the partition, writes the bundle dependency index
//! and a [`Manifest`], and [`publish`] uploads what changed.
//!
//! # Example
//!
//! ```
//! use bale_builder::{BuildConfig, BuildTask, MemoryAssetGraph};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::create_dir_all(dir.path().join("Assets/Tex")).unwrap();
//! std::fs::write(dir.path().join("Assets/Main.unity"), b"scene").unwrap();
//! std::fs::write(dir.path().join("Assets/Tex/Rock.png"), b"pixels").unwrap();
//!
//! let mut graph = MemoryAssetGraph::new();
//! graph.insert("Assets/Main.unity", &["Assets/Tex/Rock.png"]);
//!
//! let config = BuildConfig::new(dir.path()).include(["Assets/Main.unity"]);
//! let report = BuildTask::new(config, graph).run().unwrap();
//! assert_eq!(report.bundle_count(), 2);
//! assert_eq!(report.manifest.len(), 3);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod packer;
pub mod patterns;
pub mod publish;
pub mod source;
pub mod task;

pub use config::BuildConfig;
pub use error::{BuildError, BuildResult};
pub use graph::{BundleEntry, BundleKind, DependencyBuilder, Partition};
pub use manifest::{ChangeKind, Manifest, ManifestChange, ManifestEntry};
pub use packer::{ArchivePacker, BundlePacker};
pub use patterns::ExcludeSet;
pub use publish::{DirectoryStore, ObjectStore, PublishReport, publish};
pub use source::{AssetGraph, MemoryAssetGraph};
pub use task::{BuildReport, BuildTask};
