//! Offline dependency analysis.
//!
//! [`DependencyBuilder`] turns the include/exclude rules of a
//! [`BuildConfig`] into a [`Partition`]: every directly included asset gets
//! its own file bundle, and the assets they depend on are grouped into
//! directory or custom bundles, or left unowned so the packer folds them into
//! whichever bundle references them.
//!
//! Assets are identified by their normalized path; the first spelling seen is
//! kept for reading them back from disk. The same inputs always produce the
//! same partition and the same diagnostic log.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bale_core::name::{bundle_name, custom_bundle_name, directory_bundle_name, normalize_path};
use bale_core::profiling::profile_function;
use bale_core::{AssetKind, DependencyTable};

use crate::config::BuildConfig;
use crate::patterns::{ExcludeSet, expand_includes};
use crate::source::AssetGraph;

/// How a bundle was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BundleKind {
    /// One directly included asset.
    File,
    /// Dependency assets sharing a parent directory.
    Directory,
    /// Dependency assets sharing an explicit tag.
    Custom,
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleKind::File => write!(f, "file"),
            BundleKind::Directory => write!(f, "directory"),
            BundleKind::Custom => write!(f, "custom"),
        }
    }
}

/// One bundle of the partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    kind: BundleKind,
    source: String,
    assets: Vec<String>,
    folded: Vec<String>,
    dependencies: Vec<String>,
}

impl BundleEntry {
    fn new(kind: BundleKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            assets: Vec::new(),
            folded: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// How the bundle was formed.
    pub fn kind(&self) -> BundleKind {
        self.kind
    }

    /// The asset path, directory or tag the bundle is named after.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Assets owned by this bundle, in classification order.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Unowned assets this bundle references, packed alongside its own.
    pub fn folded(&self) -> &[String] {
        &self.folded
    }

    /// Bundles that must be loaded before this one.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Every asset written into the bundle: owned first, then folded.
    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.assets
            .iter()
            .chain(self.folded.iter())
            .map(String::as_str)
    }
}

/// The result of partitioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    bundles: BTreeMap<String, BundleEntry>,
    owners: BTreeMap<String, String>,
    ref_counts: BTreeMap<String, usize>,
    log: Vec<String>,
}

impl Partition {
    /// All bundles keyed by identifier.
    pub fn bundles(&self) -> &BTreeMap<String, BundleEntry> {
        &self.bundles
    }

    /// Look up a bundle.
    pub fn get(&self, name: &str) -> Option<&BundleEntry> {
        self.bundles.get(name)
    }

    /// Check if a bundle exists.
    pub fn contains(&self, name: &str) -> bool {
        self.bundles.contains_key(name)
    }

    /// Number of bundles.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    /// Check if nothing was partitioned.
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Identifier of the bundle owning `asset`, if any.
    pub fn bundle_of(&self, asset: &str) -> Option<&str> {
        self.owners.get(&normalize_path(asset)).map(String::as_str)
    }

    /// Number of distinct included assets whose closure contains `asset`.
    pub fn ref_count(&self, asset: &str) -> usize {
        self.ref_counts.get(&normalize_path(asset)).copied().unwrap_or(0)
    }

    /// Diagnostic log, one decision per line.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Bundle dependency index, as written to `bundles.deps`.
    pub fn dependency_table(&self) -> DependencyTable {
        let mut table = DependencyTable::new();
        for (name, entry) in &self.bundles {
            table.insert(name.clone(), entry.dependencies.iter().cloned());
        }
        table
    }
}

/// Partitions a project's assets into bundles.
///
/// # Example
///
/// ```
/// use bale_builder::{BuildConfig, DependencyBuilder, MemoryAssetGraph};
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::create_dir_all(dir.path().join("Assets")).unwrap();
/// std::fs::write(dir.path().join("Assets/Main.unity"), b"scene").unwrap();
///
/// let mut graph = MemoryAssetGraph::new();
/// graph.insert("Assets/Main.unity", &["Assets/Mat/Rock.mat"]);
///
/// let config = BuildConfig::new(dir.path()).include(["Assets/Main.unity"]);
/// let partition = DependencyBuilder::new(&config, &graph).build();
///
/// // The material is only used by the scene, so it is folded into it.
/// assert_eq!(partition.len(), 1);
/// assert_eq!(partition.bundle_of("Assets/Mat/Rock.mat"), None);
/// ```
pub struct DependencyBuilder<'a> {
    config: &'a BuildConfig,
    graph: &'a dyn AssetGraph,
}

impl<'a> DependencyBuilder<'a> {
    /// Create a builder over `config` and `graph`.
    pub fn new(config: &'a BuildConfig, graph: &'a dyn AssetGraph) -> Self {
        Self { config, graph }
    }

    /// Included assets minus excluded ones, scenes first, each class sorted.
    pub fn candidates(&self) -> Vec<String> {
        let excludes = ExcludeSet::new(&self.config.exclude);
        let mut candidates: Vec<String> = expand_includes(&self.config.project_root, &self.config.include)
            .into_iter()
            .filter(|path| {
                let excluded = excludes.matches(path);
                if excluded {
                    tracing::trace!("Excluded {}", path);
                }
                !excluded
            })
            .collect();

        candidates.sort_by(|a, b| {
            let a_scene = AssetKind::of(a).is_scene();
            let b_scene = AssetKind::of(b).is_scene();
            b_scene.cmp(&a_scene).then_with(|| a.cmp(b))
        });
        candidates
    }

    /// Run the analysis.
    pub fn build(&self) -> Partition {
        profile_function!();

        let candidates = self.candidates();
        let mut analysis = Analysis::new(self.graph);

        // Closures and reference counts
        let mut candidate_keys = BTreeSet::new();
        let mut closures = Vec::with_capacity(candidates.len());
        let mut scene_refs: BTreeMap<String, usize> = BTreeMap::new();
        let mut ref_counts: BTreeMap<String, usize> = BTreeMap::new();

        for candidate in &candidates {
            let key = analysis.intern(candidate);
            candidate_keys.insert(key.clone());

            let closure = analysis.closure(&key);
            let is_scene = AssetKind::of(candidate).is_scene();
            for dep in &closure {
                *ref_counts.entry(dep.clone()).or_default() += 1;
                if is_scene {
                    *scene_refs.entry(dep.clone()).or_default() += 1;
                }
            }
            closures.push((key, closure));
        }

        let tags: BTreeMap<String, &str> = self
            .config
            .tags
            .iter()
            .map(|(path, tag)| (normalize_path(path), tag.as_str()))
            .collect();

        let mut partition = Partition {
            ref_counts,
            ..Partition::default()
        };

        for ((key, _), candidate) in closures.iter().zip(&candidates) {
            let name = bundle_name(candidate);
            if let Some(existing) = partition.bundles.get(&name) {
                tracing::warn!(
                    "{} shares bundle {} with {}",
                    candidate,
                    name,
                    existing.source
                );
            }
            partition
                .bundles
                .entry(name.clone())
                .or_insert_with(|| BundleEntry::new(BundleKind::File, candidate.clone()))
                .assets
                .push(candidate.clone());
            partition.owners.insert(key.clone(), name.clone());
            partition.record(format!("file {} {}", name, candidate));
        }

        // Classification
        let mut visited = BTreeSet::new();
        for ((_, closure), candidate) in closures.iter().zip(&candidates) {
            for dep in closure {
                if candidate_keys.contains(dep) || !visited.insert(dep.clone()) {
                    continue;
                }
                let path = analysis.spelling(dep).to_string();
                let kind = AssetKind::of(&path);

                if let Some(tag) = tags.get(dep) {
                    let name = custom_bundle_name(tag);
                    partition.assign(&name, BundleKind::Custom, tag, dep, &path);
                    partition.record(format!("custom {} {} tag={}", name, path, tag));
                } else if kind == AssetKind::Shader {
                    partition.record(format!("skip-shader {} via {}", path, candidate));
                } else if kind == AssetKind::Material
                    && self.config.merge_material
                    && scene_refs.get(dep).copied() == Some(1)
                {
                    partition.record(format!("merge-material {} via {}", path, candidate));
                } else {
                    let dir = parent_dir(&path);
                    let name = directory_bundle_name(dir);
                    partition.assign(&name, BundleKind::Directory, dir, dep, &path);
                    partition.record(format!("directory {} {}", name, path));
                }
            }
        }

        if self.config.merge_single {
            partition.merge_single(&analysis);
        }

        partition.link(&analysis);

        tracing::debug!(
            "Partitioned {} candidates into {} bundles",
            candidates.len(),
            partition.len()
        );
        partition
    }
}

impl Partition {
    fn record(&mut self, line: String) {
        tracing::trace!("{}", line);
        self.log.push(line);
    }

    fn assign(&mut self, name: &str, kind: BundleKind, source: &str, key: &str, path: &str) {
        self.bundles
            .entry(name.to_string())
            .or_insert_with(|| BundleEntry::new(kind, source))
            .assets
            .push(path.to_string());
        self.owners.insert(key.to_string(), name.to_string());
    }

    fn merge_single(&mut self, analysis: &Analysis<'_>) {
        let doomed: Vec<String> = self
            .bundles
            .iter()
            .filter(|(_, entry)| entry.kind == BundleKind::Directory)
            .filter(|(_, entry)| {
                entry.assets.iter().all(|asset| {
                    self.ref_counts
                        .get(&normalize_path(asset))
                        .copied()
                        .unwrap_or(0)
                        <= 1
                })
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in doomed {
            let Some(entry) = self.bundles.remove(&name) else {
                continue;
            };
            for asset in &entry.assets {
                self.owners.remove(&analysis.key_of(asset));
            }
            self.record(format!("merge-single {} {}", name, entry.source));
        }
    }

    /// Fill in folded assets and bundle dependencies by walking each
    /// bundle's closure up to the assets owned by other bundles.
    fn link(&mut self, analysis: &Analysis<'_>) {
        let names: Vec<String> = self.bundles.keys().cloned().collect();

        for name in names {
            let Some(entry) = self.bundles.get(&name) else {
                continue;
            };

            let mut seen = BTreeSet::new();
            let mut stack: Vec<String> = entry
                .assets
                .iter()
                .rev()
                .map(|asset| analysis.key_of(asset))
                .collect();
            let mut folded = Vec::new();
            let mut dependencies = Vec::new();

            while let Some(key) = stack.pop() {
                if !seen.insert(key.clone()) {
                    continue;
                }

                match self.owners.get(&key) {
                    Some(owner) if *owner != name => {
                        if !dependencies.contains(owner) {
                            dependencies.push(owner.clone());
                        }
                        continue;
                    }
                    Some(_) => {}
                    None => folded.push(analysis.spelling(&key).to_string()),
                }

                stack.extend(analysis.direct(&key).iter().rev().cloned());
            }

            if let Some(entry) = self.bundles.get_mut(&name) {
                entry.folded = folded;
                entry.dependencies = dependencies;
            }
        }
    }
}

/// Cached view of the asset graph, keyed by normalized path.
struct Analysis<'a> {
    graph: &'a dyn AssetGraph,
    spellings: BTreeMap<String, String>,
    direct: BTreeMap<String, Vec<String>>,
}

impl<'a> Analysis<'a> {
    fn new(graph: &'a dyn AssetGraph) -> Self {
        Self {
            graph,
            spellings: BTreeMap::new(),
            direct: BTreeMap::new(),
        }
    }

    fn key_of(&self, path: &str) -> String {
        normalize_path(path)
    }

    /// Register a spelling for `path` and return its key.
    fn intern(&mut self, path: &str) -> String {
        let key = normalize_path(path);
        self.spellings
            .entry(key.clone())
            .or_insert_with(|| path.to_string());
        key
    }

    fn spelling<'k>(&'k self, key: &'k str) -> &'k str {
        self.spellings.get(key).map(String::as_str).unwrap_or(key)
    }

    fn direct(&self, key: &str) -> &[String] {
        self.direct.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Query and cache the direct dependencies of `key`.
    fn resolve(&mut self, key: &str) {
        if self.direct.contains_key(key) {
            return;
        }

        let path = self.spelling(key).to_string();
        let deps = match self.graph.dependencies(&path) {
            Ok(deps) => deps,
            Err(e) => {
                tracing::warn!("Skipping dependencies of {}: {}", path, e);
                Vec::new()
            }
        };

        let mut keys = Vec::with_capacity(deps.len());
        for dep in deps {
            if !AssetKind::of(&dep).is_packable() {
                continue;
            }
            let dep_key = self.intern(&dep);
            if dep_key.is_empty() || dep_key == key || keys.contains(&dep_key) {
                continue;
            }
            keys.push(dep_key);
        }
        self.direct.insert(key.to_string(), keys);
    }

    /// Transitive dependencies of `key` in discovery order, excluding `key`.
    fn closure(&mut self, key: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        seen.insert(key.to_string());
        let mut out = Vec::new();

        self.resolve(key);
        let mut stack: Vec<String> = self.direct(key).iter().rev().cloned().collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            self.resolve(&next);
            stack.extend(self.direct(&next).iter().rev().cloned());
            out.push(next);
        }

        out
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}
