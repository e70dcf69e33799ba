//! Build manifests.
//!
//! A manifest lists every published file as a `name|hash|size` line. The
//! dependency index always comes first, followed by the bundles ordered so
//! that a bundle appears after the bundles it depends on where possible.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use bale_core::dependency::INDEX_FILE_NAME;
use bale_core::{DependencyTable, FormatError, FormatResult};

use crate::error::{BuildError, BuildResult};

/// File name of the manifest inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "manifest";

/// File name of the manifest backup taken before each build.
pub const BACKUP_FILE_NAME: &str = "manifest.bak";

/// One published file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name relative to the output directory.
    pub name: String,
    /// Hex BLAKE3 hash of the file.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
}

impl ManifestEntry {
    /// Create an entry.
    pub fn new(name: impl Into<String>, hash: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            size,
        }
    }

    /// Hash and size the bytes of a file.
    pub fn of_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(name, blake3::hash(bytes).to_hex().to_string(), bytes.len() as u64)
    }

    /// The remote key the file is published under.
    pub fn remote_key(&self) -> String {
        format!("{}@{}", self.name, self.hash)
    }
}

/// How an entry differs between two manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    /// Present only in the newer manifest.
    Added,
    /// Present in both with different hashes.
    Modified,
    /// Present only in the older manifest.
    Deleted,
}

/// One difference between two manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestChange {
    /// Added, modified or deleted.
    pub kind: ChangeKind,
    /// File name.
    pub name: String,
    /// Hash in the newer manifest, or the older one for deletions.
    pub hash: String,
}

/// An ordered list of published files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest with the index first and the bundles in the given order.
    pub fn with_index(index: ManifestEntry, bundles: impl IntoIterator<Item = ManifestEntry>) -> Self {
        let mut manifest = Self::new();
        manifest.push(index);
        for entry in bundles {
            manifest.push(entry);
        }
        manifest
    }

    /// Parse manifest text.
    pub fn parse(text: &str) -> FormatResult<Self> {
        let mut manifest = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let invalid = |message: &str| FormatError::InvalidLine {
                line: idx + 1,
                message: message.to_string(),
            };

            let mut parts = line.split('|');
            let (Some(name), Some(hash), Some(size), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(invalid("expected 'name|hash|size'"));
            };
            let name = name.trim();
            let hash = hash.trim();
            if name.is_empty() || hash.is_empty() {
                return Err(invalid("empty name or hash"));
            }
            let size = size.trim().parse().map_err(|_| invalid("invalid size"))?;

            manifest.push(ManifestEntry::new(name, hash, size));
        }

        Ok(manifest)
    }

    /// Read a manifest file. A missing file yields `None`.
    pub fn load(path: &Path) -> BuildResult<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BuildError::io(path, e)),
        };

        Self::parse(&text)
            .map(Some)
            .map_err(|source| BuildError::Format {
                context: path.display().to_string(),
                source,
            })
    }

    /// Write the manifest to disk.
    pub fn save(&self, path: &Path) -> BuildResult<()> {
        std::fs::write(path, self.to_string()).map_err(|e| BuildError::io(path, e))
    }

    /// Append an entry, replacing any earlier entry with the same name.
    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.retain(|e| e.name != entry.name);
        self.entries.push(entry);
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Iterate the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    /// Names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of every listed file.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Changes from `previous` to `self`.
    ///
    /// Added and modified entries follow `self`'s order; deletions follow
    /// `previous`'s order and come last.
    pub fn diff(&self, previous: &Manifest) -> Vec<ManifestChange> {
        let mut changes = Vec::new();

        for entry in &self.entries {
            let kind = match previous.get(&entry.name) {
                None => ChangeKind::Added,
                Some(old) if old.hash != entry.hash => ChangeKind::Modified,
                Some(_) => continue,
            };
            changes.push(ManifestChange {
                kind,
                name: entry.name.clone(),
                hash: entry.hash.clone(),
            });
        }

        for old in &previous.entries {
            if self.get(&old.name).is_none() {
                changes.push(ManifestChange {
                    kind: ChangeKind::Deleted,
                    name: old.name.clone(),
                    hash: old.hash.clone(),
                });
            }
        }

        changes
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}|{}|{}", entry.name, entry.hash, entry.size)?;
        }
        Ok(())
    }
}

/// Order bundles by dependency tier.
///
/// Each round emits, sorted by name, every bundle whose dependencies were all
/// emitted in earlier rounds. When a cycle blocks progress, the bundle with
/// the fewest unresolved dependencies (then the smallest name) is emitted on
/// its own and the rounds continue. Dependencies outside `names` are ignored.
pub fn tier_order(names: &[String], table: &DependencyTable) -> Vec<String> {
    let all: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = all
        .iter()
        .map(|name| {
            let deps = table
                .get(name)
                .iter()
                .map(String::as_str)
                .filter(|dep| dep != name && all.contains(dep))
                .collect();
            (*name, deps)
        })
        .collect();

    let mut out = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut tier: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if tier.is_empty() {
            let Some(name) = remaining
                .iter()
                .min_by(|(a_name, a), (b_name, b)| a.len().cmp(&b.len()).then_with(|| a_name.cmp(b_name)))
                .map(|(name, _)| *name)
            else {
                break;
            };
            tracing::debug!("Dependency cycle through {}, breaking it", name);
            tier.push(name);
        }

        for name in &tier {
            remaining.remove(name);
        }
        for deps in remaining.values_mut() {
            for name in &tier {
                deps.remove(name);
            }
        }
        out.extend(tier.into_iter().map(String::from));
    }

    out
}

/// Check if `name` is the dependency index rather than a bundle.
pub fn is_index(name: &str) -> bool {
    name == INDEX_FILE_NAME
}
