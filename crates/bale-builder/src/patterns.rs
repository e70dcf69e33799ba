//! Include and exclude pattern expansion.
//!
//! An entry is either a plain path (a file or a directory, relative to the
//! project root) or a glob. A glob is split at its first component holding a
//! wildcard: the part before is the walk root, the rest is matched with `wax`
//! against paths relative to that root. Bad globs and missing paths are
//! logged and skipped.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use bale_core::AssetKind;
use bale_core::name::normalize_path;
use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '<', '>'];

/// Check if an entry uses glob syntax.
pub fn is_glob(entry: &str) -> bool {
    entry.contains(GLOB_CHARS)
}

/// Split a glob into its longest wildcard-free directory and the remainder.
///
/// ```
/// use bale_builder::patterns::split_glob;
///
/// assert_eq!(split_glob("Assets/UI/**/*.png"), ("Assets/UI".to_string(), "**/*.png".to_string()));
/// assert_eq!(split_glob("*.mat"), (String::new(), "*.mat".to_string()));
/// ```
pub fn split_glob(entry: &str) -> (String, String) {
    let unified = entry.trim().replace('\\', "/");
    let components: Vec<&str> = unified
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    let split = components
        .iter()
        .position(|c| is_glob(c))
        .unwrap_or(components.len());

    (components[..split].join("/"), components[split..].join("/"))
}

/// Convert a path relative to the project root into an asset path.
pub fn to_asset_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand include entries into a sorted, de-duplicated list of packable
/// asset paths.
pub fn expand_includes(project_root: &Path, entries: &[String]) -> Vec<String> {
    let mut out = BTreeSet::new();

    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if is_glob(entry) {
            expand_glob(project_root, entry, &mut out);
            continue;
        }

        let asset = to_asset_path(Path::new(&entry.replace('\\', "/")));
        let full = project_root.join(&asset);
        if full.is_file() {
            out.insert(asset);
        } else if full.is_dir() {
            walk_files(project_root, &full, &mut out);
        } else {
            tracing::warn!("Include entry '{}' does not exist, skipping", entry);
        }
    }

    out.into_iter()
        .filter(|path| {
            let packable = AssetKind::of(path).is_packable();
            if !packable {
                tracing::trace!("Dropping non-packable asset {}", path);
            }
            packable
        })
        .collect()
}

fn walk_files(project_root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
    for entry in WalkDir::new(dir).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let rel = entry.path().strip_prefix(project_root).unwrap_or(entry.path());
                out.insert(to_asset_path(rel));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to list '{}': {}", dir.display(), e),
        }
    }
}

fn expand_glob(project_root: &Path, entry: &str, out: &mut BTreeSet<String>) {
    let (root, pattern) = split_glob(entry);
    let glob = match Glob::new(&pattern) {
        Ok(glob) => glob,
        Err(e) => {
            tracing::warn!("Invalid glob '{}': {}", entry, e);
            return;
        }
    };

    let walk_root = project_root.join(&root);
    if !walk_root.is_dir() {
        tracing::warn!("Glob root '{}' does not exist, skipping '{}'", root, entry);
        return;
    }

    let mut matched = 0usize;
    for item in WalkDir::new(&walk_root).sort_by_file_name() {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("Failed to list '{}': {}", walk_root.display(), e);
                continue;
            }
        };
        if !item.file_type().is_file() {
            continue;
        }

        let rel = to_asset_path(item.path().strip_prefix(&walk_root).unwrap_or(item.path()));
        if glob.matched(&CandidatePath::from(rel.as_str())).is_some() {
            let asset = if root.is_empty() {
                rel
            } else {
                format!("{}/{}", root, rel)
            };
            out.insert(asset);
            matched += 1;
        }
    }

    tracing::debug!("Glob '{}' matched {} files", entry, matched);
}

enum Rule {
    Path(String),
    Glob { root: String, glob: Glob<'static> },
}

/// Compiled exclude entries.
///
/// An asset is excluded when it equals an entry, lies under an excluded
/// directory, or lies under a glob's root and matches the rest of the glob.
/// Comparisons are case-insensitive.
pub struct ExcludeSet {
    rules: Vec<Rule>,
}

impl ExcludeSet {
    /// Compile exclude entries. Invalid globs are logged and ignored.
    pub fn new(entries: &[String]) -> Self {
        let mut rules = Vec::new();

        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            if !is_glob(entry) {
                rules.push(Rule::Path(normalize_path(entry)));
                continue;
            }

            let (root, pattern) = split_glob(entry);
            match Glob::new(&pattern.to_lowercase()) {
                Ok(glob) => rules.push(Rule::Glob {
                    root: normalize_path(&root),
                    glob: glob.into_owned(),
                }),
                Err(e) => tracing::warn!("Invalid exclude glob '{}': {}", entry, e),
            }
        }

        Self { rules }
    }

    /// Check if `asset` is excluded.
    pub fn matches(&self, asset: &str) -> bool {
        let asset = normalize_path(asset);

        self.rules.iter().any(|rule| match rule {
            Rule::Path(path) => {
                asset == *path
                    || asset
                        .strip_prefix(path.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Rule::Glob { root, glob } => {
                let rest = if root.is_empty() {
                    Some(asset.as_str())
                } else {
                    asset
                        .strip_prefix(root.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                };
                rest.is_some_and(|rest| glob.matched(&CandidatePath::from(rest)).is_some())
            }
        })
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for path in [
            "Assets/Scenes/Main.unity",
            "Assets/Scenes/Main.unity.meta",
            "Assets/UI/Atlas.png",
            "Assets/UI/Icons/Close.png",
            "Assets/UI/Icons/Close.psd",
            "Assets/Scripts/Player.cs",
        ] {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, path.as_bytes()).unwrap();
        }
        dir
    }

    #[test]
    fn test_is_glob() {
        assert!(is_glob("Assets/*.png"));
        assert!(is_glob("Assets/{a,b}"));
        assert!(!is_glob("Assets/UI"));
    }

    #[test]
    fn test_expand_directory_drops_non_packable() {
        let dir = project();
        let found = expand_includes(dir.path(), &["Assets".to_string()]);
        assert_eq!(
            found,
            vec![
                "Assets/Scenes/Main.unity",
                "Assets/UI/Atlas.png",
                "Assets/UI/Icons/Close.png",
                "Assets/UI/Icons/Close.psd",
            ]
        );
    }

    #[test]
    fn test_expand_glob() {
        let dir = project();
        let found = expand_includes(dir.path(), &["Assets/UI/**/*.png".to_string()]);
        assert_eq!(found, vec!["Assets/UI/Atlas.png", "Assets/UI/Icons/Close.png"]);
    }

    #[test]
    fn test_expand_skips_missing_and_dedups() {
        let dir = project();
        let found = expand_includes(
            dir.path(),
            &[
                "Assets/Missing.png".to_string(),
                "Assets/UI/Atlas.png".to_string(),
                "Assets/UI/*.png".to_string(),
            ],
        );
        assert_eq!(found, vec!["Assets/UI/Atlas.png"]);
    }

    #[test]
    fn test_exclude_rules() {
        let excludes = ExcludeSet::new(&[
            "Assets/UI/Icons".to_string(),
            "Assets/Scenes/*.unity".to_string(),
            "Assets/Textures/Rock.png".to_string(),
        ]);
        assert_eq!(excludes.len(), 3);

        assert!(excludes.matches("Assets/UI/Icons/Close.png"));
        assert!(!excludes.matches("Assets/UI/IconsExtra/Close.png"));
        assert!(excludes.matches("Assets/Scenes/Main.unity"));
        assert!(!excludes.matches("Assets/Scenes/Sub/Level.unity"));
        assert!(excludes.matches("assets/textures/rock.png"));
        assert!(!excludes.matches("Assets/UI/Atlas.png"));
    }
}
