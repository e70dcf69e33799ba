//! Builder settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bale_core::Settings;
use bale_core::config::string_list;
use serde::Deserialize;

use crate::error::{BuildError, BuildResult};

/// Inputs of a build.
///
/// | Key              | Default                          |
/// |------------------|----------------------------------|
/// | `include`        | empty (array or comma list)      |
/// | `exclude`        | empty (array or comma list)      |
/// | `merge_material` | `true`                           |
/// | `merge_single`   | `false`                          |
/// | `offset_factor`  | `0`                              |
/// | `output_dir`     | `"bundles"`                      |
/// | `tag."<path>"`   | custom bundle tag for `<path>`   |
///
/// The project root is not a settings key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory every asset path is relative to.
    #[serde(skip)]
    pub project_root: PathBuf,
    /// Files, directories or globs to bundle.
    #[serde(deserialize_with = "string_list")]
    pub include: Vec<String>,
    /// Files, directories or globs removed from the include set.
    #[serde(deserialize_with = "string_list")]
    pub exclude: Vec<String>,
    /// Explicit custom bundle tag per asset path.
    #[serde(rename = "tag")]
    pub tags: BTreeMap<String, String>,
    /// Fold a material used by a single scene into that scene's bundle.
    pub merge_material: bool,
    /// Drop directory bundles that only one bundle references.
    pub merge_single: bool,
    /// Header offset factor. 0 disables the transform.
    pub offset_factor: u32,
    /// Where bundles and the manifest are written. Relative paths are
    /// resolved against the project root.
    pub output_dir: PathBuf,
}

impl BuildConfig {
    /// Create a config with default settings and nothing included.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            tags: BTreeMap::new(),
            merge_material: true,
            merge_single: false,
            offset_factor: 0,
            output_dir: PathBuf::from("bundles"),
        }
    }

    /// Read the builder keys from `settings`. Missing keys keep their defaults.
    pub fn from_settings(project_root: impl Into<PathBuf>, settings: &Settings) -> BuildResult<Self> {
        let mut config: Self = settings
            .view()
            .map_err(|source| BuildError::InvalidConfig { source })?;
        config.project_root = project_root.into();
        config.tags.retain(|path, tag| !path.is_empty() && !tag.is_empty());
        Ok(config)
    }

    /// Add include entries.
    pub fn include<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Add exclude entries.
    pub fn exclude<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Tag an asset into a custom bundle.
    pub fn tag(mut self, path: impl Into<String>, tag: impl Into<String>) -> Self {
        self.tags.insert(path.into(), tag.into());
        self
    }

    /// Set `merge_material`.
    pub fn with_merge_material(mut self, enabled: bool) -> Self {
        self.merge_material = enabled;
        self
    }

    /// Set `merge_single`.
    pub fn with_merge_single(mut self, enabled: bool) -> Self {
        self.merge_single = enabled;
        self
    }

    /// Set the offset factor.
    pub fn with_offset_factor(mut self, factor: u32) -> Self {
        self.offset_factor = factor;
        self
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The output directory, resolved against the project root.
    pub fn output_path(&self) -> PathBuf {
        resolve(&self.project_root, &self.output_dir)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
