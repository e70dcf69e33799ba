//! Runtime loader settings.

use std::path::PathBuf;

use bale_core::{FormatResult, Settings};
use serde::Deserialize;

/// Settings for the [`ResourceLoader`](crate::ResourceLoader).
///
/// | Key              | Default     |
/// |------------------|-------------|
/// | `bundle_mode`    | `true`      |
/// | `reference_mode` | `false`     |
/// | `offset_factor`  | `0`         |
/// | `bundle_dir`     | `"bundles"` |
/// | `catalog_dir`    | `"."`       |
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Load objects out of bundles. When off, objects are read straight from the catalog.
    pub bundle_mode: bool,
    /// Attach auto-release markers to loaded objects.
    pub reference_mode: bool,
    /// Header offset factor the bundles were built with.
    pub offset_factor: u32,
    /// Directory holding the built bundles.
    pub bundle_dir: PathBuf,
    /// Root directory for direct (non-bundle) loads.
    pub catalog_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bundle_mode: true,
            reference_mode: false,
            offset_factor: 0,
            bundle_dir: PathBuf::from("bundles"),
            catalog_dir: PathBuf::from("."),
        }
    }
}

impl RuntimeConfig {
    /// Read the runtime keys from `settings`, falling back to the defaults.
    pub fn from_settings(settings: &Settings) -> FormatResult<Self> {
        settings.view()
    }

    /// Direct mode: bypass bundles entirely.
    pub fn direct() -> Self {
        Self {
            bundle_mode: false,
            ..Self::default()
        }
    }

    /// Set reference mode.
    pub fn with_reference_mode(mut self, enabled: bool) -> Self {
        self.reference_mode = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_settings(&Settings::new()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.bundle_mode);
        assert!(!config.reference_mode);
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings::parse(
            "bundle_mode = false\nreference_mode = true\noffset_factor = 5\nbundle_dir = \"out/b\"\nmerge_single = true\n",
        )
        .unwrap();
        let config = RuntimeConfig::from_settings(&settings).unwrap();
        assert!(!config.bundle_mode);
        assert!(config.reference_mode);
        assert_eq!(config.offset_factor, 5);
        assert_eq!(config.bundle_dir, PathBuf::from("out/b"));
        assert_eq!(config.catalog_dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_value() {
        let settings = Settings::parse("offset_factor = \"lots\"\n").unwrap();
        assert!(RuntimeConfig::from_settings(&settings).is_err());
    }
}
