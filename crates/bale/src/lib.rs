//! Bale - asset bundles for content-heavy applications
//!
//! Bale packages a project's assets into archive bundles offline and loads
//! them back at runtime with reference counting:
//!
//! - **Builder**: include/exclude expansion, dependency partitioning, packing,
//!   manifests and publishing (`builder` feature)
//! - **Runtime**: bundle registry, async load coalescing, typed object loading
//!   and auto-release (`runtime` feature)
//! - **Core**: bundle naming, the archive format and settings, shared by both
//!
//! # Quick Start
//!
//! ```
//! use bale::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::create_dir_all(dir.path().join("Assets")).unwrap();
//! std::fs::write(dir.path().join("Assets/Readme.txt"), "hello").unwrap();
//!
//! let config = BuildConfig::new(dir.path()).include(["Assets"]);
//! BuildTask::new(config, MemoryAssetGraph::new()).run().unwrap();
//!
//! let mut loader = ResourceLoader::from_config(RuntimeConfig {
//!     bundle_dir: dir.path().join("bundles"),
//!     ..RuntimeConfig::default()
//! });
//! loader.initialize().unwrap();
//!
//! let text = loader.load::<String>("Assets/Readme", false).unwrap().unwrap();
//! assert_eq!(text.as_str(), "hello");
//! ```

// Re-export core types
pub use bale_core as core;
pub use bale_core::{Archive, DependencyTable, NameResolver, Settings};

#[cfg(feature = "runtime")]
pub use bale_bundles as bundles;

#[cfg(feature = "builder")]
pub use bale_builder as builder;

/// Install the default `tracing` subscriber. Returns false if one was
/// already installed.
pub fn init_logging() -> bool {
    bale_core::logging::init()
}

/// Read settings from a TOML file, overlaid with `BALE_*`
/// environment variables. A missing file yields the environment alone.
pub fn load_settings(path: &std::path::Path) -> Result<Settings, SettingsError> {
    let mut settings = match std::fs::read_to_string(path) {
        Ok(text) => Settings::parse(&text).map_err(SettingsError::Format)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No settings file at {}", path.display());
            Settings::new()
        }
        Err(e) => return Err(SettingsError::Io(e)),
    };
    settings.overlay_env();
    Ok(settings)
}

/// Errors from [`load_settings`].
#[derive(Debug)]
pub enum SettingsError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid settings text.
    Format(bale_core::FormatError),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "Failed to read settings: {}", e),
            SettingsError::Format(e) => write!(f, "Invalid settings: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io(e) => Some(e),
            SettingsError::Format(e) => Some(e),
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use bale_core::{Archive, AssetKind, DependencyTable, NameResolver, Settings};

    // Runtime types
    #[cfg(feature = "runtime")]
    pub use bale_bundles::{
        Asset, BundleError, BundleEvent, BundleRegistry, BundleResult, Handler, HandlerState,
        HandlerStep, Loaded, ResourceLoader, RuntimeConfig,
    };

    // Builder types
    #[cfg(feature = "builder")]
    pub use bale_builder::{
        AssetGraph, BuildConfig, BuildError, BuildReport, BuildTask, BundleKind, Manifest,
        MemoryAssetGraph, Partition,
    };
}
