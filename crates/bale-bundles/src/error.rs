//! Error types for the bundle runtime.

use std::fmt;
use std::path::PathBuf;

use bale_core::FormatError;

/// Errors that can occur while loading bundles or objects out of them.
#[derive(Debug)]
pub enum BundleError {
    /// No archive exists for the requested bundle identifier.
    ArchiveNotFound {
        /// The bundle identifier.
        id: String,
    },

    /// The archive exists but could not be decoded.
    ArchiveCorrupt {
        /// The bundle identifier.
        id: String,
        /// What was wrong with it.
        source: FormatError,
    },

    /// Failed to read data from disk.
    IoError {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The bundle dependency index could not be parsed.
    InvalidIndex {
        /// The parse error.
        source: FormatError,
    },

    /// The bundle is not registered.
    NotLoaded {
        /// The bundle identifier.
        id: String,
    },

    /// A dependency of the bundle failed to load.
    DependencyFailed {
        /// The bundle being loaded.
        id: String,
        /// The dependency that failed.
        dependency: String,
    },

    /// The bundle is still being loaded asynchronously and did not finish in time.
    StillLoading {
        /// The bundle identifier.
        id: String,
    },

    /// The request was abandoned before it completed.
    Detached {
        /// The bundle or object key of the request.
        key: String,
    },

    /// The bundle loaded but does not hold the requested object.
    ObjectNotFound {
        /// The bundle identifier.
        bundle: String,
        /// The object key that was looked up.
        name: String,
    },

    /// The object bytes could not be turned into the requested type.
    DecodeError {
        /// The object key.
        name: String,
        /// Description of the error.
        message: String,
    },
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::ArchiveNotFound { id } => {
                write!(f, "Bundle not found: {}", id)
            }
            BundleError::ArchiveCorrupt { id, source } => {
                write!(f, "Bundle '{}' is corrupt: {}", id, source)
            }
            BundleError::IoError { path, source } => {
                write!(f, "IO error reading '{}': {}", path.display(), source)
            }
            BundleError::InvalidIndex { source } => {
                write!(f, "Invalid bundle dependency index: {}", source)
            }
            BundleError::NotLoaded { id } => {
                write!(f, "Bundle not loaded: {}", id)
            }
            BundleError::DependencyFailed { id, dependency } => {
                write!(f, "Bundle '{}' failed: dependency '{}' did not load", id, dependency)
            }
            BundleError::StillLoading { id } => {
                write!(f, "Bundle still loading: {}", id)
            }
            BundleError::Detached { key } => {
                write!(f, "Request for '{}' was detached before completion", key)
            }
            BundleError::ObjectNotFound { bundle, name } => {
                write!(f, "Object '{}' not found in bundle '{}'", name, bundle)
            }
            BundleError::DecodeError { name, message } => {
                write!(f, "Failed to decode '{}': {}", name, message)
            }
        }
    }
}

impl std::error::Error for BundleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BundleError::IoError { source, .. } => Some(source),
            BundleError::ArchiveCorrupt { source, .. } => Some(source),
            BundleError::InvalidIndex { source } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl BundleError {
    /// Check if the error means the bundle or object simply does not exist.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            BundleError::ArchiveNotFound { .. } | BundleError::ObjectNotFound { .. }
        )
    }
}

/// Result type alias for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;
