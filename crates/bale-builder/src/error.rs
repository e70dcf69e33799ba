//! Error types for the offline builder.

use std::fmt;
use std::path::PathBuf;

use bale_core::FormatError;

/// Errors that can occur while building or publishing bundles.
#[derive(Debug)]
pub enum BuildError {
    /// Failed to read or write a file.
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A text or binary format could not be decoded.
    Format {
        /// What was being decoded.
        context: String,
        /// The parse error.
        source: FormatError,
    },

    /// A builder setting has an invalid value.
    InvalidConfig {
        /// The parse error.
        source: FormatError,
    },

    /// The dependency listing of an asset could not be read.
    DependencyListing {
        /// The asset path.
        asset: String,
        /// Description of the error.
        message: String,
    },

    /// The packer failed to produce a bundle.
    Pack {
        /// The bundle identifier.
        bundle: String,
        /// Description of the error.
        message: String,
    },

    /// The remote object store rejected an operation.
    Publish {
        /// The remote key.
        key: String,
        /// Description of the error.
        message: String,
    },

    /// There is no local manifest to publish.
    MissingManifest {
        /// Where the manifest was expected.
        path: PathBuf,
    },

    /// The build was rolled back after a failing step.
    Aborted {
        /// The step that failed.
        source: Box<BuildError>,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Io { path, source } => {
                write!(f, "IO error at '{}': {}", path.display(), source)
            }
            BuildError::Format { context, source } => {
                write!(f, "Failed to parse {}: {}", context, source)
            }
            BuildError::InvalidConfig { source } => {
                write!(f, "Invalid builder configuration: {}", source)
            }
            BuildError::DependencyListing { asset, message } => {
                write!(f, "Cannot list dependencies of '{}': {}", asset, message)
            }
            BuildError::Pack { bundle, message } => {
                write!(f, "Failed to pack bundle '{}': {}", bundle, message)
            }
            BuildError::Publish { key, message } => {
                write!(f, "Failed to publish '{}': {}", key, message)
            }
            BuildError::MissingManifest { path } => {
                write!(f, "No manifest at '{}'", path.display())
            }
            BuildError::Aborted { source } => {
                write!(f, "Build aborted and rolled back: {}", source)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Io { source, .. } => Some(source),
            BuildError::Format { source, .. } => Some(source),
            BuildError::InvalidConfig { source } => Some(source),
            BuildError::Aborted { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        BuildError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl BuildError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for builder operations.
pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        let err = BuildError::Pack {
            bundle: "abc.bundle".to_string(),
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to pack bundle 'abc.bundle': disk full");
    }

    #[test]
    fn test_aborted_chains_source() {
        let err = BuildError::Aborted {
            source: Box::new(BuildError::io(
                "out/manifest",
                std::io::Error::other("denied"),
            )),
        };
        let inner = err.source().unwrap();
        assert!(inner.to_string().contains("out/manifest"));
    }
}
