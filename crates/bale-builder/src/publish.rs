//! Uploading a build to an object store.
//!
//! Every added or modified file is uploaded as `name@hash`, then the
//! manifest itself is uploaded as `manifest` and as `manifest@hash`. Files
//! whose hash did not change are never re-sent, and a client holding an old
//! manifest keeps resolving the files it lists.

use std::path::{Path, PathBuf};

use crate::error::{BuildError, BuildResult};
use crate::manifest::{ChangeKind, MANIFEST_FILE_NAME, Manifest, ManifestEntry};

/// Remote storage for published builds.
pub trait ObjectStore {
    /// Fetch an object. A missing object yields `None`.
    fn get(&self, key: &str) -> BuildResult<Option<Vec<u8>>>;

    /// Store an object, replacing any previous value.
    fn put(&self, key: &str, bytes: &[u8]) -> BuildResult<()>;
}

/// An [`ObjectStore`] backed by a local directory, one file per key.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory objects are stored in.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ObjectStore for DirectoryStore {
    fn get(&self, key: &str) -> BuildResult<Option<Vec<u8>>> {
        let path = self.root.join(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::io(path, e)),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> BuildResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| BuildError::io(&self.root, e))?;
        let path = self.root.join(key);
        std::fs::write(&path, bytes).map_err(|e| BuildError::io(path, e))
    }
}

/// What a publish uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Remote keys of the uploaded files, in manifest order.
    pub uploaded: Vec<String>,
    /// Versioned key of the uploaded manifest.
    pub manifest_key: String,
}

/// Publish the build in `local_dir` to `store`.
pub fn publish(local_dir: &Path, store: &dyn ObjectStore) -> BuildResult<PublishReport> {
    let manifest_path = local_dir.join(MANIFEST_FILE_NAME);
    let manifest_bytes = match std::fs::read(&manifest_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BuildError::MissingManifest { path: manifest_path });
        }
        Err(e) => return Err(BuildError::io(manifest_path, e)),
    };
    let local = Manifest::parse(&String::from_utf8_lossy(&manifest_bytes)).map_err(|source| {
        BuildError::Format {
            context: manifest_path.display().to_string(),
            source,
        }
    })?;

    let remote = match store.get(MANIFEST_FILE_NAME)? {
        Some(bytes) => Manifest::parse(&String::from_utf8_lossy(&bytes)).unwrap_or_else(|e| {
            tracing::warn!("Remote manifest is corrupt ({}), uploading everything", e);
            Manifest::new()
        }),
        None => Manifest::new(),
    };

    let mut report = PublishReport::default();
    for change in local.diff(&remote) {
        if change.kind == ChangeKind::Deleted {
            continue;
        }
        let key = format!("{}@{}", change.name, change.hash);
        let path = local_dir.join(&change.name);
        let bytes = std::fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
        store.put(&key, &bytes)?;
        tracing::debug!("Uploaded {}", key);
        report.uploaded.push(key);
    }

    let versioned = ManifestEntry::of_bytes(MANIFEST_FILE_NAME, &manifest_bytes).remote_key();
    store.put(MANIFEST_FILE_NAME, &manifest_bytes)?;
    store.put(&versioned, &manifest_bytes)?;

    tracing::info!("Published {} files ({})", report.uploaded.len(), versioned);
    report.manifest_key = versioned;
    Ok(report)
}
