//! Loaded objects and their auto-release markers.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Sends one release request for its bundle when dropped.
///
/// The loader applies queued releases on its next
/// [`update`](crate::ResourceLoader::update) or
/// [`process_releases`](crate::ResourceLoader::process_releases).
#[derive(Debug)]
pub struct ReleaseMarker {
    bundle_id: String,
    sender: Sender<String>,
}

impl ReleaseMarker {
    pub(crate) fn new(bundle_id: impl Into<String>, sender: Sender<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            sender,
        }
    }

    /// The bundle this marker holds a reference on.
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }
}

impl Drop for ReleaseMarker {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.bundle_id);
        if self.sender.send(id).is_err() {
            tracing::trace!("Release marker dropped after its loader");
        }
    }
}

/// An object loaded by the [`ResourceLoader`](crate::ResourceLoader).
///
/// In reference mode the object carries a shared [`ReleaseMarker`]: the bundle
/// reference is given back once the last clone is dropped.
pub struct Loaded<T> {
    asset: Arc<T>,
    marker: Option<Arc<ReleaseMarker>>,
}

impl<T> Loaded<T> {
    pub(crate) fn new(asset: Arc<T>, marker: Option<ReleaseMarker>) -> Self {
        Self {
            asset,
            marker: marker.map(Arc::new),
        }
    }

    /// The shared object.
    pub fn asset(&self) -> &Arc<T> {
        &self.asset
    }

    /// Check if dropping this object releases a bundle reference.
    pub fn is_tracked(&self) -> bool {
        self.marker.is_some()
    }

    /// The bundle released on drop, if tracked.
    pub fn bundle_id(&self) -> Option<&str> {
        self.marker.as_deref().map(ReleaseMarker::bundle_id)
    }

    /// Number of live clones sharing the release marker.
    pub fn marker_count(&self) -> usize {
        self.marker.as_ref().map_or(0, Arc::strong_count)
    }
}

impl<T> Clone for Loaded<T> {
    fn clone(&self) -> Self {
        Self {
            asset: Arc::clone(&self.asset),
            marker: self.marker.clone(),
        }
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.asset
    }
}

impl<T: fmt::Debug> fmt::Debug for Loaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaded")
            .field("asset", &self.asset)
            .field("bundle_id", &self.bundle_id())
            .finish()
    }
}
