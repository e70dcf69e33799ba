//! Registry lifecycle events.

use std::sync::Arc;

use bale_core::Archive;

/// Events emitted by the bundle registry.
#[derive(Debug, Clone)]
pub enum BundleEvent {
    /// A bundle finished loading and was registered.
    Loaded {
        /// The bundle identifier.
        id: String,
    },

    /// A bundle's reference count reached zero and its record was removed.
    ///
    /// The archive travels with the event so observers can free whatever they
    /// built from it.
    Unloaded {
        /// The bundle identifier.
        id: String,
        /// The archive that was held by the record.
        archive: Arc<Archive>,
    },

    /// A bundle failed to load.
    LoadFailed {
        /// The bundle identifier.
        id: String,
        /// Error message.
        error: String,
    },
}

impl BundleEvent {
    /// The bundle identifier this event relates to.
    pub fn id(&self) -> &str {
        match self {
            BundleEvent::Loaded { id } => id,
            BundleEvent::Unloaded { id, .. } => id,
            BundleEvent::LoadFailed { id, .. } => id,
        }
    }

    /// Check if this is a load event.
    pub fn is_loaded(&self) -> bool {
        matches!(self, BundleEvent::Loaded { .. })
    }

    /// Check if this is an unload event.
    pub fn is_unloaded(&self) -> bool {
        matches!(self, BundleEvent::Unloaded { .. })
    }

    /// Check if this is a failure event.
    pub fn is_failed(&self) -> bool {
        matches!(self, BundleEvent::LoadFailed { .. })
    }
}

/// Callback invoked synchronously for every event as it is emitted.
pub type Observer = Box<dyn FnMut(&BundleEvent) + Send + 'static>;

/// A buffer of bundle events that can be drained each frame.
#[derive(Debug, Default)]
pub struct BundleEventBuffer {
    events: Vec<BundleEvent>,
}

impl BundleEventBuffer {
    /// Create a new empty event buffer.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Push an event to the buffer.
    pub fn push(&mut self, event: BundleEvent) {
        self.events.push(event);
    }

    /// Drain all events from the buffer.
    pub fn drain(&mut self) -> impl Iterator<Item = BundleEvent> + '_ {
        self.events.drain(..)
    }

    /// Get an iterator over events without draining.
    pub fn iter(&self) -> impl Iterator<Item = &BundleEvent> {
        self.events.iter()
    }

    /// Check if there are any events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Clear all events.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
