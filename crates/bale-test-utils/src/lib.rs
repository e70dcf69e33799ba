//! Test utilities for bale.
//!
//! The main component is [`MockArchiveStore`], an in-memory
//! [`ArchiveStore`] that records every call and can hold async opens back
//! until a test lets them through. It makes coalescing and reference-count
//! behaviour observable without touching the filesystem.
//!
//! # Example
//!
//! ```rust
//! use bale_bundles::BundleRegistry;
//! use bale_test_utils::MockArchiveStore;
//!
//! let store = MockArchiveStore::new();
//! store.insert_objects("a.bundle", &[("assets/a", b"a")]);
//! store.defer(true);
//!
//! let mut registry = BundleRegistry::new(store.clone());
//! let first = registry.load_async("a.bundle");
//! let second = registry.load_async("a.bundle");
//!
//! registry.update();
//! assert!(!first.is_done());
//!
//! store.complete("a.bundle");
//! registry.update();
//! assert!(first.is_done() && second.is_done());
//! assert_eq!(store.count_opens("a.bundle"), 1);
//! ```
//!
//! # Interior Mutability
//!
//! The store is shared between the registry (which owns a clone) and the test
//! (which keeps another), so all state lives behind one `parking_lot::Mutex`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::task::Poll;

use bale_bundles::{ArchiveFuture, ArchiveStore, BundleError, BundleResult};
use bale_core::{Archive, ArchiveWriter, DependencyTable};
use parking_lot::Mutex;

/// Records a store call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// Synchronous open.
    Open {
        /// The bundle identifier.
        id: String,
    },
    /// Asynchronous open.
    OpenAsync {
        /// The bundle identifier.
        id: String,
    },
    /// Dependency index read.
    ReadIndex,
}

#[derive(Default)]
struct MockState {
    archives: BTreeMap<String, Arc<Archive>>,
    index: DependencyTable,
    calls: Vec<StoreCall>,
    deferred: bool,
    gated: BTreeSet<String>,
}

impl MockState {
    fn lookup(&self, id: &str) -> BundleResult<Arc<Archive>> {
        self.archives
            .get(id)
            .cloned()
            .ok_or_else(|| BundleError::ArchiveNotFound { id: id.to_string() })
    }
}

/// Mock implementation of [`ArchiveStore`] for testing.
#[derive(Clone, Default)]
pub struct MockArchiveStore {
    state: Arc<Mutex<MockState>>,
}

impl MockArchiveStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an archive.
    pub fn insert(&self, id: impl Into<String>, archive: Archive) {
        self.state.lock().archives.insert(id.into(), Arc::new(archive));
    }

    /// Add an archive holding the given `(name, bytes)` objects.
    pub fn insert_objects(&self, id: impl Into<String>, objects: &[(&str, &[u8])]) {
        let mut writer = ArchiveWriter::new();
        for (name, bytes) in objects {
            writer.insert(*name, bytes.to_vec());
        }
        let archive = writer
            .finish()
            .and_then(|bytes| Archive::parse(&bytes))
            .unwrap_or_default();
        self.insert(id, archive);
    }

    /// Remove an archive, so later opens fail.
    pub fn remove(&self, id: &str) {
        self.state.lock().archives.remove(id);
    }

    /// Declare the direct dependencies of `id` in the index.
    pub fn set_dependencies(&self, id: impl Into<String>, deps: &[&str]) {
        self.state
            .lock()
            .index
            .insert(id, deps.iter().map(|d| d.to_string()));
    }

    /// Hold back async opens submitted from now on until they are completed.
    pub fn defer(&self, enabled: bool) {
        self.state.lock().deferred = enabled;
    }

    /// Let the held-back async open of `id` finish on its next poll.
    pub fn complete(&self, id: &str) {
        self.state.lock().gated.remove(id);
    }

    /// Let every held-back async open finish on its next poll.
    pub fn complete_all(&self) {
        self.state.lock().gated.clear();
    }

    /// Identifiers whose async open is still held back.
    pub fn held(&self) -> Vec<String> {
        self.state.lock().gated.iter().cloned().collect()
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Number of opens (sync or async) issued for `id`.
    pub fn count_opens(&self, id: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| match call {
                StoreCall::Open { id: called } | StoreCall::OpenAsync { id: called } => called == id,
                StoreCall::ReadIndex => false,
            })
            .count()
    }

    /// Total number of opens issued.
    pub fn total_opens(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| !matches!(call, StoreCall::ReadIndex))
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl ArchiveStore for MockArchiveStore {
    fn open(&self, id: &str) -> BundleResult<Arc<Archive>> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Open { id: id.to_string() });
        state.lookup(id)
    }

    fn open_async(&self, id: &str) -> ArchiveFuture {
        {
            let mut state = self.state.lock();
            state.calls.push(StoreCall::OpenAsync { id: id.to_string() });
            if state.deferred {
                state.gated.insert(id.to_string());
            }
        }

        let state = Arc::clone(&self.state);
        let id = id.to_string();
        Box::pin(futures_lite::future::poll_fn(move |_cx| {
            let state = state.lock();
            if state.gated.contains(&id) {
                Poll::Pending
            } else {
                Poll::Ready(state.lookup(&id))
            }
        }))
    }

    fn read_index(&self) -> BundleResult<DependencyTable> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::ReadIndex);
        Ok(state.index.clone())
    }
}
