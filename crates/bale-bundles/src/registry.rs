//! Bundle registry - load coalescing, dependency chaining and reference counting.

use std::sync::Arc;

use bale_core::alloc::{HashMap, HashSet};
use bale_core::profiling::profile_function;
use bale_core::{Archive, DependencyTable};
use futures_lite::future;
use indexmap::IndexMap;

use crate::config::RuntimeConfig;
use crate::error::{BundleError, BundleResult};
use crate::event::{BundleEvent, BundleEventBuffer, Observer};
use crate::handler::{Handler, HandlerState, HandlerStep};
use crate::store::{ArchiveFuture, ArchiveStore, FileArchiveStore};

/// Upper bound on the number of steps [`BundleRegistry::wait`] takes.
pub const MAX_WAIT_TICKS: usize = 10_000;

/// A loaded bundle.
#[derive(Debug)]
pub struct BundleRecord {
    id: String,
    ref_count: u32,
    dependencies: Vec<String>,
    archive: Arc<Archive>,
}

impl BundleRecord {
    /// The bundle identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current reference count.
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Bundles this one holds a retain on.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The loaded archive.
    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }
}

/// An async load that has been submitted but not finished.
struct InFlight {
    handler: Handler,
    cycle: u64,
    operation: Option<ArchiveFuture>,
    archive: Option<Arc<Archive>>,
    dependencies: Vec<String>,
    /// Submitted only as another load's dependency.
    implicit: bool,
}

/// Registry of loaded bundles.
///
/// # Example
///
/// ```
/// use bale_bundles::{BundleRegistry, MemoryArchiveStore};
/// use bale_core::Archive;
///
/// let mut store = MemoryArchiveStore::new();
/// store.insert("a.bundle", Archive::default());
///
/// let mut registry = BundleRegistry::new(store);
/// registry.initialize().unwrap();
///
/// registry.load("a.bundle").unwrap();
/// assert_eq!(registry.retain("a.bundle").unwrap(), 1);
/// assert_eq!(registry.release("a.bundle"), 0);
/// assert!(registry.find("a.bundle").is_none());
/// ```
pub struct BundleRegistry {
    store: Box<dyn ArchiveStore>,
    bundle_mode: bool,
    index: DependencyTable,
    records: HashMap<String, BundleRecord>,
    in_flight: IndexMap<String, InFlight>,
    /// Synchronous load stack, for breaking dependency cycles.
    loading: Vec<String>,
    /// Async submission stack, for the same.
    submitting: Vec<String>,
    /// Records registered by an async chain and never requested directly.
    unclaimed: HashSet<String>,
    events: BundleEventBuffer,
    observers: Vec<Observer>,
}

impl BundleRegistry {
    /// Create a registry reading archives from `store`.
    pub fn new(store: impl ArchiveStore + 'static) -> Self {
        Self::from_boxed(Box::new(store))
    }

    /// Create a registry from an already boxed store.
    pub fn from_boxed(store: Box<dyn ArchiveStore>) -> Self {
        Self {
            store,
            bundle_mode: true,
            index: DependencyTable::new(),
            records: HashMap::default(),
            in_flight: IndexMap::new(),
            loading: Vec::new(),
            submitting: Vec::new(),
            unclaimed: HashSet::default(),
            events: BundleEventBuffer::new(),
            observers: Vec::new(),
        }
    }

    /// Create a registry reading bundles from `config.bundle_dir`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let store = FileArchiveStore::new(&config.bundle_dir).with_offset_factor(config.offset_factor);
        Self::new(store).with_bundle_mode(config.bundle_mode)
    }

    /// Set whether [`initialize`](Self::initialize) reads the dependency index.
    pub fn with_bundle_mode(mut self, enabled: bool) -> Self {
        self.bundle_mode = enabled;
        self
    }

    /// Reset the registry.
    ///
    /// Drops every record and detaches every in-flight load (their handlers
    /// fail with [`BundleError::Detached`]). In bundle mode the dependency
    /// index is read from the store. Safe to call repeatedly.
    pub fn initialize(&mut self) -> BundleResult<()> {
        let detached: Vec<InFlight> = self.in_flight.drain(..).map(|(_, entry)| entry).collect();
        self.records.clear();
        self.loading.clear();
        self.submitting.clear();
        self.unclaimed.clear();
        self.index = DependencyTable::new();

        for entry in detached {
            let key = entry.handler.key();
            entry.handler.fail(entry.cycle, Arc::new(BundleError::Detached { key }));
        }

        if self.bundle_mode {
            self.index = self.store.read_index()?;
        }
        tracing::info!("Bundle registry initialized ({} indexed bundles)", self.index.len());
        Ok(())
    }

    /// The bundle dependency index.
    pub fn index(&self) -> &DependencyTable {
        &self.index
    }

    /// Replace the bundle dependency index.
    pub fn set_index(&mut self, index: DependencyTable) {
        self.index = index;
    }

    /// Look up a loaded bundle.
    pub fn find(&self, id: &str) -> Option<&BundleRecord> {
        self.records.get(id)
    }

    /// Check if a bundle is loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of loaded bundles.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no bundles are loaded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Identifiers of all loaded bundles, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.records.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Check if an async load of `id` is in flight.
    pub fn is_loading(&self, id: &str) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Number of in-flight async loads.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Load a bundle and its dependencies synchronously.
    ///
    /// A bundle that is already loaded is returned as is. A new record is
    /// registered with a reference count of zero and holds one retain on each
    /// of its dependencies. If a dependency fails, every record opened by
    /// this call is dropped again and the registry is left as it was.
    pub fn load(&mut self, id: &str) -> BundleResult<&BundleRecord> {
        let mut opened = Vec::new();
        if let Err(error) = self.load_record(id, &mut opened) {
            for id in opened.iter().rev() {
                self.discard(id);
            }
            return Err(error);
        }
        self.unclaimed.remove(id);
        self.records
            .get(id)
            .ok_or_else(|| BundleError::NotLoaded { id: id.to_string() })
    }

    /// Load `id`, pushing every newly registered record onto `opened`.
    fn load_record(&mut self, id: &str, opened: &mut Vec<String>) -> BundleResult<()> {
        if self.records.contains_key(id) {
            return Ok(());
        }

        if self.in_flight.contains_key(id) {
            // Finish the async load instead of opening the archive twice.
            for _ in 0..MAX_WAIT_TICKS {
                if !self.in_flight.contains_key(id) {
                    break;
                }
                self.step(id, &mut HashSet::default());
            }
            if self.records.contains_key(id) {
                return Ok(());
            }
            if self.in_flight.contains_key(id) {
                return Err(BundleError::StillLoading { id: id.to_string() });
            }
        }

        let archive = match self.store.open(id) {
            Ok(archive) => archive,
            Err(error) => {
                tracing::error!("Failed to load bundle {}: {}", id, error);
                self.emit(BundleEvent::LoadFailed {
                    id: id.to_string(),
                    error: error.to_string(),
                });
                return Err(error);
            }
        };

        let dependencies = self.dependencies_of(id, &self.loading);

        self.loading.push(id.to_string());
        let mut failed = None;
        for dep in &dependencies {
            if self.load_record(dep, opened).is_err() {
                failed = Some(dep.clone());
                break;
            }
        }
        self.loading.pop();

        if let Some(dependency) = failed {
            let error = BundleError::DependencyFailed {
                id: id.to_string(),
                dependency,
            };
            tracing::error!("{}", error);
            self.emit(BundleEvent::LoadFailed {
                id: id.to_string(),
                error: error.to_string(),
            });
            return Err(error);
        }

        for dep in &dependencies {
            self.retain(dep)?;
        }

        tracing::debug!("Loaded bundle {} ({} dependencies)", id, dependencies.len());
        self.records.insert(
            id.to_string(),
            BundleRecord {
                id: id.to_string(),
                ref_count: 0,
                dependencies,
                archive,
            },
        );
        opened.push(id.to_string());
        self.emit(BundleEvent::Loaded { id: id.to_string() });
        Ok(())
    }

    /// Direct dependencies of `id`, minus any already on `stack`.
    fn dependencies_of(&self, id: &str, stack: &[String]) -> Vec<String> {
        self.index
            .get(id)
            .iter()
            .filter(|dep| {
                let cyclic = dep.as_str() == id || stack.iter().any(|s| s == *dep);
                if cyclic {
                    tracing::warn!("Dependency cycle: {} -> {}, skipping", id, dep);
                }
                !cyclic
            })
            .cloned()
            .collect()
    }

    /// Start loading a bundle asynchronously.
    ///
    /// Requests for a bundle that is already in flight share its handler.
    /// If that handler was reset, a fresh one takes over the running work.
    /// A bundle that is already loaded yields a handler that is already done.
    pub fn load_async(&mut self, id: &str) -> Handler {
        if let Some(record) = self.records.get(id) {
            self.unclaimed.remove(id);
            return Handler::completed(id, record.archive.clone());
        }
        if let Some(entry) = self.in_flight.get_mut(id) {
            entry.implicit = false;
            if !entry.handler.is_bound(entry.cycle) {
                tracing::debug!("Rebinding reset handler for {}", id);
                let handler = Handler::new(id);
                entry.cycle = handler.begin(1 + entry.dependencies.len() as u32);
                entry.handler = handler;
            }
            return entry.handler.clone();
        }

        let handler = Handler::new(id);
        self.submit(id, handler.clone(), false);
        handler
    }

    fn submit(&mut self, id: &str, handler: Handler, implicit: bool) {
        let dependencies = self.dependencies_of(id, &self.submitting);
        let cycle = handler.begin(1 + dependencies.len() as u32);
        let operation = self.store.open_async(id);

        tracing::trace!("Submitted async load of {}", id);
        self.in_flight.insert(
            id.to_string(),
            InFlight {
                handler,
                cycle,
                operation: Some(operation),
                archive: None,
                dependencies: dependencies.clone(),
                implicit,
            },
        );

        self.submitting.push(id.to_string());
        for dep in &dependencies {
            if !self.records.contains_key(dep) && !self.in_flight.contains_key(dep) {
                self.submit(dep, Handler::new(dep.as_str()), true);
            }
        }
        self.submitting.pop();
    }

    /// Advance the load behind `handler` by one step.
    ///
    /// Polls the native operation once and advances the dependency loads.
    /// Returns [`HandlerStep::Pending`] while the handler is still loading.
    pub fn advance(&mut self, handler: &Handler) -> HandlerStep {
        let key = handler.key();
        let owned = self
            .in_flight
            .get(key.as_str())
            .is_some_and(|entry| entry.handler.ptr_eq(handler));
        if owned {
            self.step(&key, &mut HashSet::default());
        }

        if handler.state() == HandlerState::Loading {
            HandlerStep::Pending
        } else {
            HandlerStep::Complete
        }
    }

    /// Advance `handler` until it completes, for at most [`MAX_WAIT_TICKS`] steps.
    pub fn wait(&mut self, handler: &Handler) -> HandlerState {
        for _ in 0..MAX_WAIT_TICKS {
            if self.advance(handler) == HandlerStep::Complete {
                break;
            }
        }
        handler.state()
    }

    /// Advance every in-flight load once. Returns the number that finished.
    pub fn update(&mut self) -> usize {
        if self.in_flight.is_empty() {
            return 0;
        }
        profile_function!();

        let before = self.in_flight.len();
        let keys: Vec<String> = self.in_flight.keys().cloned().collect();
        let mut visited = HashSet::default();
        for key in keys {
            if self.in_flight.contains_key(key.as_str()) {
                self.step(&key, &mut visited);
            }
        }
        before.saturating_sub(self.in_flight.len())
    }

    /// One step of the load of `id` and, first, of its dependencies.
    ///
    /// `visited` keeps a load from being polled twice in the same pass.
    fn step(&mut self, id: &str, visited: &mut HashSet<String>) -> HandlerStep {
        if !visited.insert(id.to_string()) {
            return if self.in_flight.contains_key(id) {
                HandlerStep::Pending
            } else {
                HandlerStep::Complete
            };
        }

        let polled = match self.in_flight.get_mut(id) {
            None => return HandlerStep::Complete,
            Some(entry) => match entry.operation.as_mut() {
                Some(operation) => future::block_on(future::poll_once(operation)),
                None => None,
            },
        };
        match polled {
            Some(Ok(archive)) => {
                if let Some(entry) = self.in_flight.get_mut(id) {
                    entry.operation = None;
                    entry.archive = Some(archive);
                }
            }
            Some(Err(error)) => {
                self.fail(id, error);
                return HandlerStep::Complete;
            }
            None => {}
        }

        let dependencies = match self.in_flight.get(id) {
            Some(entry) => entry.dependencies.clone(),
            None => return HandlerStep::Complete,
        };

        let mut ready = 0u32;
        for dep in &dependencies {
            if self.in_flight.contains_key(dep.as_str()) {
                self.step(dep, visited);
            }
            if self.records.contains_key(dep.as_str()) {
                ready += 1;
            } else if !self.in_flight.contains_key(dep.as_str()) {
                let error = BundleError::DependencyFailed {
                    id: id.to_string(),
                    dependency: dep.clone(),
                };
                self.fail(id, error);
                return HandlerStep::Complete;
            }
        }

        let Some(entry) = self.in_flight.get(id) else {
            return HandlerStep::Complete;
        };
        let own = u32::from(entry.archive.is_some());
        let total = 1 + dependencies.len() as u32;
        entry.handler.set_progress(entry.cycle, own + ready, total);

        if own + ready < total {
            return HandlerStep::Pending;
        }
        self.finish(id);
        HandlerStep::Complete
    }

    fn finish(&mut self, id: &str) {
        let Some(entry) = self.in_flight.shift_remove(id) else {
            return;
        };
        let Some(archive) = entry.archive else {
            return;
        };

        for dep in &entry.dependencies {
            if let Err(error) = self.retain(dep) {
                tracing::warn!("Bundle {} lost dependency {}: {}", id, dep, error);
            }
        }
        if entry.implicit {
            self.unclaimed.insert(id.to_string());
        }

        entry.handler.fire_preload(entry.cycle);
        tracing::debug!(
            "Loaded bundle {} ({} dependencies)",
            id,
            entry.dependencies.len()
        );
        self.records.insert(
            id.to_string(),
            BundleRecord {
                id: id.to_string(),
                ref_count: 0,
                dependencies: entry.dependencies,
                archive: archive.clone(),
            },
        );
        entry.handler.finish(entry.cycle, archive);
        self.emit(BundleEvent::Loaded { id: id.to_string() });
    }

    fn fail(&mut self, id: &str, error: BundleError) {
        let Some(entry) = self.in_flight.shift_remove(id) else {
            return;
        };
        tracing::error!("Failed to load bundle {}: {}", id, error);
        self.emit(BundleEvent::LoadFailed {
            id: id.to_string(),
            error: error.to_string(),
        });
        entry.handler.fail(entry.cycle, Arc::new(error));
        self.prune(&entry.dependencies);
    }

    /// Drop unclaimed records in `ids` that no in-flight load still waits on.
    fn prune(&mut self, ids: &[String]) {
        for id in ids {
            let orphaned = self.unclaimed.contains(id)
                && self.records.get(id).is_some_and(|r| r.ref_count == 0)
                && !self.in_flight.values().any(|e| e.dependencies.contains(id));
            if orphaned {
                tracing::debug!("Dropping {}, its dependent failed", id);
                let dependencies = self.discard(id);
                self.prune(&dependencies);
            }
        }
    }

    /// Remove a record without unloading its dependencies, handing back the
    /// retain it held on each. Returns the dependency list.
    fn discard(&mut self, id: &str) -> Vec<String> {
        self.unclaimed.remove(id);
        let Some(record) = self.records.remove(id) else {
            return Vec::new();
        };
        for dep in &record.dependencies {
            if let Some(dep) = self.records.get_mut(dep) {
                dep.ref_count = dep.ref_count.saturating_sub(1);
            }
        }
        self.emit(BundleEvent::Unloaded {
            id: record.id,
            archive: record.archive,
        });
        record.dependencies
    }

    /// Increment the reference count of a loaded bundle. Returns the new count.
    pub fn retain(&mut self, id: &str) -> BundleResult<u32> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| BundleError::NotLoaded { id: id.to_string() })?;
        record.ref_count = record.ref_count.saturating_add(1);
        tracing::trace!("Retain {} -> {}", id, record.ref_count);
        Ok(record.ref_count)
    }

    /// Decrement the reference count of a bundle. Returns the new count.
    ///
    /// Reaching zero unloads the bundle and releases its dependencies. Unknown
    /// bundles are ignored.
    pub fn release(&mut self, id: &str) -> u32 {
        let Some(record) = self.records.get_mut(id) else {
            tracing::debug!("Release of unknown bundle {}", id);
            return 0;
        };
        record.ref_count = record.ref_count.saturating_sub(1);
        tracing::trace!("Release {} -> {}", id, record.ref_count);
        if record.ref_count > 0 {
            return record.ref_count;
        }

        self.unload(id);
        0
    }

    fn unload(&mut self, id: &str) {
        self.unclaimed.remove(id);
        let Some(record) = self.records.remove(id) else {
            return;
        };
        tracing::debug!("Unloading bundle {}", id);
        self.emit(BundleEvent::Unloaded {
            id: record.id,
            archive: record.archive,
        });
        for dep in &record.dependencies {
            self.release(dep);
        }
    }

    /// Add an observer called synchronously for every event.
    pub fn subscribe(&mut self, observer: impl FnMut(&BundleEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Drain buffered events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = BundleEvent> + '_ {
        self.events.drain()
    }

    /// Iterate buffered events without draining.
    pub fn iter_events(&self) -> impl Iterator<Item = &BundleEvent> {
        self.events.iter()
    }

    fn emit(&mut self, event: BundleEvent) {
        for observer in &mut self.observers {
            observer(&event);
        }
        self.events.push(event);
    }
}
