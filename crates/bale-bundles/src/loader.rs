//! Resource loader - object loading on top of the bundle registry.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use bale_core::name::object_key;
use bale_core::{Archive, NameResolver};
use indexmap::IndexMap;

use crate::asset::Asset;
use crate::catalog::{Catalog, DirectoryCatalog};
use crate::config::RuntimeConfig;
use crate::error::{BundleError, BundleResult};
use crate::handler::{Handler, HandlerState, HandlerValue};
use crate::marker::{Loaded, ReleaseMarker};
use crate::registry::BundleRegistry;

type Decode = fn(&str, &[u8]) -> BundleResult<HandlerValue>;
type Callback = Box<dyn FnOnce(Option<HandlerValue>, Option<ReleaseMarker>) + Send + 'static>;

fn decode_as<T: Asset>(name: &str, bytes: &[u8]) -> BundleResult<HandlerValue> {
    Ok(Arc::new(T::from_bytes(name, bytes)?))
}

/// One caller attached to a pending object load.
struct Waiter {
    retain: bool,
    callback: Callback,
}

/// An object load waiting for its bundle.
struct PendingObject {
    handler: Handler,
    cycle: u64,
    bundle_id: String,
    bundle: Handler,
    object_key: String,
    decode: Decode,
    type_name: &'static str,
    waiters: Vec<Waiter>,
}

/// Loads objects by asset path, from bundles or directly from a catalog.
///
/// # Example
///
/// ```
/// use bale_bundles::{BundleRegistry, MemoryArchiveStore, MemoryCatalog, ResourceLoader, RuntimeConfig};
/// use bale_core::{ArchiveWriter, Archive, name};
///
/// let mut writer = ArchiveWriter::new();
/// writer.insert("assets/text/hello", b"hello".to_vec());
/// let archive = Archive::parse(&writer.finish().unwrap()).unwrap();
///
/// let mut store = MemoryArchiveStore::new();
/// store.insert(name::bundle_name("Assets/Text/Hello.txt"), archive);
///
/// let mut loader = ResourceLoader::new(
///     RuntimeConfig::default(),
///     BundleRegistry::new(store),
///     MemoryCatalog::new(),
/// );
/// loader.initialize().unwrap();
///
/// let text = loader.load::<String>("Assets/Text/Hello", false).unwrap().unwrap();
/// assert_eq!(text.as_str(), "hello");
/// ```
pub struct ResourceLoader {
    config: RuntimeConfig,
    registry: BundleRegistry,
    names: NameResolver,
    catalog: Box<dyn Catalog>,
    pending: IndexMap<String, PendingObject>,
    release_tx: Sender<String>,
    release_rx: Receiver<String>,
}

impl ResourceLoader {
    /// Create a loader from its parts.
    pub fn new(config: RuntimeConfig, registry: BundleRegistry, catalog: impl Catalog + 'static) -> Self {
        let (release_tx, release_rx) = mpsc::channel();
        Self {
            registry: registry.with_bundle_mode(config.bundle_mode),
            config,
            names: NameResolver::new(),
            catalog: Box::new(catalog),
            pending: IndexMap::new(),
            release_tx,
            release_rx,
        }
    }

    /// Create a loader reading bundles from `config.bundle_dir` and direct
    /// objects from `config.catalog_dir`.
    pub fn from_config(config: RuntimeConfig) -> Self {
        let registry = BundleRegistry::from_config(&config);
        let catalog = DirectoryCatalog::new(&config.catalog_dir);
        Self::new(config, registry, catalog)
    }

    /// Reset the loader and its registry.
    ///
    /// Pending object loads fail with [`BundleError::Detached`] and their
    /// callbacks receive `None`.
    pub fn initialize(&mut self) -> BundleResult<()> {
        let detached: Vec<PendingObject> = self.pending.drain(..).map(|(_, p)| p).collect();
        for pending in detached {
            let key = pending.handler.key();
            pending.handler.fail(pending.cycle, Arc::new(BundleError::Detached { key }));
            for waiter in pending.waiters {
                (waiter.callback)(None, None);
            }
        }

        // Queued releases refer to records that are about to be dropped.
        while self.release_rx.try_recv().is_ok() {}
        self.names.clear();
        self.registry.initialize()
    }

    /// The loader settings.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The underlying registry.
    pub fn registry(&self) -> &BundleRegistry {
        &self.registry
    }

    /// Mutable access to the underlying registry.
    pub fn registry_mut(&mut self) -> &mut BundleRegistry {
        &mut self.registry
    }

    /// Bundle identifier for `path`.
    pub fn bundle_name(&mut self, path: &str) -> String {
        self.names.bundle_name(path)
    }

    /// Load an object synchronously.
    ///
    /// Returns `Ok(None)` when the bundle or the object does not exist. With
    /// `retain` (or in reference mode) the backing bundle is retained once.
    /// A decode failure means `T` is the wrong type for the object and is
    /// returned as an error.
    pub fn load<T: Asset>(&mut self, path: &str, retain: bool) -> BundleResult<Option<Loaded<T>>> {
        if !self.config.bundle_mode {
            let key = object_key(path);
            let Some(bytes) = self.catalog.read(path) else {
                tracing::warn!("Object not found: {}", path);
                return Ok(None);
            };
            let asset = T::from_bytes(&key, &bytes)?;
            return Ok(Some(Loaded::new(Arc::new(asset), None)));
        }

        let bundle_id = self.names.bundle_name(path);
        if bundle_id.is_empty() {
            tracing::warn!("Cannot load an empty asset path");
            return Ok(None);
        }

        let archive: Arc<Archive> = match self.registry.load(&bundle_id) {
            Ok(record) => record.archive().clone(),
            Err(error) if error.is_missing() => {
                tracing::warn!("No bundle for {} ({})", path, bundle_id);
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        let key = object_key(path);
        let Some(bytes) = archive.get(&key) else {
            tracing::warn!("Object '{}' not found in bundle {}", key, bundle_id);
            return Ok(None);
        };
        let asset = T::from_bytes(&key, bytes)?;

        tracing::trace!("Loaded {} '{}' from {}", T::type_name(), key, bundle_id);
        let marker = self.take_reference(&bundle_id, retain);
        Ok(Some(Loaded::new(Arc::new(asset), marker)))
    }

    /// Load an object asynchronously.
    ///
    /// Requests for a path that is already loading attach to the same handler
    /// and queue `callback` on it. Callbacks run from [`update`](Self::update)
    /// and receive `None` if the object could not be produced or the handler
    /// was reset before it was. If the bundle
    /// is already loaded, the request resolves before this returns.
    pub fn load_async<T: Asset>(
        &mut self,
        path: &str,
        callback: impl FnOnce(Option<Loaded<T>>) + Send + 'static,
        retain: bool,
    ) -> Handler {
        let waiter = Waiter {
            retain,
            callback: Box::new(move |value: Option<HandlerValue>, marker: Option<ReleaseMarker>| {
                let loaded = value
                    .and_then(|v| v.downcast::<T>().ok())
                    .map(|asset| Loaded::new(asset, marker));
                callback(loaded);
            }),
        };

        if let Some(pending) = self.pending.get_mut(path) {
            if pending.type_name != T::type_name() {
                tracing::warn!(
                    "{} requested as {} while loading as {}",
                    path,
                    T::type_name(),
                    pending.type_name
                );
            }
            if !pending.handler.is_bound(pending.cycle) {
                let handler = Handler::new(path);
                pending.cycle = handler.begin(pending.bundle.total_count().max(1));
                pending.handler = handler;
            }
            pending.waiters.push(waiter);
            return pending.handler.clone();
        }

        if !self.config.bundle_mode {
            return self.load_direct_async(path, decode_as::<T>, waiter);
        }

        let bundle_id = self.names.bundle_name(path);
        if bundle_id.is_empty() {
            tracing::warn!("Cannot load an empty asset path");
            (waiter.callback)(None, None);
            return Handler::failed(path, BundleError::ArchiveNotFound { id: bundle_id });
        }

        let bundle = self.registry.load_async(&bundle_id);
        let handler = Handler::new(path);
        let cycle = handler.begin(bundle.total_count().max(1));

        self.pending.insert(
            path.to_string(),
            PendingObject {
                handler: handler.clone(),
                cycle,
                bundle_id,
                bundle,
                object_key: object_key(path),
                decode: decode_as::<T>,
                type_name: T::type_name(),
                waiters: vec![waiter],
            },
        );
        self.poll_pending(path);
        handler
    }

    fn load_direct_async(&mut self, path: &str, decode: Decode, waiter: Waiter) -> Handler {
        let key = object_key(path);
        let result = match self.catalog.read(path) {
            Some(bytes) => decode(&key, &bytes),
            None => Err(BundleError::ObjectNotFound {
                bundle: String::new(),
                name: key,
            }),
        };

        match result {
            Ok(value) => {
                let handler = Handler::completed(path, value.clone());
                (waiter.callback)(Some(value), None);
                handler
            }
            Err(error) => {
                tracing::warn!("Failed to load {}: {}", path, error);
                (waiter.callback)(None, None);
                Handler::failed(path, error)
            }
        }
    }

    /// Check if an async request for exactly `path` is outstanding.
    pub fn is_loading(&self, path: &str) -> bool {
        self.pending.contains_key(path)
    }

    /// Number of outstanding async object requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drive the registry and pending object loads, then apply queued releases.
    ///
    /// Returns the number of object requests that finished.
    pub fn update(&mut self) -> usize {
        self.registry.update();

        let paths: Vec<String> = self.pending.keys().cloned().collect();
        let mut finished = 0;
        for path in paths {
            if self.poll_pending(&path) {
                finished += 1;
            }
        }

        self.process_releases();
        finished
    }

    /// Check on a pending object. Returns true if it finished.
    fn poll_pending(&mut self, path: &str) -> bool {
        let Some(pending) = self.pending.get(path) else {
            return false;
        };

        match pending.bundle.state() {
            HandlerState::Loading => {
                pending.handler.set_progress(
                    pending.cycle,
                    pending.bundle.done_count(),
                    pending.bundle.total_count(),
                );
                false
            }
            HandlerState::Done => {
                if let Some(pending) = self.pending.shift_remove(path) {
                    self.complete(pending);
                }
                true
            }
            HandlerState::Error | HandlerState::Idle => {
                if let Some(pending) = self.pending.shift_remove(path) {
                    let error = pending.bundle.error().unwrap_or_else(|| {
                        Arc::new(BundleError::Detached {
                            key: pending.bundle_id.clone(),
                        })
                    });
                    self.abandon(pending, error);
                }
                true
            }
        }
    }

    fn complete(&mut self, pending: PendingObject) {
        let archive = pending.bundle.value::<Archive>();
        let result = match archive.as_deref().and_then(|a| a.get(&pending.object_key)) {
            Some(bytes) => (pending.decode)(&pending.object_key, bytes),
            None => Err(BundleError::ObjectNotFound {
                bundle: pending.bundle_id.clone(),
                name: pending.object_key.clone(),
            }),
        };

        let value = match result {
            Ok(value) => value,
            Err(error) => {
                self.abandon(pending, Arc::new(error));
                return;
            }
        };

        if !pending.handler.is_bound(pending.cycle) {
            tracing::debug!("Request for {} was reset, dropping result", pending.object_key);
            for waiter in pending.waiters {
                (waiter.callback)(None, None);
            }
            return;
        }

        let markers: Vec<Option<ReleaseMarker>> = pending
            .waiters
            .iter()
            .map(|waiter| self.take_reference(&pending.bundle_id, waiter.retain))
            .collect();

        pending.handler.fire_preload(pending.cycle);
        pending.handler.finish(pending.cycle, value.clone());
        for (waiter, marker) in pending.waiters.into_iter().zip(markers) {
            (waiter.callback)(Some(value.clone()), marker);
        }
    }

    fn abandon(&mut self, pending: PendingObject, error: Arc<BundleError>) {
        if error.is_missing() {
            tracing::warn!("{}", error);
        } else {
            tracing::error!("Failed to load {}: {}", pending.object_key, error);
        }
        pending.handler.fail(pending.cycle, error);
        for waiter in pending.waiters {
            (waiter.callback)(None, None);
        }
    }

    /// Retain `bundle_id` when asked to or in reference mode, and hand out a
    /// marker that gives the retain back in reference mode.
    fn take_reference(&mut self, bundle_id: &str, retain: bool) -> Option<ReleaseMarker> {
        if !retain && !self.config.reference_mode {
            return None;
        }
        if let Err(error) = self.registry.retain(bundle_id) {
            tracing::warn!("Cannot retain {}: {}", bundle_id, error);
            return None;
        }
        self.config
            .reference_mode
            .then(|| ReleaseMarker::new(bundle_id, self.release_tx.clone()))
    }

    /// Release the bundle backing `path` by one reference.
    ///
    /// Does nothing in direct mode or if the bundle is not loaded.
    pub fn unload(&mut self, path: &str) {
        if !self.config.bundle_mode {
            return;
        }
        let bundle_id = self.names.bundle_name(path);
        if bundle_id.is_empty() {
            return;
        }
        self.registry.release(&bundle_id);
    }

    /// Apply releases queued by dropped markers. Returns how many were applied.
    pub fn process_releases(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(bundle_id) = self.release_rx.try_recv() {
            self.registry.release(&bundle_id);
            applied += 1;
        }
        if applied > 0 {
            tracing::trace!("Applied {} queued releases", applied);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::store::MemoryArchiveStore;
    use bale_core::ArchiveWriter;
    use bale_core::name::bundle_name;
    use parking_lot::Mutex;

    const HELLO: &str = "Assets/Text/Hello.txt";

    fn loader(config: RuntimeConfig) -> ResourceLoader {
        let mut writer = ArchiveWriter::new();
        writer.insert("assets/text/hello", b"hello".to_vec());
        let archive = Archive::parse(&writer.finish().unwrap()).unwrap();

        let mut store = MemoryArchiveStore::new();
        store.insert(bundle_name(HELLO), archive);

        let mut catalog = MemoryCatalog::new();
        catalog.insert(HELLO, "direct hello");

        let mut loader = ResourceLoader::new(config, BundleRegistry::new(store), catalog);
        loader.initialize().unwrap();
        loader
    }

    #[test]
    fn test_load_from_bundle() {
        let mut loader = loader(RuntimeConfig::default());
        let text = loader.load::<String>("Assets/Text/Hello", true).unwrap().unwrap();
        assert_eq!(text.as_str(), "hello");
        assert!(!text.is_tracked());

        let id = bundle_name(HELLO);
        assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 1);
        loader.unload(HELLO);
        assert!(loader.registry().find(&id).is_none());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let mut loader = loader(RuntimeConfig::default());
        assert!(loader.load::<String>("Assets/Nope", true).unwrap().is_none());
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_load_direct() {
        let mut loader = loader(RuntimeConfig::direct());
        let text = loader.load::<String>(HELLO, false).unwrap().unwrap();
        assert_eq!(text.as_str(), "direct hello");
        assert!(loader.registry().is_empty());
    }

    #[test]
    fn test_unload_unknown_is_noop() {
        let mut loader = loader(RuntimeConfig::default());
        loader.unload("Assets/Never/Loaded");
        loader.unload("");
    }

    #[test]
    fn test_load_async_resolves_in_update() {
        let mut loader = loader(RuntimeConfig::default());
        let got = Arc::new(Mutex::new(None));
        let g = got.clone();
        let handler = loader.load_async::<String>(
            HELLO,
            move |loaded| *g.lock() = loaded.map(|l| l.as_str().to_string()),
            false,
        );
        assert!(loader.is_loading(HELLO));
        assert!(!handler.is_done());

        loader.update();
        assert!(handler.is_done());
        assert!(!loader.is_loading(HELLO));
        assert_eq!(got.lock().as_deref(), Some("hello"));
    }

    #[test]
    fn test_reset_request_still_answers_callbacks() {
        let mut loader = loader(RuntimeConfig::default());
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        let handler = loader.load_async::<String>(
            HELLO,
            move |loaded| g.lock().push(loaded.map(|l| l.as_str().to_string())),
            true,
        );
        handler.reset();

        loader.update();
        assert_eq!(*got.lock(), vec![None]);
        assert_eq!(handler.state(), HandlerState::Idle);
        assert!(!loader.is_loading(HELLO));
        // No retain was taken for the dropped request.
        assert_eq!(loader.registry().find(&bundle_name(HELLO)).unwrap().ref_count(), 0);
    }

    #[test]
    fn test_load_async_after_reset_gets_fresh_handler() {
        let mut loader = loader(RuntimeConfig::default());
        let got = Arc::new(Mutex::new(Vec::new()));
        let g = got.clone();
        let first = loader.load_async::<String>(HELLO, move |l| g.lock().push(l.is_some()), false);
        first.reset();

        let g = got.clone();
        let second = loader.load_async::<String>(HELLO, move |l| g.lock().push(l.is_some()), false);
        assert!(!second.ptr_eq(&first));

        loader.update();
        assert!(second.is_done());
        assert_eq!(first.state(), HandlerState::Idle);
        assert_eq!(*got.lock(), vec![true, true]);
    }

    #[test]
    fn test_reference_mode_releases_on_drop() {
        let mut loader = loader(RuntimeConfig::default().with_reference_mode(true));
        let id = bundle_name(HELLO);

        let text = loader.load::<String>(HELLO, false).unwrap().unwrap();
        assert!(text.is_tracked());
        assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 1);

        let copy = text.clone();
        drop(text);
        assert_eq!(loader.process_releases(), 0);
        drop(copy);
        assert_eq!(loader.process_releases(), 1);
        assert!(loader.registry().find(&id).is_none());
    }
}
