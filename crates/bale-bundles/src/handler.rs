//! Async load handlers.
//!
//! A [`Handler`] is the shared request object for one logical load. Every
//! caller that asks for the same key while the load is in flight receives a
//! clone of the same handler, so they all observe completion in the same tick.
//!
//! Handlers are driven from outside: the registry (or the resource loader)
//! calls the crate-private transition methods as the underlying work
//! progresses. Hooks are always invoked with the lock released, so a hook may
//! freely inspect the handler it was registered on.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BundleError;

/// The state of a [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerState {
    /// Not started, or reset after completion.
    #[default]
    Idle,

    /// Work is in progress.
    Loading,

    /// The value is available.
    Done,

    /// The load failed.
    Error,
}

impl HandlerState {
    /// Returns true if loading has completed (successfully or not).
    pub fn is_done(&self) -> bool {
        matches!(self, HandlerState::Done | HandlerState::Error)
    }
}

/// Result of a single [`advance`](crate::BundleRegistry::advance) step.
///
/// This is deliberately separate from [`Handler::is_done`]: a step reports
/// whether the caller should keep driving the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStep {
    /// Work remains; advance again later.
    Pending,

    /// Nothing left to do.
    Complete,
}

/// A one-shot hook run around completion.
pub type Hook = Box<dyn FnOnce(&Handler) + Send + 'static>;

/// The value produced by a handler.
pub type HandlerValue = Arc<dyn Any + Send + Sync>;

struct Inner {
    key: String,
    state: HandlerState,
    done: u32,
    total: u32,
    cycle: u64,
    value: Option<HandlerValue>,
    error: Option<Arc<BundleError>>,
    preload: Vec<Hook>,
    postload: Vec<Hook>,
}

/// A shared async load request.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<Mutex<Inner>>,
}

impl Handler {
    /// Create an idle handler for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                key: key.into(),
                state: HandlerState::Idle,
                done: 0,
                total: 0,
                cycle: 0,
                value: None,
                error: None,
                preload: Vec::new(),
                postload: Vec::new(),
            })),
        }
    }

    /// Create a handler that has already completed with `value`.
    pub fn completed(key: impl Into<String>, value: HandlerValue) -> Self {
        let handler = Self::new(key);
        {
            let mut inner = handler.inner.lock();
            inner.state = HandlerState::Done;
            inner.done = 1;
            inner.total = 1;
            inner.value = Some(value);
        }
        handler
    }

    /// Create a handler that has already failed.
    pub fn failed(key: impl Into<String>, error: BundleError) -> Self {
        let handler = Self::new(key);
        {
            let mut inner = handler.inner.lock();
            inner.state = HandlerState::Error;
            inner.error = Some(Arc::new(error));
        }
        handler
    }

    /// The key this handler loads.
    pub fn key(&self) -> String {
        self.inner.lock().key.clone()
    }

    /// Current state.
    pub fn state(&self) -> HandlerState {
        self.inner.lock().state
    }

    /// Returns true once the load has completed (successfully or not).
    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// Returns true while work is in progress.
    pub fn is_loading(&self) -> bool {
        self.state() == HandlerState::Loading
    }

    /// Number of finished units of work.
    pub fn done_count(&self) -> u32 {
        self.inner.lock().done
    }

    /// Total units of work.
    pub fn total_count(&self) -> u32 {
        self.inner.lock().total
    }

    /// Fraction of work done, in `0.0..=1.0`. Zero when there is no work.
    pub fn progress(&self) -> f32 {
        let inner = self.inner.lock();
        if inner.total == 0 {
            0.0
        } else {
            inner.done as f32 / inner.total as f32
        }
    }

    /// The current cycle. Bumped by every [`reset`](Self::reset).
    pub fn cycle(&self) -> u64 {
        self.inner.lock().cycle
    }

    /// The produced value, if the handler is done.
    pub fn value_any(&self) -> Option<HandlerValue> {
        self.inner.lock().value.clone()
    }

    /// The produced value downcast to `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value_any().and_then(|v| v.downcast::<T>().ok())
    }

    /// The error, if the handler failed.
    pub fn error(&self) -> Option<Arc<BundleError>> {
        self.inner.lock().error.clone()
    }

    /// Check if two handlers share the same request.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `hook` immediately before the value becomes available.
    ///
    /// Fires at once if the handler is already done. Dropped without running
    /// if the load fails or the handler is reset first.
    pub fn on_preload(&self, hook: impl FnOnce(&Handler) + Send + 'static) {
        self.add_hook(hook, true);
    }

    /// Run `hook` immediately after the value becomes available.
    ///
    /// Fires at once if the handler is already done. Dropped without running
    /// if the load fails or the handler is reset first.
    pub fn on_postload(&self, hook: impl FnOnce(&Handler) + Send + 'static) {
        self.add_hook(hook, false);
    }

    fn add_hook(&self, hook: impl FnOnce(&Handler) + Send + 'static, preload: bool) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            HandlerState::Done => {
                drop(inner);
                hook(self);
            }
            HandlerState::Error => {}
            HandlerState::Idle | HandlerState::Loading => {
                let list = if preload { &mut inner.preload } else { &mut inner.postload };
                list.push(Box::new(hook));
            }
        }
    }

    /// Return to `Idle` so the handler can be reused.
    ///
    /// Counts, value, error and hooks are cleared and the cycle is bumped. Any
    /// work still running for the previous cycle keeps running but no longer
    /// touches this handler.
    pub fn reset(&self) {
        let (preload, postload) = {
            let mut inner = self.inner.lock();
            inner.state = HandlerState::Idle;
            inner.done = 0;
            inner.total = 0;
            inner.cycle += 1;
            inner.value = None;
            inner.error = None;
            (
                std::mem::take(&mut inner.preload),
                std::mem::take(&mut inner.postload),
            )
        };
        // Hooks may own other handlers; drop them outside the lock.
        drop(preload);
        drop(postload);
    }

    /// Start a load of `total` units. Returns the cycle the work is bound to.
    pub(crate) fn begin(&self, total: u32) -> u64 {
        let mut inner = self.inner.lock();
        inner.state = HandlerState::Loading;
        inner.done = 0;
        inner.total = total;
        inner.error = None;
        inner.value = None;
        inner.cycle
    }

    /// Check if `cycle` still owns this handler.
    pub(crate) fn is_bound(&self, cycle: u64) -> bool {
        let inner = self.inner.lock();
        inner.cycle == cycle && inner.state == HandlerState::Loading
    }

    pub(crate) fn set_progress(&self, cycle: u64, done: u32, total: u32) {
        let mut inner = self.inner.lock();
        if inner.cycle == cycle && inner.state == HandlerState::Loading {
            inner.done = done.min(total);
            inner.total = total;
        }
    }

    /// Fire the pre-load hooks for `cycle`.
    pub(crate) fn fire_preload(&self, cycle: u64) {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.cycle != cycle || inner.state != HandlerState::Loading {
                return;
            }
            std::mem::take(&mut inner.preload)
        };
        for hook in hooks {
            hook(self);
        }
    }

    /// Publish `value`, mark the handler done and fire the post-load hooks.
    pub(crate) fn finish(&self, cycle: u64, value: HandlerValue) {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.cycle != cycle || inner.state != HandlerState::Loading {
                return;
            }
            inner.state = HandlerState::Done;
            inner.done = inner.total.max(1);
            inner.total = inner.done;
            inner.value = Some(value);
            inner.preload.clear();
            std::mem::take(&mut inner.postload)
        };
        for hook in hooks {
            hook(self);
        }
    }

    /// Mark the handler failed. Pending hooks are dropped.
    pub(crate) fn fail(&self, cycle: u64, error: Arc<BundleError>) {
        let hooks = {
            let mut inner = self.inner.lock();
            if inner.cycle != cycle || inner.state != HandlerState::Loading {
                return;
            }
            inner.state = HandlerState::Error;
            inner.error = Some(error);
            (
                std::mem::take(&mut inner.preload),
                std::mem::take(&mut inner.postload),
            )
        };
        drop(hooks);
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Handler")
            .field("key", &inner.key)
            .field("state", &inner.state)
            .field("done", &inner.done)
            .field("total", &inner.total)
            .field("cycle", &inner.cycle)
            .finish()
    }
}
