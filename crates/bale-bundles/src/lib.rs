//! Bale Bundles - runtime bundle loading with reference counting.
//!
//! The [`BundleRegistry`] opens bundle archives through an [`ArchiveStore`],
//! chains their dependencies, coalesces concurrent async loads behind a shared
//! [`Handler`], and unloads a bundle the moment its reference count drops to
//! zero. The [`ResourceLoader`] sits on top and hands out typed objects by
//! asset path, either from bundles or straight from a [`Catalog`].
//!
//! # Example
//!
//! ```
//! use bale_bundles::{BundleRegistry, HandlerState, MemoryArchiveStore};
//! use bale_core::Archive;
//!
//! let mut store = MemoryArchiveStore::new();
//! store
//!     .insert("scene.bundle", Archive::default())
//!     .insert("shared.bundle", Archive::default())
//!     .set_dependencies("scene.bundle", &["shared.bundle"]);
//!
//! let mut registry = BundleRegistry::new(store);
//! registry.initialize().unwrap();
//!
//! let first = registry.load_async("scene.bundle");
//! let second = registry.load_async("scene.bundle");
//! assert!(first.ptr_eq(&second));
//!
//! while registry.update() == 0 {}
//! assert_eq!(first.state(), HandlerState::Done);
//! assert_eq!(registry.find("shared.bundle").unwrap().ref_count(), 1);
//! ```

pub mod asset;
pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod loader;
pub mod marker;
pub mod registry;
pub mod store;

pub use asset::Asset;
pub use catalog::{Catalog, DirectoryCatalog, MemoryCatalog};
pub use config::RuntimeConfig;
pub use error::{BundleError, BundleResult};
pub use event::{BundleEvent, BundleEventBuffer, Observer};
pub use handler::{Handler, HandlerState, HandlerStep, HandlerValue, Hook};
pub use loader::ResourceLoader;
pub use marker::{Loaded, ReleaseMarker};
pub use registry::{BundleRecord, BundleRegistry, MAX_WAIT_TICKS};
pub use store::{ArchiveFuture, ArchiveStore, FileArchiveStore, MemoryArchiveStore};
