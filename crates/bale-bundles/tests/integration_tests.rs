//! Integration tests for the bundle runtime.
//!
//! These tests use tempfile to create isolated bundle directories, and the
//! mock store from bale-test-utils to control when async opens complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bale_bundles::*;
use bale_core::dependency::INDEX_FILE_NAME;
use bale_core::name::bundle_name;
use bale_core::{ArchiveWriter, offset};
use bale_test_utils::{MockArchiveStore, StoreCall};
use parking_lot::Mutex;

// ============================================================================
// Test Asset Types
// ============================================================================

/// A simple test config asset.
#[derive(Debug, Clone, PartialEq)]
struct TestConfig {
    name: String,
    value: i32,
}

impl Asset for TestConfig {
    fn type_name() -> &'static str {
        "TestConfig"
    }

    fn from_bytes(name: &str, bytes: &[u8]) -> BundleResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| BundleError::DecodeError {
            name: name.to_string(),
            message: format!("Invalid UTF-8: {}", e),
        })?;

        let mut config = TestConfig {
            name: String::new(),
            value: 0,
        };
        for line in text.lines() {
            match line.split_once(':') {
                Some(("name", v)) => config.name = v.trim().to_string(),
                Some(("value", v)) => {
                    config.value = v.trim().parse().map_err(|_| BundleError::DecodeError {
                        name: name.to_string(),
                        message: format!("bad value: {}", v),
                    })?
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const CONFIG_PATH: &str = "Assets/Configs/Game.cfg";
const TEXTURE_PATH: &str = "Assets/Textures/Rock.png";

fn registry_with(store: &MockArchiveStore) -> BundleRegistry {
    let mut registry = BundleRegistry::new(store.clone());
    registry.initialize().unwrap();
    registry
}

fn loader_with(store: &MockArchiveStore, config: RuntimeConfig) -> ResourceLoader {
    let mut loader = ResourceLoader::new(config, BundleRegistry::new(store.clone()), MemoryCatalog::new());
    loader.initialize().unwrap();
    loader
}

/// A store holding the config object in its file bundle.
fn config_store() -> MockArchiveStore {
    let store = MockArchiveStore::new();
    store.insert_objects(
        bundle_name(CONFIG_PATH),
        &[("assets/configs/game", b"name: TestGame\nvalue: 42\n")],
    );
    store
}

fn write_bundle(dir: &std::path::Path, id: &str, objects: &[(&str, &[u8])], factor: u32) {
    let mut writer = ArchiveWriter::new();
    for (name, bytes) in objects {
        writer.insert(*name, bytes.to_vec());
    }
    let bytes = writer.finish().unwrap();
    let bytes = offset::apply(&bytes, id, factor).unwrap_or(bytes);
    std::fs::write(dir.join(id), bytes).unwrap();
}

// ============================================================================
// Reference Counting Tests
// ============================================================================

#[test]
fn test_retain_release_symmetry() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    let mut registry = registry_with(&store);

    registry.load("a.bundle").unwrap();
    for n in 1..=5 {
        assert_eq!(registry.retain("a.bundle").unwrap(), n);
    }
    for n in (0..5).rev() {
        assert!(registry.contains("a.bundle"));
        assert_eq!(registry.release("a.bundle"), n);
    }
    assert!(registry.find("a.bundle").is_none());
    assert_eq!(store.count_opens("a.bundle"), 1);
}

#[test]
fn test_shared_dependency_survives_one_parent() {
    let store = MockArchiveStore::new();
    store.insert_objects("left.bundle", &[("l", b"l")]);
    store.insert_objects("right.bundle", &[("r", b"r")]);
    store.insert_objects("shared.bundle", &[("s", b"s")]);
    store.set_dependencies("left.bundle", &["shared.bundle"]);
    store.set_dependencies("right.bundle", &["shared.bundle"]);
    let mut registry = registry_with(&store);

    registry.load("left.bundle").unwrap();
    registry.load("right.bundle").unwrap();
    assert_eq!(registry.find("shared.bundle").unwrap().ref_count(), 2);
    assert_eq!(store.count_opens("shared.bundle"), 1);

    registry.retain("left.bundle").unwrap();
    registry.release("left.bundle");
    assert_eq!(registry.find("shared.bundle").unwrap().ref_count(), 1);

    registry.retain("right.bundle").unwrap();
    registry.release("right.bundle");
    assert!(registry.is_empty());
}

#[test]
fn test_unload_events_carry_archive() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("x", b"1"), ("y", b"2")]);
    let mut registry = registry_with(&store);

    let unloaded = Arc::new(Mutex::new(Vec::new()));
    let u = unloaded.clone();
    registry.subscribe(move |event| {
        if let BundleEvent::Unloaded { id, archive } = event {
            u.lock().push((id.clone(), archive.len()));
        }
    });

    registry.load("a.bundle").unwrap();
    registry.retain("a.bundle").unwrap();
    registry.release("a.bundle");

    assert_eq!(*unloaded.lock(), vec![("a.bundle".to_string(), 2)]);
    let events: Vec<_> = registry.drain_events().collect();
    assert!(events[0].is_loaded());
    assert!(events[1].is_unloaded());
}

// ============================================================================
// Async Coalescing Tests
// ============================================================================

#[test]
fn test_concurrent_load_async_opens_once() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.defer(true);
    let mut registry = registry_with(&store);

    let handlers: Vec<Handler> = (0..8).map(|_| registry.load_async("a.bundle")).collect();
    for _ in 0..3 {
        registry.update();
    }
    assert!(handlers.iter().all(|h| h.is_loading()));

    store.complete_all();
    assert_eq!(registry.update(), 1);

    assert!(handlers.iter().all(|h| h.is_done()));
    assert!(handlers.iter().all(|h| h.ptr_eq(&handlers[0])));
    let archive = handlers[0].value::<bale_core::Archive>().unwrap();
    assert!(Arc::ptr_eq(&archive, registry.find("a.bundle").unwrap().archive()));
    assert_eq!(store.count_opens("a.bundle"), 1);
}

#[test]
fn test_progress_tracks_dependencies() {
    let store = MockArchiveStore::new();
    for id in ["scene.bundle", "d1.bundle", "d2.bundle", "d3.bundle", "d4.bundle"] {
        store.insert_objects(id, &[("x", b"x")]);
    }
    store.set_dependencies(
        "scene.bundle",
        &["d1.bundle", "d2.bundle", "d3.bundle", "d4.bundle"],
    );
    store.defer(true);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("scene.bundle");
    assert_eq!(handler.total_count(), 5);
    assert_eq!(handler.progress(), 0.0);

    store.complete("d1.bundle");
    store.complete("d2.bundle");
    assert_eq!(registry.advance(&handler), HandlerStep::Pending);
    assert!((handler.progress() - 0.4).abs() < f32::EPSILON);

    store.complete_all();
    assert_eq!(registry.advance(&handler), HandlerStep::Complete);
    assert_eq!(handler.state(), HandlerState::Done);
    assert_eq!(handler.progress(), 1.0);
    for dep in ["d1.bundle", "d2.bundle", "d3.bundle", "d4.bundle"] {
        assert_eq!(registry.find(dep).unwrap().ref_count(), 1);
    }
}

#[test]
fn test_hooks_fire_around_publication() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("a.bundle");
    let order = Arc::new(Mutex::new(Vec::new()));
    let o = order.clone();
    handler.on_preload(move |h| o.lock().push(("pre", h.is_done())));
    let o = order.clone();
    handler.on_postload(move |h| o.lock().push(("post", h.is_done())));

    registry.wait(&handler);
    assert_eq!(*order.lock(), vec![("pre", false), ("post", true)]);
}

#[test]
fn test_reset_detaches_native_request() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.defer(true);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("a.bundle");
    let fired = Arc::new(AtomicU32::new(0));
    let f = fired.clone();
    handler.on_postload(move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    handler.reset();
    assert_eq!(registry.advance(&handler), HandlerStep::Complete);

    // The work still runs to completion, but the reset handler is untouched.
    store.complete_all();
    registry.update();
    assert_eq!(handler.state(), HandlerState::Idle);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(registry.contains("a.bundle"));
}

#[test]
fn test_load_after_reset_observes_completion() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.defer(true);
    let mut registry = registry_with(&store);

    let first = registry.load_async("a.bundle");
    first.reset();
    let second = registry.load_async("a.bundle");
    let third = registry.load_async("a.bundle");
    assert!(second.ptr_eq(&third));
    assert!(!second.ptr_eq(&first));

    store.complete_all();
    assert_eq!(registry.wait(&second), HandlerState::Done);
    assert!(third.value::<bale_core::Archive>().is_some());
    assert_eq!(first.state(), HandlerState::Idle);
    assert_eq!(store.count_opens("a.bundle"), 1);
}

#[test]
fn test_async_chain_failure_leaves_nothing_registered() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.insert_objects("b.bundle", &[("b", b"b")]);
    store.set_dependencies("a.bundle", &["b.bundle", "gone.bundle"]);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("a.bundle");
    assert_eq!(registry.wait(&handler), HandlerState::Error);
    assert!(registry.is_empty());

    assert!(registry.load("a.bundle").is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_wait_is_bounded() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.defer(true);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("a.bundle");
    assert_eq!(registry.wait(&handler), HandlerState::Loading);
    assert_eq!(store.held(), vec!["a.bundle".to_string()]);
}

#[test]
fn test_async_dependency_failure() {
    let store = MockArchiveStore::new();
    store.insert_objects("a.bundle", &[("a", b"a")]);
    store.set_dependencies("a.bundle", &["gone.bundle"]);
    let mut registry = registry_with(&store);

    let handler = registry.load_async("a.bundle");
    assert_eq!(registry.wait(&handler), HandlerState::Error);
    assert!(matches!(
        handler.error().as_deref(),
        Some(BundleError::DependencyFailed { .. })
    ));
    assert!(registry.is_empty());
}

// ============================================================================
// Resource Loader Tests
// ============================================================================

#[test]
fn test_load_typed_object() {
    let store = config_store();
    let mut loader = loader_with(&store, RuntimeConfig::default());

    let config = loader.load::<TestConfig>(CONFIG_PATH, false).unwrap().unwrap();
    assert_eq!(config.name, "TestGame");
    assert_eq!(config.value, 42);

    // Game code usually omits the extension.
    let again = loader.load::<TestConfig>("Assets/Configs/Game", false).unwrap().unwrap();
    assert_eq!(*again, *config);
    assert_eq!(store.count_opens(&bundle_name(CONFIG_PATH)), 1);
}

#[test]
fn test_wrong_type_is_an_error() {
    let store = MockArchiveStore::new();
    store.insert_objects(bundle_name(TEXTURE_PATH), &[("assets/textures/rock", &[0xff, 0xfe, 0x00])]);
    let mut loader = loader_with(&store, RuntimeConfig::default());

    assert!(loader.load::<String>(TEXTURE_PATH, false).is_err());
    assert!(loader.load::<Vec<u8>>(TEXTURE_PATH, false).unwrap().is_some());
}

#[test]
fn test_missing_object_in_existing_bundle() {
    let store = MockArchiveStore::new();
    store.insert_objects(bundle_name(CONFIG_PATH), &[("something/else", b"x")]);
    let mut loader = loader_with(&store, RuntimeConfig::default());

    assert!(loader.load::<TestConfig>(CONFIG_PATH, true).unwrap().is_none());
    let id = bundle_name(CONFIG_PATH);
    assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 0);
}

#[test]
fn test_load_async_dedups_by_path() {
    let store = config_store();
    store.defer(true);
    let mut loader = loader_with(&store, RuntimeConfig::default());

    let results = Arc::new(Mutex::new(Vec::new()));
    let r1 = results.clone();
    let first = loader.load_async::<TestConfig>(CONFIG_PATH, move |c| r1.lock().push(c.map(|c| c.value)), false);
    let r2 = results.clone();
    let second = loader.load_async::<TestConfig>(CONFIG_PATH, move |c| r2.lock().push(c.map(|c| c.value)), false);

    assert!(first.ptr_eq(&second));
    assert!(loader.is_loading(CONFIG_PATH));
    assert!(!loader.is_loading("Assets/Configs/Game"));

    loader.update();
    assert!(results.lock().is_empty());

    store.complete_all();
    assert_eq!(loader.update(), 1);
    assert_eq!(*results.lock(), vec![Some(42), Some(42)]);
    assert!(!loader.is_loading(CONFIG_PATH));
    assert_eq!(store.count_opens(&bundle_name(CONFIG_PATH)), 1);
}

#[test]
fn test_load_async_missing_object() {
    let store = MockArchiveStore::new();
    store.insert_objects(bundle_name(CONFIG_PATH), &[]);
    let mut loader = loader_with(&store, RuntimeConfig::default());

    let result = Arc::new(Mutex::new(Some(Some(0))));
    let r = result.clone();
    let handler = loader.load_async::<TestConfig>(CONFIG_PATH, move |c| *r.lock() = Some(c.map(|c| c.value)), true);
    loader.update();

    assert!(handler.is_done());
    assert_eq!(handler.state(), HandlerState::Error);
    assert_eq!(*result.lock(), Some(None));
    // No retain was taken for the missing object.
    let id = bundle_name(CONFIG_PATH);
    assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 0);
}

#[test]
fn test_load_async_missing_bundle() {
    let store = MockArchiveStore::new();
    let mut loader = loader_with(&store, RuntimeConfig::default());

    let called = Arc::new(AtomicU32::new(0));
    let c = called.clone();
    let handler = loader.load_async::<TestConfig>(
        CONFIG_PATH,
        move |config| {
            assert!(config.is_none());
            c.fetch_add(1, Ordering::SeqCst);
        },
        false,
    );
    loader.update();

    assert_eq!(handler.state(), HandlerState::Error);
    assert_eq!(called.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reference_mode_async_release() {
    let store = config_store();
    let mut loader = loader_with(&store, RuntimeConfig::default().with_reference_mode(true));
    let id = bundle_name(CONFIG_PATH);

    let slot = Arc::new(Mutex::new(None));
    let s = slot.clone();
    loader.load_async::<TestConfig>(CONFIG_PATH, move |c| *s.lock() = c, false);
    loader.update();

    let config = slot.lock().take().unwrap();
    assert!(config.is_tracked());
    assert_eq!(config.bundle_id(), Some(id.as_str()));
    assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 1);

    drop(config);
    loader.update();
    assert!(loader.registry().find(&id).is_none());
}

#[test]
fn test_retain_then_unload() {
    let store = config_store();
    let mut loader = loader_with(&store, RuntimeConfig::default());
    let id = bundle_name(CONFIG_PATH);

    loader.load::<TestConfig>(CONFIG_PATH, true).unwrap().unwrap();
    loader.load::<TestConfig>(CONFIG_PATH, true).unwrap().unwrap();
    assert_eq!(loader.registry().find(&id).unwrap().ref_count(), 2);

    loader.unload(CONFIG_PATH);
    assert!(loader.registry().contains(&id));
    loader.unload(CONFIG_PATH);
    assert!(!loader.registry().contains(&id));

    // Unloading again is harmless.
    loader.unload(CONFIG_PATH);
}

#[test]
fn test_direct_mode_skips_index() {
    let store = config_store();
    let mut loader = loader_with(&store, RuntimeConfig::default());
    loader.initialize().unwrap();
    assert_eq!(
        store.calls().iter().filter(|c| **c == StoreCall::ReadIndex).count(),
        2
    );

    let mut direct = loader_with(&store, RuntimeConfig::direct());
    direct.initialize().unwrap();
    assert_eq!(
        store.calls().iter().filter(|c| **c == StoreCall::ReadIndex).count(),
        2
    );
}

// ============================================================================
// On-Disk Tests
// ============================================================================

#[test]
fn test_file_bundles_with_offset_and_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir = temp_dir.path();

    let material = bundle_name("Assets/Materials/Rock.mat");
    let texture = bundle_name(TEXTURE_PATH);
    write_bundle(dir, &material, &[("assets/materials/rock", b"albedo=rock")], 4);
    write_bundle(dir, &texture, &[("assets/textures/rock", &[1, 2, 3, 4])], 4);
    std::fs::write(dir.join(INDEX_FILE_NAME), format!("{}|{}\n", material, texture)).unwrap();

    let mut settings = bale_core::Settings::parse("offset_factor = 4\n").unwrap();
    settings.set("bundle_dir", dir.display().to_string());
    let config = RuntimeConfig::from_settings(&settings).unwrap();
    let mut loader = ResourceLoader::from_config(config);
    loader.initialize().unwrap();

    let text = loader.load::<String>("Assets/Materials/Rock", true).unwrap().unwrap();
    assert_eq!(text.as_str(), "albedo=rock");
    assert_eq!(loader.registry().find(&texture).unwrap().ref_count(), 1);

    loader.unload("Assets/Materials/Rock.mat");
    assert!(loader.registry().is_empty());
}

#[test]
fn test_direct_mode_reads_project_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("Assets/Configs")).unwrap();
    std::fs::write(temp_dir.path().join(CONFIG_PATH), "name: Direct\nvalue: 7\n").unwrap();

    let mut config = RuntimeConfig::direct();
    config.catalog_dir = temp_dir.path().to_path_buf();
    let mut loader = ResourceLoader::from_config(config);
    loader.initialize().unwrap();

    let loaded = loader.load::<TestConfig>("Assets/Configs/Game", true).unwrap().unwrap();
    assert_eq!(loaded.name, "Direct");
    assert!(!loaded.is_tracked());

    let handler = loader.load_async::<TestConfig>(CONFIG_PATH, |c| assert!(c.is_some()), false);
    assert!(handler.is_done());
    assert!(loader.registry().is_empty());
}
