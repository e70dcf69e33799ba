//! End-to-end example: build bundles for a tiny project, then load them.
//!
//! This example shows how to:
//! - Describe asset dependencies with a `MemoryAssetGraph`
//! - Run a `BuildTask` and inspect its partition log
//! - Load objects back asynchronously and watch reference counts
//!
//! Run with: cargo run -p bale --example build_and_load

use std::fs;

use bale::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    bale::init_logging();

    let project = std::env::temp_dir().join("bale-example");
    let _ = fs::remove_dir_all(&project);
    for (path, body) in [
        ("Assets/Scenes/Main.unity", "scene"),
        ("Assets/Materials/Rock.mat", "material"),
        ("Assets/Textures/Rock.png", "texture"),
    ] {
        let full = project.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, body)?;
    }

    let mut graph = MemoryAssetGraph::new();
    graph
        .insert("Assets/Scenes/Main.unity", &["Assets/Materials/Rock.mat"])
        .insert("Assets/Materials/Rock.mat", &["Assets/Textures/Rock.png"]);

    let config = BuildConfig::new(&project)
        .include(["Assets/Scenes"])
        .with_offset_factor(3);
    let report = BuildTask::new(config, graph).run()?;

    println!("Built {} bundles:", report.bundle_count());
    for line in report.partition.log() {
        println!("  {}", line);
    }

    let mut loader = ResourceLoader::from_config(RuntimeConfig {
        bundle_dir: project.join("bundles"),
        offset_factor: 3,
        ..RuntimeConfig::default()
    });
    loader.initialize()?;

    let handler = loader.load_async::<String>(
        "Assets/Scenes/Main.unity",
        |scene| match scene {
            Some(scene) => println!("Loaded scene: {}", scene.as_str()),
            None => println!("Scene failed to load"),
        },
        true,
    );
    while !handler.is_done() {
        loader.update();
    }
    loader.update();

    for id in loader.registry().ids() {
        if let Some(record) = loader.registry().find(id) {
            println!("{} refs={}", id, record.ref_count());
        }
    }

    loader.unload("Assets/Scenes/Main.unity");
    println!("Bundles still loaded: {}", loader.registry().len());
    Ok(())
}
