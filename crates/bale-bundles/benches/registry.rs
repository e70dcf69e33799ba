//! Benchmarks for the bundle registry and name resolution.

use bale_bundles::{BundleRegistry, MemoryArchiveStore};
use bale_core::{Archive, NameResolver};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn chain_store(len: usize) -> MemoryArchiveStore {
    let mut store = MemoryArchiveStore::new();
    for i in 0..len {
        let id = format!("b{}.bundle", i);
        store.insert(id.clone(), Archive::default());
        if i + 1 < len {
            let next = format!("b{}.bundle", i + 1);
            store.set_dependencies(id, &[next.as_str()]);
        }
    }
    store
}

fn bench_retain_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("retain_release");

    for count in [10u32, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut registry = BundleRegistry::new(chain_store(1));
            registry.initialize().unwrap();
            registry.load("b0.bundle").unwrap();
            registry.retain("b0.bundle").unwrap();

            b.iter(|| {
                for _ in 0..count {
                    registry.retain(black_box("b0.bundle")).unwrap();
                }
                for _ in 0..count {
                    registry.release(black_box("b0.bundle"));
                }
            });
        });
    }

    group.finish();
}

fn bench_load_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_chain");

    for len in [4usize, 32, 128] {
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("sync", len), &len, |b, &len| {
            let mut registry = BundleRegistry::new(chain_store(len));
            registry.initialize().unwrap();
            b.iter(|| {
                registry.load(black_box("b0.bundle")).unwrap();
                registry.retain("b0.bundle").unwrap();
                registry.release("b0.bundle");
            });
        });

        group.bench_with_input(BenchmarkId::new("async", len), &len, |b, &len| {
            let mut registry = BundleRegistry::new(chain_store(len));
            registry.initialize().unwrap();
            b.iter(|| {
                let handler = registry.load_async(black_box("b0.bundle"));
                registry.wait(&handler);
                registry.retain("b0.bundle").unwrap();
                registry.release("b0.bundle");
            });
        });
    }

    group.finish();
}

fn bench_bundle_name(c: &mut Criterion) {
    let paths: Vec<String> = (0..1000)
        .map(|i| format!("Assets/Textures/Set{}/Tex{}.png", i % 17, i))
        .collect();

    let mut group = c.benchmark_group("bundle_name");
    group.throughput(Throughput::Elements(paths.len() as u64));

    group.bench_function("uncached", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(bale_core::name::bundle_name(path));
            }
        });
    });

    group.bench_function("cached", |b| {
        let mut resolver = NameResolver::new();
        b.iter(|| {
            for path in &paths {
                black_box(resolver.bundle_name(path.as_str()));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_retain_release, bench_load_chain, bench_bundle_name);
criterion_main!(benches);
