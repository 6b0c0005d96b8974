//! Benchmark for dotted-name resolution and package walking.

use std::fs;
use std::path::Path;

use asg_loader::ModuleLoader;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

/// Пакет `bench` с `width` подпакетами по `width` модулей в каждом.
fn package_tree(width: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let write = |relative: &str, contents: &str| {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    };

    write("bench/mod.asg", "(let VERSION \"1.0\")");
    for p in 0..width {
        write(&format!("bench/pkg{}/mod.asg", p), "");
        for m in 0..width {
            write(
                &format!("bench/pkg{}/mod{}.asg", p, m),
                &format!("(fn run (x) (* x {}))\n(let ID {})", m, m),
            );
        }
    }
    dir
}

fn loader_for(root: &Path) -> ModuleLoader {
    ModuleLoader::with_search_paths(vec![root.to_path_buf()])
}

fn benchmark_walk_cold(c: &mut Criterion) {
    let tree = package_tree(8);
    c.bench_function("walk 8x8 package (cold registry)", |b| {
        b.iter(|| {
            let mut loader = loader_for(tree.path());
            black_box(loader.walk_modules("bench").unwrap().count())
        });
    });
}

fn benchmark_walk_warm(c: &mut Criterion) {
    let tree = package_tree(8);
    let mut loader = loader_for(tree.path());
    loader.walk_modules("bench").unwrap().for_each(drop);
    c.bench_function("walk 8x8 package (warm registry)", |b| {
        b.iter(|| black_box(loader.walk_modules("bench").unwrap().count()));
    });
}

fn benchmark_load_object(c: &mut Criterion) {
    let tree = package_tree(4);
    let mut loader = loader_for(tree.path());
    c.bench_function("load_object bench.pkg3.mod3.run", |b| {
        b.iter(|| black_box(loader.load_object("bench.pkg3.mod3.run").unwrap()));
    });
    c.bench_function("load_object missing attribute", |b| {
        b.iter(|| black_box(loader.load_object("bench.pkg3.mod3.nothing").is_err()));
    });
}

criterion_group!(
    benches,
    benchmark_walk_cold,
    benchmark_walk_warm,
    benchmark_load_object
);
criterion_main!(benches);
