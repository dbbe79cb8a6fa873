/*!
 * Path Resolution Benchmarks
 *
 * Measures resolver cost over deep directory chains and symlink hops.
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use posix_kernel::vfs::{Permissions, Vfs};

fn deep_tree(depth: usize) -> (Vfs, String) {
    let vfs = Vfs::new(40);
    let root = vfs.root().clone();
    let mut path = String::new();
    for level in 0..depth {
        path.push_str(&format!("/d{}", level));
        vfs.mkdir(&root, &path, Permissions::new(0o755)).unwrap();
    }
    (vfs, path)
}

/// Benchmark: absolute paths of increasing depth
fn bench_deep_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/depth");

    for depth in [1, 4, 16, 64].iter() {
        let (vfs, path) = deep_tree(*depth);
        let root = vfs.root().clone();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &path, |b, path| {
            b.iter(|| black_box(vfs.resolve(&root, black_box(path), true).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark: dot-dot walks relative to a deep working directory
fn bench_relative_walk(c: &mut Criterion) {
    let (vfs, path) = deep_tree(16);
    let root = vfs.root().clone();
    let cwd = vfs.resolve(&root, &path, true).unwrap();
    let up = "../".repeat(8);

    c.bench_function("resolve/dotdot_8", |b| {
        b.iter(|| black_box(vfs.resolve(&cwd, black_box(&up), true).unwrap()))
    });
}

/// Benchmark: chains of symlinks
fn bench_symlink_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve/symlink_chain");

    for hops in [1, 8, 32].iter() {
        let (vfs, target) = deep_tree(4);
        let root = vfs.root().clone();
        let mut previous = target;
        for hop in 0..*hops {
            let link = format!("/link{}", hop);
            vfs.symlink(&root, &previous, &link).unwrap();
            previous = link;
        }

        group.bench_with_input(BenchmarkId::from_parameter(hops), &previous, |b, link| {
            b.iter(|| black_box(vfs.resolve(&root, black_box(link), true).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_deep_paths, bench_relative_walk, bench_symlink_chain);
criterion_main!(benches);
