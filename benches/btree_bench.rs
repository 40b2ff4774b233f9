//! B-tree operation benchmarks.

use blocktree::{hash_str, BTree, TreeConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

const KEY_COUNT: u64 = 2_000;

fn build_tree(max_keys: usize, count: u64) -> (BTree, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut tree = BTree::create(dir.path().join("bench.idx"), TreeConfig::new(max_keys).unwrap())
        .unwrap();
    for k in 0..count {
        // Spread keys so splits happen across the whole tree
        tree.insert(k.wrapping_mul(0x9E37_79B9_7F4A_7C15)).unwrap();
    }
    (tree, dir)
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/insert");
    group.sample_size(20);
    group.throughput(Throughput::Elements(KEY_COUNT));

    for max_keys in [2usize, 6, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(max_keys), &max_keys, |b, &m| {
            b.iter(|| black_box(build_tree(m, KEY_COUNT)));
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/search");
    group.sample_size(20);

    for max_keys in [2usize, 6, 32] {
        let (mut tree, _dir) = build_tree(max_keys, KEY_COUNT);
        let probe = (KEY_COUNT / 2).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        group.bench_with_input(BenchmarkId::from_parameter(max_keys), &probe, |b, &k| {
            b.iter(|| black_box(tree.search(k).unwrap()));
        });
    }
    group.finish();
}

fn bench_delete_reinsert(c: &mut Criterion) {
    let (mut tree, _dir) = build_tree(6, KEY_COUNT);
    let key = 7u64.wrapping_mul(0x9E37_79B9_7F4A_7C15);

    c.bench_function("btree/delete_reinsert", |b| {
        b.iter(|| {
            tree.delete(black_box(key)).unwrap();
            tree.insert(black_box(key)).unwrap();
        });
    });
}

fn bench_hash(c: &mut Criterion) {
    let path = "/usr/share/doc/blocktree/examples/quickstart.md";
    c.bench_function("hash_str", |b| b.iter(|| black_box(hash_str(black_box(path)))));
}

criterion_group!(
    benches,
    bench_insert,
    bench_search,
    bench_delete_reinsert,
    bench_hash
);
criterion_main!(benches);
