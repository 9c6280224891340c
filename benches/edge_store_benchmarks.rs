use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use edgegraph::schema::edge_graph_definitions;
use edgegraph::{Edge, EdgeStore, EdgeStoreConfig, InMemoryStore, Provisioner, RocksStore};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn star(hub: &str, size: usize) -> Vec<Edge> {
    (0..size)
        .map(|i| Edge::new(hub, format!("n{}", i)).with_area("bench"))
        .collect()
}

async fn memory_store() -> EdgeStore<InMemoryStore> {
    let config = EdgeStoreConfig::default();
    let kv = Arc::new(InMemoryStore::new());
    Provisioner::new(edge_graph_definitions(&config))
        .migrate(&*kv)
        .await
        .unwrap();
    EdgeStore::new(kv, config)
}

/// Benchmark chunked upserts on the in-memory backend
fn bench_memory_upsert(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("memory_upsert");

    for size in [25, 250, 2_500].iter() {
        let edges = star("hub", *size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let store = memory_store().await;
                    store.upsert_edges(&edges).await.unwrap();
                })
            });
        });
    }
    group.finish();
}

/// Benchmark paginated reads through the reverse and area indexes
fn bench_memory_reads(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("memory_reads");

    for size in [100, 1_000, 10_000].iter() {
        let store = rt.block_on(async {
            let store = memory_store().await;
            let edges: Vec<Edge> = (0..*size)
                .map(|i| Edge::new(format!("d{}", i), "s1").with_area("bench"))
                .collect();
            store.upsert_edges(&edges).await.unwrap();
            store
        });

        group.bench_with_input(BenchmarkId::new("in_edges", size), size, |b, _| {
            b.iter(|| rt.block_on(store.read_in_edges(&"s1".into())).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("area_edges", size), size, |b, _| {
            b.iter(|| rt.block_on(store.read_area_edges(&"bench".into())).unwrap());
        });
    }
    group.finish();
}

/// Benchmark upsert + cascade delete on RocksDB
fn bench_rocks_cycle(c: &mut Criterion) {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let config = EdgeStoreConfig::default();
    let store = rt.block_on(async {
        let kv = Arc::new(RocksStore::open(dir.path()).unwrap());
        Provisioner::new(edge_graph_definitions(&config))
            .migrate(&*kv)
            .await
            .unwrap();
        EdgeStore::new(kv, config.clone())
    });

    let mut group = c.benchmark_group("rocks_cycle");
    for size in [25, 250].iter() {
        let edges = star("hub", *size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    store.upsert_edges(&edges).await.unwrap();
                    store.remove_node_edges(&"hub".into()).await.unwrap();
                })
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_memory_upsert,
    bench_memory_reads,
    bench_rocks_cycle
);
criterion_main!(benches);
