use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use split_core::LayerIndex;
use split_timing::TimingStore;

fn make_store(num_layers: usize) -> TimingStore {
    TimingStore::new(vec![0.01; num_layers], vec![0.01; num_layers], vec![1024; num_layers])
}

fn bench_single_layer(c: &mut Criterion) {
    let store = make_store(1);

    let mut group = c.benchmark_group("timing_store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("update_single_layer", |b| {
        b.iter(|| store.update_device(black_box(LayerIndex(0)), black_box(0.012)).unwrap());
    });

    group.finish();
}

fn bench_cycling_layers(c: &mut Criterion) {
    let store = make_store(58);

    let mut group = c.benchmark_group("timing_store");
    group.throughput(Throughput::Elements(1));

    let mut idx = 0u32;
    group.bench_function("update_58_layers_cycling", |b| {
        b.iter(|| {
            store.update_device(black_box(LayerIndex(idx % 58)), black_box(0.012)).unwrap();
            idx += 1;
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let store = make_store(58);

    let mut group = c.benchmark_group("timing_store");
    group.throughput(Throughput::Elements(58));

    group.bench_function("snapshot_58_layers", |b| {
        b.iter(|| black_box(store.snapshot()));
    });

    group.finish();
}

criterion_group!(benches, bench_single_layer, bench_cycling_layers, bench_snapshot);
criterion_main!(benches);
