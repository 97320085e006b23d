use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vehicle_registry_core::{Address, ChildIndex};

fn bench_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("child_index_attach");
    let collection = Address::from_low_u64_be(100);

    for children in [100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(children), &children, |b, &children| {
            b.iter(|| {
                let mut index = ChildIndex::new();
                for child_id in 1..=children {
                    index.attach(child_id % 16, collection, child_id).unwrap();
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

fn bench_enumerate(c: &mut Criterion) {
    let collection = Address::from_low_u64_be(100);
    let mut index = ChildIndex::new();
    for child_id in 1..=10_000u64 {
        index.attach(1, collection, child_id).unwrap();
    }

    c.bench_function("child_index_child_at", |b| {
        b.iter(|| {
            let count = index.child_count(1, &collection);
            for i in 0..count {
                black_box(index.child_at(1, &collection, i).unwrap());
            }
        });
    });

    c.bench_function("child_index_parent_of", |b| {
        b.iter(|| black_box(index.parent_of(&collection, black_box(5_000))));
    });
}

criterion_group!(benches, bench_attach, bench_enumerate);
criterion_main!(benches);
