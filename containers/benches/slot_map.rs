//! Slot map benchmarks
//!
//! The TTL cache keeps its entries in a [`SlotMap`], so insert, lookup and the
//! remove-with-swap path are what a sweep pays for. Sizes go up to the number of entries a
//! long running session accumulates.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lode_containers::prelude::SlotMap;
use std::hint::black_box;

const SIZES: [u64; 4] = [100, 1_000, 10_000, 100_000];

fn benchmark_slot_map_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_map_insert");
    for size in SIZES.iter() {
        group.bench_with_input(BenchmarkId::new("SlotMap", size), size, |b, &size| {
            b.iter(|| {
                let mut slot_map: SlotMap<u64> = SlotMap::default();
                for i in 0..size {
                    black_box(slot_map.insert(black_box(i)));
                }
                black_box(slot_map)
            });
        });
    }

    group.finish();
}

fn benchmark_slot_map_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_map_get");
    for size in SIZES.iter() {
        let mut slot_map: SlotMap<u64> = SlotMap::default();
        let mut slots = Vec::new();
        for i in 0..*size {
            slots.push(slot_map.insert(i));
        }
        group.bench_with_input(BenchmarkId::new("SlotMap", size), size, |b, _| {
            b.iter(|| {
                for slot in &slots {
                    black_box(slot_map.get(black_box(slot)));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_slot_map_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_map_remove");
    for size in SIZES.iter() {
        group.bench_with_input(BenchmarkId::new("SlotMap", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let mut slot_map: SlotMap<u64> = SlotMap::default();
                    let mut slots = Vec::new();
                    for i in 0..size {
                        slots.push(slot_map.insert(i));
                    }
                    (slot_map, slots)
                },
                |(mut slot_map, slots)| {
                    for slot in slots {
                        black_box(slot_map.remove(black_box(slot)).unwrap());
                    }
                    black_box(slot_map)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_slot_map_insert,
    benchmark_slot_map_get,
    benchmark_slot_map_remove
);
criterion_main!(benches);
