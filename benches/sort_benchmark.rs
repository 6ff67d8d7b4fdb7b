//! Criterion benchmarks for the lane sort.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

use lane_sort::{cpu_bitonic_sort, LaneGroup};

/// Generate random keys, one per lane
fn generate_keys<const W: usize>() -> [u32; W] {
    let mut rng = rand::thread_rng();
    std::array::from_fn(|_| rng.gen())
}

fn bench_width<const W: usize>(c: &mut Criterion) {
    let group = LaneGroup::<W>::new().expect("lane group");
    let mut bench_group = c.benchmark_group(format!("Lane Sort W={}", W));
    bench_group.throughput(Throughput::Elements(W as u64));

    bench_group.bench_function(BenchmarkId::new("keys", W), |b| {
        b.iter_batched(
            generate_keys::<W>,
            |mut keys| {
                group.sort_keys(black_box(&mut keys), |a, b| a < b);
                keys
            },
            criterion::BatchSize::SmallInput,
        )
    });

    bench_group.bench_function(BenchmarkId::new("pairs_small", W), |b| {
        b.iter_batched(
            || (generate_keys::<W>(), std::array::from_fn::<u16, W, _>(|i| i as u16)),
            |(mut keys, mut values)| {
                group.sort_pairs(black_box(&mut keys), black_box(&mut values), |a, b| a < b);
                (keys, values)
            },
            criterion::BatchSize::SmallInput,
        )
    });

    bench_group.bench_function(BenchmarkId::new("pairs_large", W), |b| {
        b.iter_batched(
            || {
                let values: [[f64; 4]; W] = std::array::from_fn(|i| [i as f64; 4]);
                (generate_keys::<W>(), values)
            },
            |(mut keys, mut values)| {
                group.sort_pairs(black_box(&mut keys), black_box(&mut values), |a, b| a < b);
                (keys, values)
            },
            criterion::BatchSize::SmallInput,
        )
    });

    bench_group.bench_function(BenchmarkId::new("serial_network", W), |b| {
        b.iter_batched(
            generate_keys::<W>,
            |mut keys| {
                cpu_bitonic_sort::sort_by(black_box(&mut keys), |a, b| a < b);
                keys
            },
            criterion::BatchSize::SmallInput,
        )
    });

    bench_group.finish();
}

fn bench_lane_sort(c: &mut Criterion) {
    bench_width::<2>(c);
    bench_width::<4>(c);
    bench_width::<8>(c);
    bench_width::<16>(c);
    bench_width::<32>(c);
    bench_width::<64>(c);
}

criterion_group!(benches, bench_lane_sort);
criterion_main!(benches);
