// Checkout performance benchmarks for bufcache

use bufcache::{BufferCache, CacheOptions, MemDevice};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

const BLOCK_SIZE: usize = 1024;

fn cache_with(nbuf: usize, buckets: usize) -> BufferCache<MemDevice> {
    let options = CacheOptions::new()
        .nbuf(nbuf)
        .buckets(buckets)
        .block_size(BLOCK_SIZE);
    BufferCache::new(MemDevice::new(BLOCK_SIZE), options).unwrap()
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hit");

    let cache = cache_with(64, 13);
    // Warm up: every block fits in the pool.
    for blockno in 0..32 {
        cache.read(0, blockno).unwrap().release();
    }

    group.throughput(Throughput::Elements(32));
    group.bench_function("cached_reads", |b| {
        b.iter(|| {
            for blockno in 0..32 {
                let buf = cache.read(0, blockno).unwrap();
                black_box(buf.data()[0]);
            }
        });
    });

    group.finish();
}

fn benchmark_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction");

    for nbuf in [16, 64, 256].iter() {
        let cache = cache_with(*nbuf, 13);
        let span = (*nbuf as u32) * 4;

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(nbuf), nbuf, |b, _| {
            let mut next = 0u32;
            b.iter(|| {
                for _ in 0..1000 {
                    // Sequential scan over four times the pool: every read misses.
                    let buf = cache.read(0, next % span).unwrap();
                    black_box(buf.data()[0]);
                    next = next.wrapping_add(1);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_random_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_read");

    for buckets in [1, 13, 61].iter() {
        let cache = cache_with(128, *buckets);

        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::from_parameter(buckets), buckets, |b, _| {
            let mut rng = rand::rng();
            b.iter(|| {
                for _ in 0..1000 {
                    let blockno: u32 = rng.random_range(0..256);
                    let buf = cache.read(0, blockno).unwrap();
                    black_box(buf.data()[0]);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_concurrent_readers(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_readers");

    for threads in [2, 4, 8].iter() {
        let cache = Arc::new(cache_with(128, 13));

        group.throughput(Throughput::Elements(*threads as u64 * 500));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let cache = Arc::clone(&cache);
                        thread::spawn(move || {
                            let mut rng = rand::rng();
                            for _ in 0..500 {
                                let blockno: u32 = rng.random_range(0..96);
                                let mut buf = cache.read(t as u32 % 2, blockno).unwrap();
                                buf.data_mut()[0] = buf.data()[0].wrapping_add(1);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_cache_hit,
    benchmark_eviction,
    benchmark_random_read,
    benchmark_concurrent_readers
);
criterion_main!(benches);
