//! Benchmarks for the sample buffer hot paths
//!
//! Covers the producer-side cost the driver's loop pays per package and the
//! consumer-side cost of draining a full buffer:
//! - push of a typical 11-channel package, with and without eviction
//! - drain with and without reset at the default 10,000-package capacity
//! - push while a second thread drains concurrently
//!
//! Platform: Cross-platform, CI-safe

use biostream::{DEFAULT_BUFFER_CAPACITY, SampleBuffer, SamplePackage};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const CHANNELS: usize = 11;

fn package(seq: i64) -> SamplePackage {
    let values: Vec<i32> = (0..CHANNELS as i32).map(|ch| 32_768 + ch * 100).collect();
    SamplePackage::new(seq, values)
}

fn filled(capacity: usize) -> SampleBuffer {
    let buffer = SampleBuffer::new(capacity);
    for seq in 0..capacity as i64 {
        buffer.push(package(seq));
    }
    buffer
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_push");
    group.throughput(Throughput::Elements(1));

    group.bench_function("below_capacity", |b| {
        b.iter_batched_ref(
            || SampleBuffer::new(16),
            |buffer| black_box(buffer.push(black_box(package(0)))),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("evicting", |b| {
        let buffer = filled(DEFAULT_BUFFER_CAPACITY);
        let mut seq = DEFAULT_BUFFER_CAPACITY as i64;
        b.iter(|| {
            let outcome = buffer.push(black_box(package(seq)));
            seq += 1;
            black_box(outcome)
        })
    });

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_drain");
    group.throughput(Throughput::Elements(DEFAULT_BUFFER_CAPACITY as u64));

    group.bench_function("with_reset", |b| {
        b.iter_batched(
            || filled(DEFAULT_BUFFER_CAPACITY),
            |buffer| black_box(buffer.drain(true)),
            BatchSize::LargeInput,
        )
    });

    group.bench_function("snapshot", |b| {
        let buffer = filled(DEFAULT_BUFFER_CAPACITY);
        b.iter(|| black_box(buffer.drain(false)))
    });

    group.finish();
}

fn bench_contended_push(c: &mut Criterion) {
    let buffer = Arc::new(SampleBuffer::new(DEFAULT_BUFFER_CAPACITY));
    let running = Arc::new(AtomicBool::new(true));

    let consumer = {
        let (buffer, running) = (Arc::clone(&buffer), Arc::clone(&running));
        std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                black_box(buffer.drain(true));
                std::thread::yield_now();
            }
        })
    };

    let mut seq = 0i64;
    c.bench_function("buffer_push_with_concurrent_drain", |b| {
        b.iter(|| {
            let outcome = buffer.push(black_box(package(seq)));
            seq += 1;
            black_box(outcome)
        })
    });

    running.store(false, Ordering::Relaxed);
    consumer.join().expect("consumer thread panicked");
}

criterion_group!(benches, bench_push, bench_drain, bench_contended_push);
criterion_main!(benches);
