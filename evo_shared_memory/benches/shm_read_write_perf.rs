//! Futex and typed-segment read/write benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use evo_shared_memory::futex::BinaryFutex;
use evo_shared_memory::handle::{Reader, Writer};
use evo_shared_memory::manager::SharedMemoryManager;
use evo_shared_memory::Time;
use std::hint::black_box;
use std::sync::atomic::{AtomicU32, Ordering};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/evo_bench_{tag}_{}_{n}", std::process::id())
}

/// Post/wait round trip on an already-posted futex (the wait returns
/// immediately, isolating the syscall cost from any scheduling latency).
fn bench_futex_post_wait(c: &mut Criterion) {
    let futex = BinaryFutex::new(false);

    c.bench_function("futex_post", |b| {
        b.iter(|| {
            black_box(futex.post().into_result().unwrap());
        });
    });

    futex.post().into_result().unwrap();
    c.bench_function("futex_wait_already_posted", |b| {
        b.iter(|| {
            black_box(futex.wait_until(Time::INFINITE).into_result().unwrap());
            futex.post().into_result().unwrap();
        });
    });
}

fn bench_typed_segment_read_write(c: &mut Criterion) {
    let name = unique_name("rw");
    let mut manager = SharedMemoryManager::new();
    manager.add_segment(&name, [0u8; 4096]).unwrap();

    let writer = Writer::<[u8; 4096]>::open(&name).unwrap();
    let reader = Reader::<[u8; 4096]>::open(&name).unwrap();
    let payload = [0xAAu8; 4096];

    c.bench_function("typed_write_4k", |b| {
        b.iter(|| {
            black_box(writer.set_value(payload));
        });
    });

    c.bench_function("typed_read_4k", |b| {
        b.iter(|| {
            black_box(reader.value());
        });
    });
}

criterion_group!(benches, bench_futex_post_wait, bench_typed_segment_read_write);
criterion_main!(benches);
