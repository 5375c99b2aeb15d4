//! Latency and throughput checks for the hot paths: futex post/wait,
//! lockstep alternation, and the remote-trigger request/response loop
//! (scenario S4 from SPEC_FULL.md §8).

use evo_shared_memory::futex::BinaryFutex;
use evo_shared_memory::remote_trigger::{RemoteTriggerClient, RemoteTriggerServer};
use evo_shared_memory::shared_lockstep::{create_shared_memory_lockstep, get_shared_memory_lockstep};
use evo_shared_memory::{Duration as ShmDuration, SharedMemoryManager, Time};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/evo_test_perf_{tag}_{}_{n}", std::process::id())
}

#[test]
fn futex_post_wait_round_trip_latency() {
    let futex = Arc::new(BinaryFutex::new(false));
    let waiter = futex.clone();

    let start = Instant::now();
    let handle = thread::spawn(move || {
        waiter.wait_until(Time::INFINITE).into_result().unwrap();
    });

    thread::sleep(std::time::Duration::from_millis(5));
    futex.post().into_result().unwrap();
    handle.join().unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < std::time::Duration::from_millis(100),
        "post/wait round trip took too long: {elapsed:?}"
    );
}

#[test]
fn lockstep_alternation_throughput() {
    let name = unique_name("throughput");
    let mut manager = SharedMemoryManager::new();
    let lockstep_a = create_shared_memory_lockstep(&mut manager, &name).unwrap();
    let lockstep_b = get_shared_memory_lockstep(&name).unwrap();

    let rounds = 5_000;
    let b_thread = thread::spawn(move || {
        for _ in 0..rounds {
            lockstep_b.start_b_with_deadline(Time::INFINITE).into_result().unwrap();
            lockstep_b.end_b().into_result().unwrap();
        }
    });

    let start = Instant::now();
    for _ in 0..rounds {
        lockstep_a.start_a_with_deadline(Time::INFINITE).into_result().unwrap();
        lockstep_a.end_a().into_result().unwrap();
    }
    b_thread.join().unwrap();
    let elapsed = start.elapsed();

    let throughput = rounds as f64 / elapsed.as_secs_f64();
    println!("lockstep alternation throughput: {throughput:.0} rounds/sec");
    assert!(throughput > 1_000.0, "alternation throughput too low: {throughput:.0}/sec");
}

#[test]
fn s4_remote_trigger_counter_reaches_five() {
    let server_id = unique_name("server");
    let counter = Arc::new(AtomicU64::new(0));
    let server_counter = counter.clone();

    let mut server = RemoteTriggerServer::create(
        &server_id,
        Box::new(move || {
            server_counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    server.start_async();

    let client = RemoteTriggerClient::create(&server_id, true).unwrap();
    assert!(client.is_connected());

    for _ in 0..5 {
        let status = client.trigger(evo_shared_memory::clock::now().plus(ShmDuration::from_secs(1)));
        assert!(status.is_ok(), "trigger failed: {status:?}");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    server.stop();
}
