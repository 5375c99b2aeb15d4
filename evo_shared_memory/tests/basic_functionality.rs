//! Multi-thread integration coverage for the scenarios in SPEC_FULL.md §8
//! (S1 refcounts, S2 strict alternation, S3 cancel/reset).

use evo_shared_memory::futex::BinaryFutex;
use evo_shared_memory::handle::{Reader, Writer};
use evo_shared_memory::lockstep::Lockstep;
use evo_shared_memory::manager::SharedMemoryManager;
use evo_shared_memory::shared_lockstep::{create_shared_memory_lockstep, get_shared_memory_lockstep};
use evo_shared_memory::{Duration, Time};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_name(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/evo_test_basic_{tag}_{}_{n}", std::process::id())
}

#[test]
fn s1_refcounts_track_live_handles() {
    let name = unique_name("refcounts");
    let mut manager = SharedMemoryManager::new();
    manager.add_segment(&name, BinaryFutex::new(false)).unwrap();

    let writer_a = Writer::<BinaryFutex>::open(&name).unwrap();
    let writer_b = Writer::<BinaryFutex>::open(&name).unwrap();
    let reader = Reader::<BinaryFutex>::open(&name).unwrap();

    assert_eq!(writer_a.header().writer_ref_count(), 2);
    assert_eq!(writer_a.header().reader_ref_count(), 1);

    drop(reader);
    assert_eq!(writer_a.header().reader_ref_count(), 0);

    drop(writer_b);
    assert_eq!(writer_a.header().writer_ref_count(), 1);
}

#[test]
fn s2_strict_alternation_over_a_hundred_rounds() {
    let name = unique_name("alternation");
    let mut manager = SharedMemoryManager::new();
    let lockstep_a = create_shared_memory_lockstep(&mut manager, &name).unwrap();
    let lockstep_b = get_shared_memory_lockstep(&name).unwrap();
    assert!(lockstep_a.connected());

    let observed = Arc::new(std::sync::Mutex::new(Vec::<char>::new()));
    let observed_b = observed.clone();

    let b_thread = thread::spawn(move || {
        for _ in 0..100 {
            lockstep_b.start_b_with_deadline(Time::INFINITE).into_result().unwrap();
            observed_b.lock().unwrap().push('B');
            lockstep_b.end_b().into_result().unwrap();
        }
    });

    for _ in 0..100 {
        lockstep_a.start_a_with_deadline(Time::INFINITE).into_result().unwrap();
        observed.lock().unwrap().push('A');
        lockstep_a.end_a().into_result().unwrap();
    }
    b_thread.join().unwrap();

    let sequence = observed.lock().unwrap();
    assert_eq!(sequence.len(), 200);
    for pair in sequence.chunks(2) {
        assert_eq!(pair, &['A', 'B']);
    }
}

#[test]
fn s3_cancel_aborts_a_parked_waiter_and_reset_recovers() {
    let name = unique_name("cancel_reset");
    let mut manager = SharedMemoryManager::new();
    let lockstep_a = create_shared_memory_lockstep(&mut manager, &name).unwrap();
    let lockstep_b = get_shared_memory_lockstep(&name).unwrap();

    lockstep_a.start_a_with_deadline(Time::INFINITE).into_result().unwrap();
    lockstep_a.end_a().into_result().unwrap();

    let waiter = thread::spawn(move || {
        let start = std::time::Instant::now();
        let status = lockstep_b.start_b_with_deadline(Time::INFINITE);
        (status, start.elapsed())
    });

    thread::sleep(std::time::Duration::from_millis(10));
    lockstep_a.cancel();

    let (status, elapsed) = waiter.join().unwrap();
    assert!(status.is_cancelled_or_aborted());
    assert!(elapsed < std::time::Duration::from_millis(50));

    assert!(lockstep_a.start_a_with_deadline(Time::INFINITE).is_cancelled_or_aborted());

    assert!(lockstep_a.reset(Duration::from_secs(1)).is_ok());
    assert!(lockstep_a.start_a_with_deadline(Time::INFINITE).is_ok());
}

#[test]
fn a_fresh_lockstep_segment_starts_b_finished() {
    let name = unique_name("fresh");
    let mut manager = SharedMemoryManager::new();
    let lockstep = create_shared_memory_lockstep(&mut manager, &name).unwrap();
    assert_eq!(
        lockstep.current_state(),
        evo_shared_memory::LockstepState::BFinished
    );
}

#[test]
fn writer_set_value_is_visible_to_an_independently_opened_reader() {
    let name = unique_name("typed_payload");
    let mut manager = SharedMemoryManager::new();
    manager.add_segment(&name, 0u64).unwrap();

    let writer = Writer::<u64>::open(&name).unwrap();
    writer.set_value(42);
    writer.updated_at(Time::from_nanos(7));

    let reader = Reader::<u64>::open(&name).unwrap();
    assert_eq!(*reader.value(), 42);
    assert_eq!(reader.header().update_counter(), 1);
    assert_eq!(reader.header().last_updated_time(), Time::from_nanos(7));
}

#[test]
fn opening_with_the_wrong_type_is_rejected() {
    let name = unique_name("type_mismatch");
    let mut manager = SharedMemoryManager::new();
    manager.add_segment(&name, 0u64).unwrap();

    assert!(Reader::<Lockstep>::open(&name).is_err());
}
