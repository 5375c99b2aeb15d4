//! Integration coverage for the realtime-promise/non-realtime-future hand-off
//! (scenarios S5 and S6 from SPEC_FULL.md §8) plus the `AsyncRequest`
//! collaborator built on top of it.

use evo_shared_memory::async_request::AsyncRequest;
use evo_shared_memory::future::NonRealtimeFuture;
use evo_shared_memory::Duration;
use std::thread;
use std::time::Duration as StdDuration;

#[test]
fn s5_future_receives_value_set_from_another_thread() {
    let future = NonRealtimeFuture::<u32>::new();
    let mut promise = future.get_promise().unwrap();

    let handle = thread::spawn(move || {
        thread::sleep(StdDuration::from_millis(50));
        promise.set_value(42)
    });

    let value = future.get_with_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(value, 42);
    assert!(handle.join().unwrap().is_ok());

    let second_get = future.get_with_timeout(Duration::from_millis(10));
    assert!(matches!(
        second_get.unwrap_err().code(),
        evo_shared_memory::ErrorKind::ResourceExhausted
    ));
}

#[test]
fn s6_cancelling_a_future_propagates_to_the_promise_without_hanging() {
    let future =
        NonRealtimeFuture::<u32>::with_cancellation_confirm_timeout(Duration::from_millis(200));
    let mut promise = future.get_promise().unwrap();

    // `set_value` is what notices the cancellation and posts the ack, so it
    // must run concurrently with `cancel()`'s wait for that ack.
    let handle = thread::spawn(move || {
        thread::sleep(StdDuration::from_millis(20));
        promise.set_value(1)
    });

    assert!(future.cancel().is_ok());

    let status = handle.join().unwrap();
    assert!(matches!(status.code(), evo_shared_memory::ErrorKind::Cancelled));

    drop(future); // must return promptly, not hang
}

#[test]
fn async_request_delivers_response_through_its_promise() {
    let future = NonRealtimeFuture::<String>::new();
    let promise = future.get_promise().unwrap();
    let mut request = AsyncRequest::new(7u32, promise);

    assert_eq!(*request.get_request(), 7);
    assert!(!request.is_cancelled());
    assert!(request.set_response("done".to_string()).is_ok());

    let response = future.get_with_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(response, "done");
}

#[test]
fn fire_and_forget_async_request_never_blocks_on_a_response() {
    let mut request: AsyncRequest<u32, u32> = AsyncRequest::fire_and_forget(1);
    assert!(request.set_response(99).is_ok());
    assert!(request.cancel().is_ok());
}
