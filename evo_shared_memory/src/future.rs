//! `RealtimePromise<T>`/`NonRealtimeFuture<T>`: a single-value, single-shot
//! hand-off from a (possibly realtime) producer thread to a non-realtime
//! consumer thread, with cooperative cancellation and a destruction witness.
//!
//! Unlike every other primitive in this crate, the pair is process-local: it
//! is built from three [`BinaryFutex`]es held directly by value, not placed
//! in a named shared memory segment. The future must outlive any promise
//! obtained from it via [`NonRealtimeFuture::get_promise`].

use crate::clock::{Duration, Time};
use crate::error::{
    RtStatus, already_exists, cancelled, invalid_argument, resource_exhausted,
};
use crate::futex::BinaryFutex;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The realtime-capable side of a [`NonRealtimeFuture`]/`RealtimePromise` pair.
///
/// Obtained once from a future via [`NonRealtimeFuture::get_promise`]. Movable
/// but not clonable; every operation is realtime-safe (no allocation, no
/// blocking locks, no I/O beyond the futex post syscall).
pub struct RealtimePromise<T> {
    inner: Option<PromiseInner<T>>,
}

struct PromiseInner<T> {
    buffer: Arc<Mutex<Option<T>>>,
    is_ready: Arc<BinaryFutex>,
    is_cancel_acknowledged: Arc<BinaryFutex>,
    is_destroyed: Arc<BinaryFutex>,
    is_cancelled: Arc<AtomicBool>,
}

impl<T> RealtimePromise<T> {
    /// Set the promise's value. One-shot: a second call returns
    /// `ResourceExhausted`. Returns `InvalidArgument` if this promise is
    /// default-constructed (moved-from). Returns `Cancelled` if the
    /// corresponding future cancelled first; in that case `is_cancel_acknowledged`
    /// is still posted.
    pub fn set_value(&mut self, value: T) -> RtStatus {
        let Some(inner) = self.inner.as_ref() else {
            return invalid_argument("set_value called on uninitialized promise");
        };
        if inner.is_ready.value() != 0 {
            return resource_exhausted("set_value must only be called once on a promise");
        }
        if inner.is_cancelled.load(Ordering::Relaxed) {
            let post_status = inner.is_cancel_acknowledged.post();
            if !post_status.is_ok() {
                tracing::error!(status = ?post_status, "failed to acknowledge cancellation");
            }
            self.inner = None;
            return cancelled("corresponding future has already been cancelled");
        }

        *inner.buffer.lock() = Some(value);
        let ack_status = inner.is_cancel_acknowledged.post();
        if !ack_status.is_ok() {
            return ack_status;
        }
        inner.is_ready.post()
    }

    /// Whether the corresponding future has cancelled. `false` on an
    /// uninitialized (moved-from) promise.
    pub fn is_cancelled(&self) -> bool {
        match self.inner.as_ref() {
            Some(inner) => inner.is_cancelled.load(Ordering::Relaxed),
            None => false,
        }
    }

    /// Mark this promise cancelled and acknowledge the cancellation. Returns
    /// `InvalidArgument` if this promise is default-constructed (moved-from).
    pub fn cancel(&self) -> RtStatus {
        let Some(inner) = self.inner.as_ref() else {
            return invalid_argument("cancel called on uninitialized promise");
        };
        inner.is_cancelled.store(true, Ordering::Relaxed);
        inner.is_cancel_acknowledged.post()
    }
}

impl<T> Drop for RealtimePromise<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let status = inner.is_destroyed.post();
            if !status.is_ok() {
                tracing::error!(status = ?status, "failed to signal promise destruction");
            }
        }
    }
}

/// The non-realtime side of a `RealtimePromise`/[`NonRealtimeFuture`] pair.
///
/// Not movable or clonable. The future must outlive any promise obtained
/// from it.
pub struct NonRealtimeFuture<T> {
    buffer: Arc<Mutex<Option<T>>>,
    is_ready: Arc<BinaryFutex>,
    is_cancel_acknowledged: Arc<BinaryFutex>,
    is_destroyed: Arc<BinaryFutex>,
    is_cancelled: Arc<AtomicBool>,
    cancellation_confirm_timeout: Duration,
    state: Mutex<FutureState>,
}

struct FutureState {
    is_value_retrieved: bool,
    promise_was_moved: bool,
}

impl<T> NonRealtimeFuture<T> {
    /// A future whose cancellation-confirmation timeout is
    /// `evo::consts::DEFAULT_CANCEL_CONFIRM_TIMEOUT_MS`.
    pub fn new() -> Self {
        Self::with_cancellation_confirm_timeout(Duration::from_millis(
            evo::consts::DEFAULT_CANCEL_CONFIRM_TIMEOUT_MS as i64,
        ))
    }

    /// A future whose [`cancel`](Self::cancel) waits up to
    /// `cancellation_confirm_timeout` for the promise to acknowledge.
    pub fn with_cancellation_confirm_timeout(cancellation_confirm_timeout: Duration) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(None)),
            is_ready: Arc::new(BinaryFutex::new(false)),
            is_cancel_acknowledged: Arc::new(BinaryFutex::new(false)),
            is_destroyed: Arc::new(BinaryFutex::new(false)),
            is_cancelled: Arc::new(AtomicBool::new(false)),
            cancellation_confirm_timeout,
            state: Mutex::new(FutureState {
                is_value_retrieved: false,
                promise_was_moved: false,
            }),
        }
    }

    /// Return the associated promise, by move. Must only be called once;
    /// subsequent calls return `AlreadyExists`.
    pub fn get_promise(&self) -> Result<RealtimePromise<T>, RtStatus> {
        let mut state = self.state.lock();
        if state.promise_was_moved {
            return Err(already_exists("get_promise must only be called once on a future"));
        }
        state.promise_was_moved = true;
        Ok(RealtimePromise {
            inner: Some(PromiseInner {
                buffer: self.buffer.clone(),
                is_ready: self.is_ready.clone(),
                is_cancel_acknowledged: self.is_cancel_acknowledged.clone(),
                is_destroyed: self.is_destroyed.clone(),
                is_cancelled: self.is_cancelled.clone(),
            }),
        })
    }

    /// Wait until `deadline` for a value. Returns `ResourceExhausted` if the
    /// value was already retrieved, `Cancelled` if cancelled, or
    /// `DeadlineExceeded` if no value arrives in time.
    pub fn get_with_deadline(&self, deadline: Time) -> Result<T, RtStatus> {
        let mut state = self.state.lock();
        if state.is_value_retrieved {
            return Err(resource_exhausted("value has already been retrieved"));
        }
        if self.is_cancelled.load(Ordering::Relaxed) {
            return Err(cancelled("future or promise have been cancelled"));
        }
        let wait_status = self.is_ready.wait_until(deadline);
        if !wait_status.is_ok() {
            return Err(wait_status);
        }
        state.is_value_retrieved = true;
        let value = self.buffer.lock().take();
        value.ok_or_else(|| invalid_argument("promise posted is_ready without a value"))
    }

    /// Convenience wrapper over [`get_with_deadline`](Self::get_with_deadline).
    pub fn get_with_timeout(&self, timeout: Duration) -> Result<T, RtStatus> {
        let deadline = if timeout == Duration::INFINITE {
            Time::INFINITE
        } else {
            crate::clock::now().plus(timeout)
        };
        self.get_with_deadline(deadline)
    }

    /// Wait indefinitely for a value.
    pub fn get(&self) -> Result<T, RtStatus> {
        self.get_with_deadline(Time::INFINITE)
    }

    /// Whether a value is already available (a subsequent `get*` would
    /// return immediately without blocking).
    pub fn is_ready(&self) -> bool {
        self.buffer.lock().is_some()
    }

    /// Cancel the future and wait for the promise to acknowledge, up to
    /// [`cancellation_confirm_timeout`](Self::with_cancellation_confirm_timeout).
    /// Idempotent: a second call is a no-op returning OK.
    pub fn cancel(&self) -> RtStatus {
        let _state = self.state.lock();
        self.unprotected_cancel()
    }

    fn unprotected_cancel(&self) -> RtStatus {
        let was_cancelled = self.is_cancelled.swap(true, Ordering::Relaxed);
        if !was_cancelled {
            return self.is_cancel_acknowledged.wait_for(self.cancellation_confirm_timeout);
        }
        RtStatus::ok()
    }
}

impl<T> Default for NonRealtimeFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for NonRealtimeFuture<T> {
    fn drop(&mut self) {
        let state = self.state.lock();
        if state.promise_was_moved {
            drop(state);
            let mut status = self.unprotected_cancel();
            status.overwrite_if_not_in_error(self.is_destroyed.wait_for(Duration::INFINITE));
            if !status.is_ok() {
                tracing::error!(status = ?status, "failed to destroy future");
            }
        }
    }
}
