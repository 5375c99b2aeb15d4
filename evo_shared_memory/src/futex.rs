//! `BinaryFutex`: a cross-process binary semaphore backed by a single
//! `AtomicU32` and the Linux futex syscall.
//!
//! The futex word is 0 (unposted) or 1 (posted). `post` is a single
//! compare-exchange plus a wake; `wait_*` blocks until the word becomes 1,
//! consuming the post (CAS back to 0) atomically with the wake-up.

use crate::clock::{Duration, Time};
use crate::error::{RtStatus, deadline_exceeded, internal};
use crate::shm_safe::ShmSafe;
use std::sync::atomic::{AtomicU32, Ordering};

const FUTEX_WAIT: libc::c_int = 0;
const FUTEX_WAKE: libc::c_int = 1;

/// A binary semaphore safe to place in shared memory and wait on across
/// process boundaries.
#[repr(C)]
pub struct BinaryFutex {
    word: AtomicU32,
}

unsafe impl ShmSafe for BinaryFutex {}

impl BinaryFutex {
    /// Construct a futex, initially posted or not.
    pub fn new(posted: bool) -> Self {
        Self {
            word: AtomicU32::new(posted as u32),
        }
    }

    /// Post (set) the futex and wake exactly one waiter, if the futex
    /// transitioned from unposted to posted. Posting an already-posted
    /// futex is a no-op.
    pub fn post(&self) -> RtStatus {
        if self
            .word
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    &self.word as *const AtomicU32 as *const u32,
                    FUTEX_WAKE,
                    1i32,
                )
            };
            if ret == -1 {
                return internal(&format!(
                    "futex wake failed: {}",
                    std::io::Error::last_os_error()
                ));
            }
        }
        RtStatus::ok()
    }

    /// Block until posted or `deadline` passes, consuming the post.
    pub fn wait_until(&self, deadline: Time) -> RtStatus {
        loop {
            if deadline != Time::INFINITE && deadline <= crate::clock::now() {
                return deadline_exceeded("binary futex wait deadline exceeded");
            }
            if self
                .word
                .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return RtStatus::ok();
            }

            let ts_ptr: *const libc::timespec;
            let ts;
            if deadline == Time::INFINITE {
                ts_ptr = std::ptr::null();
            } else {
                let remaining = deadline.minus(crate::clock::now());
                let remaining = if remaining.as_nanos_i64() < 0 {
                    Duration::ZERO
                } else {
                    remaining
                };
                ts = remaining.to_timespec();
                ts_ptr = &ts;
            }

            let ret = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    &self.word as *const AtomicU32 as *const u32,
                    FUTEX_WAIT,
                    0u32,
                    ts_ptr,
                )
            };
            if ret == -1 {
                match std::io::Error::last_os_error().raw_os_error() {
                    Some(libc::EAGAIN) | Some(libc::EINTR) | Some(libc::ETIMEDOUT) => continue,
                    other => {
                        return internal(&format!("futex wait failed: errno {other:?}"));
                    }
                }
            }
        }
    }

    /// Block until posted or `timeout` elapses, consuming the post.
    pub fn wait_for(&self, timeout: Duration) -> RtStatus {
        let deadline = if timeout == Duration::INFINITE {
            Time::INFINITE
        } else {
            crate::clock::now().plus(timeout)
        };
        self.wait_until(deadline)
    }

    /// Current raw value of the futex word (diagnostics only; racy by
    /// construction, like any lock-free peek).
    pub fn value(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn post_then_wait_succeeds_immediately() {
        let f = BinaryFutex::new(false);
        let status = f.post();
        assert!(status.is_ok());
        let status = f.wait_until(Time::INFINITE);
        assert!(status.is_ok());
        assert_eq!(f.value(), 0);
    }

    #[test]
    fn wait_with_past_deadline_times_out() {
        let f = BinaryFutex::new(false);
        let status = f.wait_until(crate::clock::now());
        assert!(status.is_deadline_exceeded());
    }

    #[test]
    fn wait_for_zero_timeout_on_unposted_futex_times_out() {
        let f = BinaryFutex::new(false);
        let status = f.wait_for(Duration::ZERO);
        assert!(status.is_deadline_exceeded());
    }

    #[test]
    fn cross_thread_post_wakes_waiter() {
        let f = Arc::new(BinaryFutex::new(false));
        let waiter = f.clone();
        let handle = thread::spawn(move || waiter.wait_for(Duration::from_secs(5)));
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(f.post().is_ok());
        let status = handle.join().unwrap();
        assert!(status.is_ok());
    }

    #[test]
    fn constructed_posted_is_consumed_by_first_wait() {
        let f = BinaryFutex::new(true);
        assert_eq!(f.value(), 1);
        // A zero timeout would race the deadline-past check against an
        // already-posted futex; give it a little room to be consumed.
        assert!(f.wait_for(Duration::from_millis(50)).is_ok());
        assert_eq!(f.value(), 0);
    }
}
