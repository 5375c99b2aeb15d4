//! `Lockstep`: a two-phase strict-alternation rendezvous between exactly two
//! processes ("A" and "B"), built from a pair of [`BinaryFutex`]es and an
//! atomic state word.
//!
//! The state machine has five states and only the transitions below are
//! legal:
//!
//! ```text
//! BFinished --(start_a)--> ARunning --(end_a)--> AFinished
//! AFinished --(start_b)--> BRunning --(end_b)--> BFinished
//! ```
//!
//! `cancel` can be called from any state and moves to `Cancelled`, from
//! which only `reset` returns the pair to `BFinished`.

use crate::clock::{Duration, Time};
use crate::error::rt_try;
use crate::error::{RtStatus, aborted, failed_precondition};
use crate::futex::BinaryFutex;
use crate::shm_safe::ShmSafe;
use std::sync::atomic::{AtomicU32, Ordering};

/// States of the [`Lockstep`] state machine.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockstepState {
    /// B has finished its turn; A may start.
    BFinished = 0,
    /// A is running.
    ARunning = 1,
    /// A has finished its turn; B may start.
    AFinished = 2,
    /// B is running.
    BRunning = 3,
    /// Cancelled; only `reset` is valid.
    Cancelled = 4,
}

impl LockstepState {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => LockstepState::BFinished,
            1 => LockstepState::ARunning,
            2 => LockstepState::AFinished,
            3 => LockstepState::BRunning,
            _ => LockstepState::Cancelled,
        }
    }
}

/// A strict-alternation rendezvous between two parties, safe to place in
/// shared memory.
#[repr(C)]
pub struct Lockstep {
    a_finished: BinaryFutex,
    b_finished: BinaryFutex,
    state: AtomicU32,
}

unsafe impl ShmSafe for Lockstep {}

impl Lockstep {
    /// A fresh lockstep, ready for A to start.
    pub fn new() -> Self {
        Self {
            a_finished: BinaryFutex::new(false),
            b_finished: BinaryFutex::new(true),
            state: AtomicU32::new(LockstepState::BFinished as u32),
        }
    }

    fn state(&self) -> LockstepState {
        LockstepState::from_u32(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: LockstepState) {
        self.state.store(s as u32, Ordering::Release);
    }

    /// Block until B has finished, then mark A running.
    ///
    /// Returns `Aborted` if the pair was cancelled while waiting, and
    /// `FailedPrecondition` if called out of turn.
    pub fn start_a_with_deadline(&self, deadline: Time) -> RtStatus {
        rt_try!(self.b_finished.wait_until(deadline));
        if self.state() == LockstepState::Cancelled {
            let _ = self.b_finished.post();
            return aborted("lockstep was cancelled while starting A");
        }
        if self.state() != LockstepState::BFinished {
            return failed_precondition("start_a called out of turn");
        }
        self.set_state(LockstepState::ARunning);
        RtStatus::ok()
    }

    /// Convenience wrapper over [`start_a_with_deadline`](Self::start_a_with_deadline).
    pub fn start_a_with_timeout(&self, timeout: Duration) -> RtStatus {
        self.start_a_with_deadline(crate::clock::now().plus(timeout))
    }

    /// Mark A's turn complete and wake B's waiter.
    pub fn end_a(&self) -> RtStatus {
        if self.state() == LockstepState::Cancelled {
            return RtStatus::ok();
        }
        if self.state() != LockstepState::ARunning {
            return failed_precondition("end_a called out of turn");
        }
        self.set_state(LockstepState::AFinished);
        self.a_finished.post()
    }

    /// Block until A has finished, then mark B running.
    pub fn start_b_with_deadline(&self, deadline: Time) -> RtStatus {
        rt_try!(self.a_finished.wait_until(deadline));
        if self.state() == LockstepState::Cancelled {
            let _ = self.a_finished.post();
            return aborted("lockstep was cancelled while starting B");
        }
        if self.state() != LockstepState::AFinished {
            return failed_precondition("start_b called out of turn");
        }
        self.set_state(LockstepState::BRunning);
        RtStatus::ok()
    }

    /// Convenience wrapper over [`start_b_with_deadline`](Self::start_b_with_deadline).
    pub fn start_b_with_timeout(&self, timeout: Duration) -> RtStatus {
        self.start_b_with_deadline(crate::clock::now().plus(timeout))
    }

    /// Mark B's turn complete and wake A's waiter.
    pub fn end_b(&self) -> RtStatus {
        if self.state() == LockstepState::Cancelled {
            return RtStatus::ok();
        }
        if self.state() != LockstepState::BRunning {
            return failed_precondition("end_b called out of turn");
        }
        self.set_state(LockstepState::BFinished);
        self.b_finished.post()
    }

    /// Cancel the rendezvous from any state, waking both potential waiters.
    pub fn cancel(&self) {
        self.set_state(LockstepState::Cancelled);
        if let Err(e) = self.a_finished.post().into_result() {
            tracing::warn!(status = ?e, "failed to post a_finished during cancel");
        }
        if let Err(e) = self.b_finished.post().into_result() {
            tracing::warn!(status = ?e, "failed to post b_finished during cancel");
        }
    }

    /// Return a cancelled lockstep to `BFinished`, so A may start again.
    ///
    /// Requires the pair to currently be `Cancelled`; waits up to `timeout`
    /// for both futexes to settle before resetting.
    pub fn reset(&self, timeout: Duration) -> RtStatus {
        if self.state() != LockstepState::Cancelled {
            return failed_precondition("reset requires a cancelled lockstep");
        }
        rt_try!(self.a_finished.wait_for(timeout));
        rt_try!(self.b_finished.wait_for(timeout));
        self.set_state(LockstepState::BFinished);
        self.b_finished.post()
    }

    /// The current state, for diagnostics and tests.
    pub fn current_state(&self) -> LockstepState {
        self.state()
    }
}

impl Default for Lockstep {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lockstep_starts_b_finished() {
        let l = Lockstep::new();
        assert_eq!(l.current_state(), LockstepState::BFinished);
    }

    #[test]
    fn full_round_trip_alternates_states() {
        let l = Lockstep::new();
        assert!(l.start_a_with_deadline(Time::INFINITE).is_ok());
        assert_eq!(l.current_state(), LockstepState::ARunning);
        assert!(l.end_a().is_ok());
        assert_eq!(l.current_state(), LockstepState::AFinished);
        assert!(l.start_b_with_deadline(Time::INFINITE).is_ok());
        assert_eq!(l.current_state(), LockstepState::BRunning);
        assert!(l.end_b().is_ok());
        assert_eq!(l.current_state(), LockstepState::BFinished);
    }

    #[test]
    fn start_a_twice_in_a_row_is_failed_precondition() {
        let l = Lockstep::new();
        assert!(l.start_a_with_deadline(Time::INFINITE).is_ok());
        assert!(l.end_a().is_ok());
        assert!(l.start_b_with_deadline(Time::INFINITE).is_ok());
        // Now in BRunning; start_a should block on b_finished (not yet
        // posted) and time out rather than run out of turn.
        let status = l.start_a_with_deadline(crate::clock::now());
        assert!(status.is_deadline_exceeded());
    }

    #[test]
    fn cancel_aborts_a_pending_start() {
        let l = Lockstep::new();
        assert!(l.start_a_with_deadline(Time::INFINITE).is_ok());
        assert!(l.end_a().is_ok());
        l.cancel();
        let status = l.start_b_with_deadline(Time::INFINITE);
        assert!(status.is_cancelled_or_aborted());
    }

    #[test]
    fn reset_returns_cancelled_pair_to_b_finished() {
        let l = Lockstep::new();
        l.cancel();
        assert!(l.reset(Duration::from_millis(100)).is_ok());
        assert_eq!(l.current_state(), LockstepState::BFinished);
    }

    #[test]
    fn reset_without_cancel_is_failed_precondition() {
        let l = Lockstep::new();
        assert!(l.reset(Duration::from_millis(10)).is_failed_precondition());
    }
}
