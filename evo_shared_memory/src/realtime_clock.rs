//! `RealtimeClock`: a single producer (the realtime control loop) driving a
//! `RealtimeClockUpdate` payload in lockstep with one or more non-realtime
//! consumers, used by the skill-logging facility's clock service.
//!
//! Each tick is write-then-handoff: the producer writes the new timestamp,
//! ends its turn, and immediately starts the next one so it is always the
//! side holding the token between ticks. A clean shutdown ends the final
//! turn so a consumer blocked in `start_b_with_deadline` is not left
//! hanging.

use crate::clock::{Duration, Time};
use crate::error::{RtStatus, ShmResult};
use crate::handle::Writer;
use crate::manager::SharedMemoryManager;
use crate::shared_lockstep::{SharedMemoryLockstep, create_shared_memory_lockstep};

/// Time before the very first tick may be driven, if A's initial start
/// should not block indefinitely.
const STARTUP_LOCKSTEP_TIMEOUT: Duration = Duration::from_secs(60);

/// The payload a [`RealtimeClock`] publishes on every tick: the start time of
/// the current control cycle, in nanoseconds on whatever clock the producer
/// uses.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClockUpdate {
    /// Start time of the current cycle, in nanoseconds.
    pub cycle_start_nanoseconds: i64,
}

/// Segment name for a realtime clock's lockstep, given the owning module's
/// name `module`.
pub fn lockstep_segment_name(module: &str) -> String {
    format!("/{module}_realtime_clock_lockstep")
}

/// Segment name for a realtime clock's update payload, given the owning
/// module's name `module`.
pub fn update_segment_name(module: &str) -> String {
    format!("/{module}_realtime_clock_update")
}

/// The producer side of a realtime clock: owns the lockstep and update
/// segments and drives both forward on every tick.
///
/// Non-realtime consumers attach independently via
/// [`crate::shared_lockstep::get_shared_memory_lockstep`] and
/// `Writer::<RealtimeClockUpdate>::open` using the same names.
pub struct RealtimeClock {
    // Must drop before `shm_manager`: their `Drop` impls decrement refcounts
    // in the header that `shm_manager` destroys.
    lockstep: SharedMemoryLockstep,
    update: Writer<RealtimeClockUpdate>,
    #[allow(dead_code)]
    shm_manager: SharedMemoryManager,
}

impl RealtimeClock {
    /// Create a realtime clock named after `module`, owning both of its
    /// segments, and perform the initial handshake (A starts immediately,
    /// bounded by [`STARTUP_LOCKSTEP_TIMEOUT`]) so the first
    /// [`tick_blocking_with_deadline`](Self::tick_blocking_with_deadline)
    /// only has to end that turn before starting the next.
    pub fn create(module: &str) -> ShmResult<Self> {
        let mut shm_manager = SharedMemoryManager::new();
        let lockstep = create_shared_memory_lockstep(&mut shm_manager, &lockstep_segment_name(module))?;
        shm_manager.add_segment(&update_segment_name(module), RealtimeClockUpdate::default())?;
        let update = Writer::<RealtimeClockUpdate>::open(&update_segment_name(module))?;

        let status = lockstep.start_a_with_timeout(STARTUP_LOCKSTEP_TIMEOUT);
        if !status.is_ok() {
            tracing::warn!(status = ?status, module, "realtime clock startup handshake did not complete");
        }

        Ok(Self {
            lockstep,
            update,
            shm_manager,
        })
    }

    /// Publish `current_timestamp`, end the current turn and start the
    /// next one, all bounded by `deadline`.
    ///
    /// Returns whatever status `end_a`/`start_a_with_deadline` produce;
    /// `Aborted` if a consumer cancelled the rendezvous, `FailedPrecondition`
    /// if called out of turn.
    pub fn tick_blocking_with_deadline(&self, current_timestamp: Time, deadline: Time) -> RtStatus {
        self.update.set_value(RealtimeClockUpdate {
            cycle_start_nanoseconds: current_timestamp.as_nanos_i64(),
        });
        let end_status = self.lockstep.end_a();
        if !end_status.is_ok() {
            return end_status;
        }
        self.lockstep.start_a_with_deadline(deadline)
    }

    /// Convenience wrapper over
    /// [`tick_blocking_with_deadline`](Self::tick_blocking_with_deadline).
    pub fn tick_blocking_with_timeout(&self, current_timestamp: Time, timeout: Duration) -> RtStatus {
        self.tick_blocking_with_deadline(current_timestamp, crate::clock::now().plus(timeout))
    }

    /// Cancel the rendezvous, reset it once the cancellation settles, and
    /// start a fresh A turn.
    pub fn reset(&self, timeout: Duration) -> RtStatus {
        self.lockstep.cancel();
        let reset_status = self.lockstep.reset(timeout);
        if !reset_status.is_ok() {
            return reset_status;
        }
        self.lockstep.start_a_with_timeout(timeout)
    }

    /// The underlying lockstep, for diagnostics (e.g. checking
    /// [`connected()`](SharedMemoryLockstep::connected)).
    pub fn lockstep(&self) -> &SharedMemoryLockstep {
        &self.lockstep
    }
}

impl Drop for RealtimeClock {
    fn drop(&mut self) {
        let status = self.lockstep.end_a();
        if !status.is_ok() {
            tracing::warn!(status = ?status, "final end_a during realtime clock shutdown did not complete cleanly");
        }
    }
}
