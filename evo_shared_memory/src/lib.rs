//! # evo_shared_memory
//!
//! An inter-process synchronization and shared-memory substrate for EVO's
//! industrial robot control framework: named segments with self-describing
//! headers, a cross-process binary futex, a two-party lockstep rendezvous, a
//! remote-trigger request/response pattern, and a realtime-promise /
//! non-realtime-future hand-off for bridging realtime and non-realtime code.
//!
//! ## Modules
//!
//! - [`clock`]: monotonic time, `Duration`, and a pluggable clock driver.
//! - [`error`]: the dual error discipline, [`error::RtStatus`] (realtime-safe)
//!   and [`error::ShmError`] (general-purpose).
//! - [`header`]: [`header::SegmentHeader`], the process-shared mutex, and
//!   segment flags.
//! - [`manager`]: [`manager::SharedMemoryManager`], the segment lifecycle
//!   owner.
//! - [`handle`]: [`handle::Reader`]/[`handle::Writer`], typed views over an
//!   existing segment.
//! - [`futex`]: [`futex::BinaryFutex`], a cross-process binary semaphore.
//! - [`lockstep`]: [`lockstep::Lockstep`], strict two-party alternation.
//! - [`shared_lockstep`]: [`shared_lockstep::SharedMemoryLockstep`], a
//!   lockstep placed in a named segment.
//! - [`remote_trigger`]: [`remote_trigger::RemoteTriggerServer`]/
//!   [`remote_trigger::RemoteTriggerClient`].
//! - [`future`]: [`future::RealtimePromise`]/[`future::NonRealtimeFuture`].
//! - [`async_request`]: [`async_request::AsyncRequest`], the request/response
//!   boundary built on top of `future`.
//! - [`realtime_clock`]: [`realtime_clock::RealtimeClock`], a lockstep-driven
//!   clock service used by non-realtime consumers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evo_shared_memory::manager::SharedMemoryManager;
//! use evo_shared_memory::handle::{Reader, Writer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = SharedMemoryManager::new();
//! manager.add_segment("/robot_arm_joint_state", [0.0f64; 6])?;
//!
//! let writer = Writer::<[f64; 6]>::open("/robot_arm_joint_state")?;
//! writer.set_value([0.1, 0.2, 0.3, 0.0, 0.0, 0.0]);
//!
//! let reader = Reader::<[f64; 6]>::open("/robot_arm_joint_state")?;
//! assert_eq!(reader.value()[0], 0.1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Operations callable from a realtime thread return [`error::RtStatus`], a
//! bounded-size status with no heap allocation. Everything else returns
//! [`error::ShmResult`], built on [`thiserror`].
//!
//! ## Thread and process safety
//!
//! - [`handle::Writer`]: safe to clone and share across threads; concurrent
//!   writes to the same payload from multiple writers are undefined
//!   behavior unless the payload type internally synchronizes (e.g.
//!   [`futex::BinaryFutex`], [`lockstep::Lockstep`]).
//! - [`handle::Reader`]: safe to clone and share across threads.
//! - [`manager::SharedMemoryManager`]: owns segment lifecycle for a single
//!   process; not `Sync`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod async_request;
pub mod clock;
pub mod error;
pub mod future;
pub mod futex;
pub mod handle;
pub mod header;
pub mod lockstep;
pub mod manager;
pub mod platform;
pub mod realtime_clock;
pub mod remote_trigger;
pub mod shared_lockstep;
pub mod shm_safe;

pub use async_request::AsyncRequest;
pub use clock::{Duration, Time, get_time};
pub use error::{ErrorKind, RtStatus, ShmError, ShmResult};
pub use futex::BinaryFutex;
pub use future::{NonRealtimeFuture, RealtimePromise};
pub use handle::{Reader, Writer};
pub use header::SegmentHeader;
pub use lockstep::{Lockstep, LockstepState};
pub use manager::{MAX_SEGMENT_NAME_LEN, MAX_SEGMENTS, SharedMemoryManager};
pub use realtime_clock::{RealtimeClock, RealtimeClockUpdate};
pub use remote_trigger::{RemoteTriggerClient, RemoteTriggerServer};
pub use shared_lockstep::SharedMemoryLockstep;
pub use shm_safe::ShmSafe;

/// Initialize tracing with sensible defaults for this crate's RT-adjacent
/// logging: no ANSI color codes (log aggregators strip them anyway), thread
/// ids for diagnosing cross-process/cross-thread handoffs, and whatever
/// filter `RUST_LOG` specifies.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
