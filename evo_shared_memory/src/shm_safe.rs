//! Marker trait for payload types that may be placed inside a shared memory
//! segment, i.e. types with no process-local pointers, no `Drop` that
//! assumes single-process ownership, and a stable `#[repr(C)]` layout.

/// Safe to place as the typed payload of a segment opened by [`crate::handle::Reader`]
/// or [`crate::handle::Writer`].
///
/// # Safety
/// Implementors must be valid for any bit pattern a zero-initialized byte
/// range can take on (the manager zero-initializes new segments before a
/// writer's `init_in_place` runs), and must not contain pointers, `Vec`,
/// `String`, or anything else whose validity depends on a single process's
/// address space. `Copy` types satisfy this trivially. [`crate::futex::BinaryFutex`]
/// and [`crate::lockstep::Lockstep`] are the sole non-`Copy` exceptions,
/// since their interior mutability is expressed with atomics rather than
/// process-local synchronization primitives.
pub unsafe trait ShmSafe: Send + Sync {}

unsafe impl<T: Copy + Send + Sync> ShmSafe for T {}
