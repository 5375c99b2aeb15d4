//! `SharedMemoryLockstep`: a [`Lockstep`] placed in a named segment, shared
//! across process boundaries via a [`Writer<Lockstep>`] handle.
//!
//! A default-constructed instance is "null" and every dereference of it
//! check-fails, mirroring the source's `CHECK(lockstep_ != nullptr)`.

use crate::error::ShmResult;
use crate::handle::Writer;
use crate::lockstep::Lockstep;
use crate::manager::SharedMemoryManager;

/// A [`Lockstep`] backed by a named shared memory segment.
///
/// Connected iff both participants have opened the segment as a writer
/// (`writer_ref_count() == 2`); a null (default-constructed) instance is
/// never connected.
pub struct SharedMemoryLockstep {
    segment: Option<Writer<Lockstep>>,
}

impl SharedMemoryLockstep {
    fn from_segment(segment: Writer<Lockstep>) -> Self {
        Self {
            segment: Some(segment),
        }
    }

    /// Whether this lockstep is attached to two writer instances.
    pub fn connected(&self) -> bool {
        match &self.segment {
            Some(s) => s.header().writer_ref_count() == 2,
            None => false,
        }
    }

    /// The underlying [`Lockstep`], or `None` if this is a null instance.
    pub fn get_lockstep(&self) -> Option<&Lockstep> {
        self.segment.as_ref().map(|s| s.value())
    }

    /// Dereference to the underlying [`Lockstep`].
    ///
    /// # Panics
    /// Panics if this is a null (default-constructed) instance.
    pub fn lockstep(&self) -> &Lockstep {
        self.get_lockstep()
            .expect("null SharedMemoryLockstep dereferenced")
    }
}

impl Default for SharedMemoryLockstep {
    /// A null lockstep. Dereferencing it panics; this exists so the type has
    /// value semantics and can be moved freely.
    fn default() -> Self {
        Self { segment: None }
    }
}

impl std::ops::Deref for SharedMemoryLockstep {
    type Target = Lockstep;

    fn deref(&self) -> &Lockstep {
        self.lockstep()
    }
}

/// Create a fresh [`Lockstep`] in a new segment named `segment_name`, owned
/// by `manager`, and return a handle to it.
///
/// `manager` must outlive the returned [`SharedMemoryLockstep`].
pub fn create_shared_memory_lockstep(
    manager: &mut SharedMemoryManager,
    segment_name: &str,
) -> ShmResult<SharedMemoryLockstep> {
    manager.add_segment(segment_name, Lockstep::new())?;
    get_shared_memory_lockstep(segment_name)
}

/// Attach to an existing [`Lockstep`] segment named `segment_name`.
///
/// The [`SharedMemoryManager`] that created the segment must outlive the
/// returned [`SharedMemoryLockstep`].
pub fn get_shared_memory_lockstep(segment_name: &str) -> ShmResult<SharedMemoryLockstep> {
    let segment = Writer::<Lockstep>::open(segment_name)?;
    Ok(SharedMemoryLockstep::from_segment(segment))
}
