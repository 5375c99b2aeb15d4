//! `SegmentHeader`: the fixed, cache-aligned metadata block at offset 0 of
//! every shared memory segment.

use crate::clock::Time;
use bitflags::bitflags;
use static_assertions::const_assert;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

/// Maximum length, in bytes, of a segment's type tag.
pub const TYPE_ID_MAX_LEN: usize = 100;

bitflags! {
    /// Header-level flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// When set, a manager must not recycle or overwrite an existing
        /// segment of the same name (advisory only, see DESIGN.md).
        const EXCLUSIVE_OWNERSHIP = 0b0000_0001;
    }
}

/// Self-describing type tag stored in the header, cache-line aligned so that
/// reading it never false-shares with refcount contention.
#[repr(C, align(64))]
pub struct TypeInfo {
    len: u8,
    bytes: [u8; TYPE_ID_MAX_LEN],
}

const_assert!(std::mem::align_of::<TypeInfo>() >= 64);

impl TypeInfo {
    /// Build a type tag, truncating `name` to [`TYPE_ID_MAX_LEN`] bytes.
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; TYPE_ID_MAX_LEN];
        let truncated = if name.len() > TYPE_ID_MAX_LEN {
            &name[..TYPE_ID_MAX_LEN]
        } else {
            name
        };
        bytes[..truncated.len()].copy_from_slice(truncated.as_bytes());
        Self {
            len: truncated.len() as u8,
            bytes,
        }
    }

    /// The type tag as a string slice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl Clone for TypeInfo {
    fn clone(&self) -> Self {
        Self {
            len: self.len,
            bytes: self.bytes,
        }
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo").field("id", &self.as_str()).finish()
    }
}

/// A process-shared mutex embedded directly in shared memory.
///
/// Backed by a raw `pthread_mutex_t` configured with `PTHREAD_PROCESS_SHARED`,
/// which is async-signal-safe and valid to place in memory mapped by multiple
/// processes, unlike a language-level mutex whose inner state assumes a
/// single address space.
#[repr(transparent)]
pub struct RawMutex {
    inner: libc::pthread_mutex_t,
}

impl RawMutex {
    /// Placement-initialize a process-shared mutex at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to valid, writable, zero-initialized memory of at
    /// least `size_of::<RawMutex>()` bytes that will remain mapped for the
    /// lifetime of every process using it.
    pub unsafe fn init_in_place(ptr: *mut RawMutex) {
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            libc::pthread_mutexattr_init(attr.as_mut_ptr());
            libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_mutex_init(&raw mut (*ptr).inner, attr.as_ptr());
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        }
    }

    /// Acquire the mutex, blocking the calling thread.
    ///
    /// # Safety
    /// Must only be called on a mutex previously initialized with
    /// [`init_in_place`](Self::init_in_place).
    pub unsafe fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(&self.inner as *const _ as *mut _);
        }
    }

    /// Release the mutex.
    ///
    /// # Safety
    /// Must only be called by the thread currently holding the lock.
    pub unsafe fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(&self.inner as *const _ as *mut _);
        }
    }

    /// Destroy the mutex, releasing any kernel resources backing it.
    ///
    /// # Safety
    /// Must be called at most once, and only after every process has stopped
    /// using the mutex.
    pub unsafe fn destroy(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(&mut self.inner);
        }
    }
}

/// Fixed, cache-aligned metadata placed at offset 0 of every segment.
///
/// Trivially copyable in the sense that it contains no owning pointers into
/// process-local memory; every field is either a plain integer, an atomic, or
/// the process-shared [`RawMutex`].
#[repr(C, align(64))]
pub struct SegmentHeader {
    mutex: RawMutex,
    type_info: TypeInfo,
    reader_ref_count: AtomicU32,
    writer_ref_count: AtomicU32,
    flags: AtomicU32,
    last_updated_time: AtomicI64,
    update_counter: AtomicU64,
}

const_assert!(std::mem::align_of::<SegmentHeader>() >= 64);
const_assert!(std::mem::size_of::<SegmentHeader>() >= 64);

impl SegmentHeader {
    /// Placement-initialize a header at `ptr` on zeroed backing storage.
    ///
    /// Must be called exactly once per segment, by the process that created
    /// it; never by a process merely opening an existing segment.
    ///
    /// # Safety
    /// `ptr` must point to valid, writable, zero-initialized memory of at
    /// least `size_of::<SegmentHeader>()` bytes, process-shared and mapped
    /// for the lifetime of every user of the segment.
    pub unsafe fn init_in_place(ptr: *mut SegmentHeader, type_id: &str, flags: Flags) {
        unsafe {
            RawMutex::init_in_place(&raw mut (*ptr).mutex);
            (&raw mut (*ptr).type_info).write(TypeInfo::new(type_id));
            (*ptr).reader_ref_count = AtomicU32::new(0);
            (*ptr).writer_ref_count = AtomicU32::new(0);
            (*ptr).flags = AtomicU32::new(flags.bits());
            (*ptr).last_updated_time = AtomicI64::new(0);
            (*ptr).update_counter = AtomicU64::new(0);
        }
    }

    /// The stored type tag.
    pub fn type_info(&self) -> TypeInfo {
        self.type_info.clone()
    }

    /// Lock-free query of a header flag.
    pub fn flag_is_set(&self, flag: Flags) -> bool {
        let bits = self.flags.load(Ordering::Acquire);
        Flags::from_bits_truncate(bits).contains(flag)
    }

    /// Current reader refcount.
    pub fn reader_ref_count(&self) -> u32 {
        unsafe { self.mutex.lock() };
        let v = self.reader_ref_count.load(Ordering::Acquire);
        unsafe { self.mutex.unlock() };
        v
    }

    /// Current writer refcount.
    pub fn writer_ref_count(&self) -> u32 {
        unsafe { self.mutex.lock() };
        let v = self.writer_ref_count.load(Ordering::Acquire);
        unsafe { self.mutex.unlock() };
        v
    }

    /// Increment the reader refcount.
    pub fn increment_reader(&self) {
        unsafe { self.mutex.lock() };
        self.reader_ref_count.fetch_add(1, Ordering::AcqRel);
        unsafe { self.mutex.unlock() };
    }

    /// Decrement the reader refcount.
    pub fn decrement_reader(&self) {
        unsafe { self.mutex.lock() };
        self.reader_ref_count.fetch_sub(1, Ordering::AcqRel);
        unsafe { self.mutex.unlock() };
    }

    /// Increment the writer refcount.
    pub fn increment_writer(&self) {
        unsafe { self.mutex.lock() };
        self.writer_ref_count.fetch_add(1, Ordering::AcqRel);
        unsafe { self.mutex.unlock() };
    }

    /// Decrement the writer refcount.
    pub fn decrement_writer(&self) {
        unsafe { self.mutex.lock() };
        self.writer_ref_count.fetch_sub(1, Ordering::AcqRel);
        unsafe { self.mutex.unlock() };
    }

    /// Monotonic time of the last update.
    pub fn last_updated_time(&self) -> Time {
        unsafe { self.mutex.lock() };
        let nanos = self.last_updated_time.load(Ordering::Acquire);
        unsafe { self.mutex.unlock() };
        Time::from_nanos(nanos)
    }

    /// Writer-ticked update counter.
    pub fn update_counter(&self) -> u64 {
        unsafe { self.mutex.lock() };
        let v = self.update_counter.load(Ordering::Acquire);
        unsafe { self.mutex.unlock() };
        v
    }

    /// Record an update at time `t`, incrementing the update counter.
    ///
    /// Must be called by the writer at most once per logical update.
    pub fn updated_at(&self, t: Time) {
        unsafe { self.mutex.lock() };
        self.last_updated_time.store(t.as_nanos_i64(), Ordering::Release);
        self.update_counter.fetch_add(1, Ordering::AcqRel);
        unsafe { self.mutex.unlock() };
    }
}

impl Drop for SegmentHeader {
    /// Releases the process-shared mutex. Must run exactly once, invoked by
    /// the manager that created the segment via `ptr::drop_in_place` as it
    /// tears the segment down — never by a `Reader`/`Writer` handle, which
    /// only ever decrements a refcount.
    fn drop(&mut self) {
        unsafe { self.mutex.destroy() };
    }
}

impl Time {
    /// Build a `Time` from a raw nanosecond count (header deserialization).
    pub fn from_nanos(nanos: i64) -> Self {
        // `Time`'s fields are private to `clock`; this crate-visible
        // constructor round-trips through the public `plus`/`minus` API.
        Time::ZERO.plus(crate::clock::Duration::from_nanos(nanos))
    }
}
