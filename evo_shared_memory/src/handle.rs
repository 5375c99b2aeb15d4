//! Typed views over a segment's payload: [`Reader<T>`] (read-only) and
//! [`Writer<T>`] (read-write), opened by name.
//!
//! Both are constructed by opening an existing segment, not through the
//! manager; cloning increments the relevant refcount and shares the mapping
//! (no re-`mmap`), and dropping decrements it. Neither ever calls `munmap` —
//! see `DESIGN.md` for why that mirrors this crate's grounding source rather
//! than being an oversight.

use crate::clock::Time;
use crate::error::{ShmError, ShmResult};
use crate::header::SegmentHeader;
use crate::platform;
use crate::shm_safe::ShmSafe;
use std::marker::PhantomData;

pub(crate) fn expected_type_id<T>() -> String {
    let full = std::any::type_name::<T>();
    if full.len() > crate::header::TYPE_ID_MAX_LEN {
        full[..crate::header::TYPE_ID_MAX_LEN].to_string()
    } else {
        full.to_string()
    }
}

pub(crate) fn check_type_id<T>(header: &SegmentHeader, name: &str) -> ShmResult<()> {
    let expected = expected_type_id::<T>();
    let actual = header.type_info().as_str().to_string();
    if actual != expected {
        return Err(ShmError::InvalidArgument {
            message: format!(
                "segment '{name}' has type id '{actual}', expected '{expected}'"
            ),
        });
    }
    Ok(())
}

/// Total mapped size of a segment carrying a `T` payload.
pub(crate) fn segment_size<T>() -> usize {
    std::mem::size_of::<SegmentHeader>() + std::mem::size_of::<T>()
}

/// A read-only, refcounted view over an existing segment's typed payload.
pub struct Reader<T: ShmSafe> {
    name: String,
    header: *mut SegmentHeader,
    value: *const T,
    _marker: PhantomData<T>,
}

unsafe impl<T: ShmSafe> Send for Reader<T> {}
unsafe impl<T: ShmSafe> Sync for Reader<T> {}

impl<T: ShmSafe> Reader<T> {
    /// Open an existing segment by name as a reader.
    pub fn open(name: &str) -> ShmResult<Self> {
        let ptr = platform::open_named_segment(name, segment_size::<T>())?;
        let header = ptr as *mut SegmentHeader;
        check_type_id::<T>(unsafe { &*header }, name)?;
        let value = unsafe { ptr.add(std::mem::size_of::<SegmentHeader>()) as *const T };
        unsafe { (*header).increment_reader() };
        Ok(Self {
            name: name.to_string(),
            header,
            value,
            _marker: PhantomData,
        })
    }

    /// Whether this handle is a null, default-constructed (or moved-from)
    /// handle, not bound to any segment.
    pub fn is_null(&self) -> bool {
        self.header.is_null()
    }

    /// The segment's name. Empty for a null handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The segment's header.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn header(&self) -> &SegmentHeader {
        assert!(!self.is_null(), "header() called on a null Reader handle");
        unsafe { &*self.header }
    }

    /// A reference to the current payload.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn value(&self) -> &T {
        assert!(!self.is_null(), "value() called on a null Reader handle");
        unsafe { &*self.value }
    }

    /// Raw byte access to the payload, for types that are not meant to be
    /// copied as `T` directly (e.g. externally-framed payloads).
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn raw_value(&self) -> &[u8] {
        assert!(!self.is_null(), "raw_value() called on a null Reader handle");
        unsafe { std::slice::from_raw_parts(self.value as *const u8, std::mem::size_of::<T>()) }
    }

    /// Proxy to the header's [`SegmentHeader::updated_at`], for readers that
    /// also act as the logical writer of record (rare; most readers never
    /// call this).
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn updated_at(&self, t: Time) {
        self.header().updated_at(t);
    }
}

impl<T: ShmSafe> Default for Reader<T> {
    /// A null handle, bound to no segment. Safe to drop; any other method
    /// call panics.
    fn default() -> Self {
        Self {
            name: String::new(),
            header: std::ptr::null_mut(),
            value: std::ptr::null(),
            _marker: PhantomData,
        }
    }
}

impl<T: ShmSafe> Clone for Reader<T> {
    fn clone(&self) -> Self {
        if self.is_null() {
            return Self::default();
        }
        unsafe { (*self.header).increment_reader() };
        Self {
            name: self.name.clone(),
            header: self.header,
            value: self.value,
            _marker: PhantomData,
        }
    }
}

impl<T: ShmSafe> Drop for Reader<T> {
    fn drop(&mut self) {
        if !self.is_null() {
            unsafe { (*self.header).decrement_reader() };
        }
    }
}

/// A read-write, refcounted view over an existing segment's typed payload.
pub struct Writer<T: ShmSafe> {
    name: String,
    header: *mut SegmentHeader,
    value: *mut T,
    _marker: PhantomData<T>,
}

unsafe impl<T: ShmSafe> Send for Writer<T> {}
unsafe impl<T: ShmSafe> Sync for Writer<T> {}

impl<T: ShmSafe> Writer<T> {
    /// Open an existing segment by name as a writer.
    pub fn open(name: &str) -> ShmResult<Self> {
        let ptr = platform::open_named_segment(name, segment_size::<T>())?;
        let header = ptr as *mut SegmentHeader;
        check_type_id::<T>(unsafe { &*header }, name)?;
        let value = unsafe { ptr.add(std::mem::size_of::<SegmentHeader>()) as *mut T };
        unsafe { (*header).increment_writer() };
        Ok(Self {
            name: name.to_string(),
            header,
            value,
            _marker: PhantomData,
        })
    }

    /// Whether this handle is a null, default-constructed (or moved-from)
    /// handle, not bound to any segment.
    pub fn is_null(&self) -> bool {
        self.header.is_null()
    }

    /// The segment's name. Empty for a null handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The segment's header.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn header(&self) -> &SegmentHeader {
        assert!(!self.is_null(), "header() called on a null Writer handle");
        unsafe { &*self.header }
    }

    /// A reference to the current payload.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn value(&self) -> &T {
        assert!(!self.is_null(), "value() called on a null Writer handle");
        unsafe { &*self.value }
    }

    /// A mutable reference to the current payload, for in-place updates to
    /// types whose methods take `&self` (e.g. [`crate::futex::BinaryFutex`],
    /// [`crate::lockstep::Lockstep`]) this is rarely needed; prefer `value()`.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn value_mut(&mut self) -> &mut T {
        assert!(!self.is_null(), "value_mut() called on a null Writer handle");
        unsafe { &mut *self.value }
    }

    /// Raw byte access to the payload, for types that are not meant to be
    /// copied as `T` directly.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn raw_value(&self) -> &[u8] {
        assert!(!self.is_null(), "raw_value() called on a null Writer handle");
        unsafe { std::slice::from_raw_parts(self.value as *const u8, std::mem::size_of::<T>()) }
    }

    /// Overwrite the payload. Does not update the header's timestamp or
    /// update counter; call [`SegmentHeader::updated_at`] explicitly when a
    /// write should be observable as a logical update.
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn set_value(&self, value: T) {
        assert!(!self.is_null(), "set_value() called on a null Writer handle");
        unsafe { *self.value = value };
    }

    /// Proxy to the header's [`SegmentHeader::updated_at`].
    ///
    /// # Panics
    /// Panics if called on a null (default-constructed or moved-from) handle.
    pub fn updated_at(&self, t: Time) {
        self.header().updated_at(t);
    }
}

impl<T: ShmSafe> Default for Writer<T> {
    /// A null handle, bound to no segment. Safe to drop; any other method
    /// call panics.
    fn default() -> Self {
        Self {
            name: String::new(),
            header: std::ptr::null_mut(),
            value: std::ptr::null_mut(),
            _marker: PhantomData,
        }
    }
}

impl<T: ShmSafe> Clone for Writer<T> {
    fn clone(&self) -> Self {
        if self.is_null() {
            return Self::default();
        }
        unsafe { (*self.header).increment_writer() };
        Self {
            name: self.name.clone(),
            header: self.header,
            value: self.value,
            _marker: PhantomData,
        }
    }
}

impl<T: ShmSafe> Drop for Writer<T> {
    fn drop(&mut self) {
        if !self.is_null() {
            unsafe { (*self.header).decrement_writer() };
        }
    }
}
