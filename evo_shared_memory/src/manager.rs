//! `SharedMemoryManager`: the single process-local owner of a set of named
//! segments. Creates segments at `shm_open`-level, placement-constructs
//! their headers, and tears every segment it created down on `Drop`
//! (`shm_unlink` plus dropping the header in place to release its mutex).
//!
//! `Reader`/`Writer` handles do not go through the manager to *open* a
//! segment (see `handle.rs`); the manager is only the creation/teardown
//! authority and the registry of what currently exists.

use crate::clock;
use crate::error::{ShmError, ShmResult};
use crate::handle::{check_type_id, expected_type_id, segment_size};
use crate::header::{Flags, SegmentHeader};
use crate::platform;
use crate::shm_safe::ShmSafe;

/// Maximum number of segments a single manager may register.
pub const MAX_SEGMENTS: usize = 100;

/// Maximum length, in bytes, of a segment name (including the leading `/`).
pub const MAX_SEGMENT_NAME_LEN: usize = 255;

/// Tunables for a [`SharedMemoryManager`].
#[derive(Debug, Clone, Copy)]
pub struct SharedMemoryManagerConfig {
    /// Upper bound on the number of segments this manager may register.
    pub max_segments: usize,
    /// Bounded wait window used by poll-based collaborators (e.g. the
    /// remote trigger server) built on top of this manager's segments.
    pub poll_interval: clock::Duration,
}

impl Default for SharedMemoryManagerConfig {
    fn default() -> Self {
        Self {
            max_segments: MAX_SEGMENTS,
            poll_interval: clock::Duration::from_micros(evo::consts::DEFAULT_POLL_INTERVAL_US as i64),
        }
    }
}

/// A summary of what a manager currently has registered.
#[derive(Debug, Clone)]
pub struct SegmentInfoSummary {
    /// Names of every currently-registered segment.
    pub names: Vec<String>,
}

struct OwnedSegment {
    name: String,
    base_ptr: *mut u8,
    header_ptr: *mut SegmentHeader,
    payload_len: usize,
}

/// Validate a segment name: must start with `/`, be shorter than
/// [`MAX_SEGMENT_NAME_LEN`] bytes, and contain no further `/`.
pub fn verify_name(name: &str) -> ShmResult<()> {
    if !name.starts_with('/') {
        return Err(ShmError::InvalidArgument {
            message: format!("segment name '{name}' must start with '/'"),
        });
    }
    if name.len() >= MAX_SEGMENT_NAME_LEN {
        return Err(ShmError::InvalidArgument {
            message: format!(
                "segment name '{name}' is {} bytes, must be shorter than {MAX_SEGMENT_NAME_LEN}",
                name.len()
            ),
        });
    }
    if name[1..].contains('/') {
        return Err(ShmError::InvalidArgument {
            message: format!("segment name '{name}' must not contain '/' after the first byte"),
        });
    }
    Ok(())
}

/// Owns the lifecycle of a set of named shared memory segments.
pub struct SharedMemoryManager {
    config: SharedMemoryManagerConfig,
    segments: Vec<OwnedSegment>,
}

impl SharedMemoryManager {
    /// A manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(SharedMemoryManagerConfig::default())
    }

    /// A manager with explicit configuration.
    pub fn with_config(config: SharedMemoryManagerConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
        }
    }

    /// This manager's configuration.
    pub fn config(&self) -> &SharedMemoryManagerConfig {
        &self.config
    }

    fn find(&self, name: &str) -> ShmResult<&OwnedSegment> {
        self.segments
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ShmError::NotFound {
                name: name.to_string(),
            })
    }

    /// Create a new segment named `name`, with `T`'s default value.
    pub fn add_segment_default<T: ShmSafe + Default>(&mut self, name: &str) -> ShmResult<()> {
        self.add_segment(name, T::default())
    }

    /// Create a new segment named `name`, initialized to `value`.
    pub fn add_segment<T: ShmSafe>(&mut self, name: &str, value: T) -> ShmResult<()> {
        verify_name(name)?;
        if self.segments.iter().any(|s| s.name == name) {
            return Err(ShmError::AlreadyExists {
                name: name.to_string(),
            });
        }
        if self.segments.len() >= self.config.max_segments {
            return Err(ShmError::ResourceExhausted {
                message: format!(
                    "manager already holds the maximum of {} segments",
                    self.config.max_segments
                ),
            });
        }

        let total_size = segment_size::<T>();
        let base_ptr = platform::create_named_segment(name, total_size)?;
        let header_ptr = base_ptr as *mut SegmentHeader;
        let type_id = expected_type_id::<T>();
        unsafe { SegmentHeader::init_in_place(header_ptr, &type_id, Flags::empty()) };
        let value_ptr = unsafe { base_ptr.add(std::mem::size_of::<SegmentHeader>()) as *mut T };
        unsafe { value_ptr.write(value) };

        self.segments.push(OwnedSegment {
            name: name.to_string(),
            base_ptr,
            header_ptr,
            payload_len: std::mem::size_of::<T>(),
        });
        tracing::debug!(segment = name, size = total_size, "segment registered");
        Ok(())
    }

    /// Create a raw, untyped byte segment of `size` bytes, zero-initialized.
    pub fn add_segment_bytes(&mut self, name: &str, size: usize) -> ShmResult<()> {
        verify_name(name)?;
        if self.segments.iter().any(|s| s.name == name) {
            return Err(ShmError::AlreadyExists {
                name: name.to_string(),
            });
        }
        if self.segments.len() >= self.config.max_segments {
            return Err(ShmError::ResourceExhausted {
                message: format!(
                    "manager already holds the maximum of {} segments",
                    self.config.max_segments
                ),
            });
        }

        let total_size = std::mem::size_of::<SegmentHeader>() + size;
        let base_ptr = platform::create_named_segment(name, total_size)?;
        let header_ptr = base_ptr as *mut SegmentHeader;
        unsafe { SegmentHeader::init_in_place(header_ptr, "[u8]", Flags::empty()) };

        self.segments.push(OwnedSegment {
            name: name.to_string(),
            base_ptr,
            header_ptr,
            payload_len: size,
        });
        Ok(())
    }

    /// The header of a registered segment.
    pub fn get_segment_header(&self, name: &str) -> ShmResult<&SegmentHeader> {
        let seg = self.find(name)?;
        Ok(unsafe { &*seg.header_ptr })
    }

    /// Overwrite a typed segment's value in place and bump its update
    /// counter, without going through a [`crate::handle::Writer`].
    pub fn set_segment_value<T: ShmSafe + Copy>(&self, name: &str, value: T) -> ShmResult<()> {
        let seg = self.find(name)?;
        let header = unsafe { &*seg.header_ptr };
        check_type_id::<T>(header, name)?;
        let value_ptr = unsafe { seg.base_ptr.add(std::mem::size_of::<SegmentHeader>()) as *mut T };
        unsafe { value_ptr.write(value) };
        header.updated_at(clock::now());
        Ok(())
    }

    /// Read a copy of a typed segment's current value.
    pub fn get_segment_value<T: ShmSafe + Copy>(&self, name: &str) -> ShmResult<T> {
        let seg = self.find(name)?;
        let header = unsafe { &*seg.header_ptr };
        check_type_id::<T>(header, name)?;
        let value_ptr = unsafe { seg.base_ptr.add(std::mem::size_of::<SegmentHeader>()) as *const T };
        Ok(unsafe { *value_ptr })
    }

    /// Read the raw payload bytes of a segment, regardless of its type tag.
    pub fn get_raw_value(&self, name: &str) -> ShmResult<&[u8]> {
        let seg = self.find(name)?;
        let payload_ptr = unsafe { seg.base_ptr.add(std::mem::size_of::<SegmentHeader>()) };
        Ok(unsafe { std::slice::from_raw_parts(payload_ptr, seg.payload_len) })
    }

    /// Names of every currently-registered segment.
    pub fn registered_segment_names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    /// A summary of everything currently registered.
    pub fn segment_info(&self) -> SegmentInfoSummary {
        SegmentInfoSummary {
            names: self.registered_segment_names(),
        }
    }
}

impl Default for SharedMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for SharedMemoryManager {}

impl Drop for SharedMemoryManager {
    fn drop(&mut self) {
        for seg in self.segments.drain(..) {
            unsafe { std::ptr::drop_in_place(seg.header_ptr) };
            if let Err(e) = platform::unlink_named_segment(&seg.name) {
                tracing::warn!(segment = %seg.name, error = %e, "failed to unlink segment");
            }
        }
    }
}
