//! POSIX shared memory primitives: `shm_open`, `ftruncate`, `mmap`, `shm_unlink`.
//!
//! Segments are mapped once and never unmapped by any process that opens
//! them; this mirrors the corpus this crate is grounded on, which maps a
//! segment's backing pages for the lifetime of the process and relies on
//! process exit (or an explicit `shm_unlink` by the owning manager) to
//! reclaim them. See `DESIGN.md` for the rationale.

use crate::error::{ShmError, ShmResult};
use std::ffi::CString;
use std::io;

const SHM_MODE: libc::mode_t = 0o644;

fn to_cstring(name: &str) -> ShmResult<CString> {
    CString::new(name).map_err(|_| ShmError::InvalidArgument {
        message: format!("segment name '{name}' contains an interior NUL byte"),
    })
}

unsafe fn map_fd(fd: libc::c_int, size: usize) -> ShmResult<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(ShmError::Io { source: err });
    }
    if unsafe { libc::close(fd) } == -1 {
        tracing::warn!(
            error = %io::Error::last_os_error(),
            "failed to close shm fd after mmap; continuing"
        );
    }
    Ok(ptr as *mut u8)
}

/// Create a new POSIX shared memory segment named `name` (must start with
/// `/`), sized `size` bytes, and map it.
///
/// If a segment of the same name already exists at the OS level, it is
/// reused (not recreated) and a warning is logged; this can happen after a
/// process crash left the segment behind.
pub fn create_named_segment(name: &str, size: usize) -> ShmResult<*mut u8> {
    let cname = to_cstring(name)?;
    let mut fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            SHM_MODE,
        )
    };
    if fd == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EEXIST) {
            tracing::warn!(segment = name, "reusing existing shared memory object");
            fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, SHM_MODE) };
        }
        if fd == -1 {
            return Err(ShmError::Io {
                source: io::Error::last_os_error(),
            });
        }
    }
    if unsafe { libc::ftruncate(fd, size as libc::off_t) } == -1 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(ShmError::Io { source: err });
    }
    unsafe { map_fd(fd, size) }
}

/// Open and map an existing segment named `name`, sized `size` bytes.
pub fn open_named_segment(name: &str, size: usize) -> ShmResult<*mut u8> {
    let cname = to_cstring(name)?;
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, SHM_MODE) };
    if fd == -1 {
        return Err(ShmError::NotFound {
            name: name.to_string(),
        });
    }
    unsafe { map_fd(fd, size) }
}

/// Unlink a named segment from the filesystem namespace. Existing mappings
/// of it remain valid until their owning processes exit.
pub fn unlink_named_segment(name: &str) -> ShmResult<()> {
    let cname = to_cstring(name)?;
    if unsafe { libc::shm_unlink(cname.as_ptr()) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(());
        }
        return Err(ShmError::Io { source: err });
    }
    Ok(())
}

/// Whether a process with the given PID is currently alive, probed with a
/// null signal (`kill(pid, 0)`).
pub fn is_process_alive(pid: i32) -> bool {
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// The calling process's PID.
pub fn current_pid() -> i32 {
    nix::unistd::getpid().as_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(current_pid()));
    }

    #[test]
    fn pid_zero_is_not_the_current_process_but_may_exist() {
        // pid 1 (init) is virtually always alive in any environment that can
        // run this test, including containers.
        assert!(is_process_alive(1));
    }

    #[test]
    fn create_open_and_unlink_round_trip() {
        let name = format!("/evo_test_platform_{}", current_pid());
        let ptr = create_named_segment(&name, 4096).expect("create");
        assert!(!ptr.is_null());
        let ptr2 = open_named_segment(&name, 4096).expect("open");
        assert!(!ptr2.is_null());
        unlink_named_segment(&name).expect("unlink");
    }

    #[test]
    fn open_missing_segment_is_not_found() {
        let err = open_named_segment("/evo_test_platform_missing_xyz", 4096).unwrap_err();
        assert!(matches!(err, ShmError::NotFound { .. }));
    }
}
