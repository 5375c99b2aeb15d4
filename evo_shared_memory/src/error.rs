//! Dual error discipline: a realtime-safe status for operations that may run
//! on a realtime thread, and a general-purpose error for everything else.

use thiserror::Error;

/// Error kind shared by [`RtStatus`] and [`ShmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Success.
    Ok,
    /// Bad name, bad size, null promise, deadline in the past, missing type id.
    InvalidArgument,
    /// Duplicate segment name, or a second call to a single-shot method.
    AlreadyExists,
    /// Segment by name not present.
    NotFound,
    /// Wrong state for the requested operation.
    FailedPrecondition,
    /// Segment limit reached, or a value already retrieved.
    ResourceExhausted,
    /// Peer has cancelled the rendezvous.
    Cancelled,
    /// Lockstep cancelled during a wait.
    Aborted,
    /// A futex wait timed out.
    DeadlineExceeded,
    /// Underlying syscall error.
    Internal,
    /// No callback registered.
    Unimplemented,
}

impl ErrorKind {
    /// Whether this kind represents success.
    pub fn is_ok(self) -> bool {
        matches!(self, ErrorKind::Ok)
    }
}

/// Realtime-safe status: bounded message, no heap allocation.
///
/// Mirrors the source's `RealtimeStatus`: a code plus a short message, usable
/// from any function documented realtime-safe in the concurrency model.
#[derive(Debug, Clone)]
pub struct RtStatus {
    code: ErrorKind,
    message: heapless::String<128>,
}

impl RtStatus {
    /// The OK status.
    pub fn ok() -> Self {
        Self {
            code: ErrorKind::Ok,
            message: heapless::String::new(),
        }
    }

    /// Build a status of the given kind, truncating the message to capacity.
    pub fn new(code: ErrorKind, message: &str) -> Self {
        let mut buf = heapless::String::new();
        if buf.push_str(message).is_err() {
            // Message doesn't fit whole; keep as much as fits, char by char.
            for ch in message.chars() {
                if buf.push(ch).is_err() {
                    break;
                }
            }
        }
        Self { code, message: buf }
    }

    /// The status code.
    pub fn code(&self) -> ErrorKind {
        self.code
    }

    /// The status message (empty for `OK`).
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this status represents success.
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// `true` if `code() == InvalidArgument`.
    pub fn is_invalid_argument(&self) -> bool {
        self.code == ErrorKind::InvalidArgument
    }

    /// `true` if `code() == FailedPrecondition`.
    pub fn is_failed_precondition(&self) -> bool {
        self.code == ErrorKind::FailedPrecondition
    }

    /// `true` if `code() == DeadlineExceeded`.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.code == ErrorKind::DeadlineExceeded
    }

    /// `true` if `code() == Cancelled` or `code() == Aborted`.
    pub fn is_cancelled_or_aborted(&self) -> bool {
        matches!(self.code, ErrorKind::Cancelled | ErrorKind::Aborted)
    }

    /// Overwrite `self` with `other` only if `self` is currently OK.
    pub fn overwrite_if_not_in_error(&mut self, other: RtStatus) {
        if self.is_ok() {
            *self = other;
        }
    }

    /// Overwrite `self` with `other` only if `self` is currently an error.
    pub fn overwrite_if_error(&mut self, other: RtStatus) {
        if !self.is_ok() {
            *self = other;
        }
    }

    /// Convert to a `Result`, for use with `?` in non-realtime code.
    pub fn into_result(self) -> Result<(), RtStatus> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}

/// Early-return from a function returning [`RtStatus`] if `$expr` is an error.
///
/// Mirrors the source's `INTRINSIC_RT_RETURN_IF_ERROR`.
macro_rules! rt_try {
    ($expr:expr) => {{
        let status = $expr;
        if !status.is_ok() {
            return status;
        }
    }};
}

pub(crate) use rt_try;

macro_rules! rt_status_factory {
    ($name:ident, $kind:ident) => {
        /// Construct an
        #[doc = concat!("`", stringify!($kind), "`")]
        /// status with the given message.
        pub fn $name(message: &str) -> RtStatus {
            RtStatus::new(ErrorKind::$kind, message)
        }
    };
}

rt_status_factory!(invalid_argument, InvalidArgument);
rt_status_factory!(already_exists, AlreadyExists);
rt_status_factory!(not_found, NotFound);
rt_status_factory!(failed_precondition, FailedPrecondition);
rt_status_factory!(resource_exhausted, ResourceExhausted);
rt_status_factory!(cancelled, Cancelled);
rt_status_factory!(aborted, Aborted);
rt_status_factory!(deadline_exceeded, DeadlineExceeded);
rt_status_factory!(internal, Internal);
rt_status_factory!(unimplemented, Unimplemented);

/// General-purpose error for manager/segment/platform-level failures that are
/// never raised from a realtime context.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Bad name, bad size, or similar caller error.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what was invalid.
        message: String,
    },

    /// Segment already exists.
    #[error("segment already exists: {name}")]
    AlreadyExists {
        /// Segment name.
        name: String,
    },

    /// Segment not found.
    #[error("segment not found: {name}")]
    NotFound {
        /// Segment name.
        name: String,
    },

    /// Wrong state for the requested operation.
    #[error("failed precondition: {message}")]
    FailedPrecondition {
        /// Description of the violated precondition.
        message: String,
    },

    /// Manager segment limit reached (see `SharedMemoryManager::MAX_SEGMENTS`).
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Description of the exhausted resource.
        message: String,
    },

    /// Operation not implemented (e.g. no callback registered).
    #[error("unimplemented: {message}")]
    Unimplemented {
        /// Description of the missing implementation.
        message: String,
    },

    /// A realtime-safe status promoted into the general-purpose error type.
    #[error("{kind:?}: {message}")]
    Rt {
        /// The originating error kind.
        kind: ErrorKind,
        /// The originating message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {source}")]
    Io {
        /// Source IO error.
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error.
    #[error("system call error: {source}")]
    Nix {
        /// Source nix error.
        #[from]
        source: nix::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    Json {
        /// Source JSON error.
        #[from]
        source: serde_json::Error,
    },
}

impl From<RtStatus> for ShmError {
    fn from(status: RtStatus) -> Self {
        ShmError::Rt {
            kind: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// Result type for shared memory operations.
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_has_no_message() {
        let s = RtStatus::ok();
        assert!(s.is_ok());
        assert_eq!(s.message(), "");
    }

    #[test]
    fn factory_functions_set_kind_and_message() {
        let s = deadline_exceeded("futex wait expired");
        assert!(s.is_deadline_exceeded());
        assert_eq!(s.message(), "futex wait expired");
    }

    #[test]
    fn overwrite_if_not_in_error_only_applies_to_ok() {
        let mut s = RtStatus::ok();
        s.overwrite_if_not_in_error(not_found("missing"));
        assert_eq!(s.code(), ErrorKind::NotFound);

        let already_bad = failed_precondition("bad state");
        let mut s2 = already_bad.clone();
        s2.overwrite_if_not_in_error(not_found("missing"));
        assert_eq!(s2.code(), ErrorKind::FailedPrecondition);
    }

    #[test]
    fn overwrite_if_error_only_applies_to_errors() {
        let mut s = not_found("missing");
        s.overwrite_if_error(RtStatus::ok());
        assert_eq!(s.code(), ErrorKind::NotFound);

        let mut s2 = RtStatus::ok();
        s2.overwrite_if_error(not_found("missing"));
        assert!(s2.is_ok());
    }

    #[test]
    fn rt_status_converts_into_shm_error() {
        let status = already_exists("dup");
        let err: ShmError = status.into();
        assert!(matches!(err, ShmError::Rt { kind: ErrorKind::AlreadyExists, .. }));
    }

    #[test]
    fn long_message_is_truncated_not_panicking() {
        let long = "x".repeat(500);
        let s = internal(&long);
        assert!(s.message().len() <= 128);
    }
}
