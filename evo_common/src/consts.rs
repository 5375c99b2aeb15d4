//! System-wide constants for the workspace.
//!
//! Single source of truth for shared-memory sizing and clock defaults.
//! Imported by all crates — no duplication permitted.

/// Default polling interval for non-realtime waiters (e.g. the remote
/// trigger server's bounded wait window), in microseconds.
pub const DEFAULT_POLL_INTERVAL_US: u64 = 100_000;

/// Default timeout for remote-trigger request/response round trips.
pub const DEFAULT_TRIGGER_TIMEOUT_MS: u64 = 1000;

/// Default cancellation confirmation timeout for realtime promises/futures.
pub const DEFAULT_CANCEL_CONFIRM_TIMEOUT_MS: u64 = 1000;
