//! Monotonic clock and nanosecond-precision duration arithmetic.
//!
//! A process-wide clock is installed once (lazily, on first use) and used by
//! every wait in this crate so that deadlines are computed from a single
//! source of time. Tests may substitute a different driver.

use std::sync::OnceLock;
use std::sync::RwLock;
use std::time::Instant;

/// A nanosecond-precision duration, matching the source's `Duration` helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    nanos: i64,
}

impl Duration {
    /// The zero duration.
    pub const ZERO: Duration = Duration { nanos: 0 };
    /// A duration so large it is treated as "never" by deadline waits.
    pub const INFINITE: Duration = Duration { nanos: i64::MAX };

    /// Build from a raw nanosecond count.
    pub const fn from_nanos(nanos: i64) -> Self {
        Duration { nanos }
    }

    /// Build from whole microseconds.
    pub const fn from_micros(micros: i64) -> Self {
        Duration {
            nanos: micros.saturating_mul(1_000),
        }
    }

    /// Build from whole milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Duration {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Build from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Duration {
            nanos: secs.saturating_mul(1_000_000_000),
        }
    }

    /// Build from a frequency in Hz (period = 1/hz).
    pub fn from_hz(hz: f64) -> Self {
        if hz <= 0.0 {
            return Duration::INFINITE;
        }
        Duration::from_nanos((1e9 / hz) as i64)
    }

    /// Convert to a frequency in Hz (0.0 if the duration is zero or negative).
    pub fn to_hertz(self) -> f64 {
        if self.nanos <= 0 {
            0.0
        } else {
            1e9 / self.nanos as f64
        }
    }

    /// Raw nanosecond count.
    pub const fn as_nanos_i64(self) -> i64 {
        self.nanos
    }

    /// Whole microseconds (truncating).
    pub const fn as_micros_i64(self) -> i64 {
        self.nanos / 1_000
    }

    /// Whole milliseconds (truncating).
    pub const fn as_millis_i64(self) -> i64 {
        self.nanos / 1_000_000
    }

    /// Fractional seconds as `f64`.
    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Convert to a `libc::timespec`.
    pub fn to_timespec(self) -> libc::timespec {
        libc::timespec {
            tv_sec: (self.nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: (self.nanos % 1_000_000_000) as libc::c_long,
        }
    }

    /// Convert to a `libc::timeval`.
    pub fn to_timeval(self) -> libc::timeval {
        libc::timeval {
            tv_sec: (self.nanos / 1_000_000_000) as libc::time_t,
            tv_usec: ((self.nanos % 1_000_000_000) / 1_000) as libc::suseconds_t,
        }
    }

    /// Build from a `libc::timespec`.
    pub fn from_timespec(ts: libc::timespec) -> Self {
        Duration::from_nanos(ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64)
    }

    /// Build from a `libc::timeval`.
    pub fn from_timeval(tv: libc::timeval) -> Self {
        Duration::from_nanos(tv.tv_sec as i64 * 1_000_000_000 + tv.tv_usec as i64 * 1_000)
    }

    /// Render as `"<n>ns"`.
    pub fn nanosecond_string(self) -> String {
        format!("{}ns", self.nanos)
    }

    /// Render as `"<n>us"`.
    pub fn microsecond_string(self) -> String {
        format!("{}us", self.as_micros_i64())
    }

    /// Render as `"<n>ms"`.
    pub fn millisecond_string(self) -> String {
        format!("{}ms", self.as_millis_i64())
    }
}

impl std::ops::Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_nanos(self.nanos.saturating_add(rhs.nanos))
    }
}

impl std::ops::Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(rhs.nanos))
    }
}

/// A monotonic instant in time, nanoseconds since an implementation-defined
/// epoch (zero at process start for the default driver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    nanos: i64,
}

impl Time {
    /// The invalid time value, used as a sentinel.
    pub const INVALID: Time = Time { nanos: i64::MIN };
    /// Epoch zero.
    pub const ZERO: Time = Time { nanos: 0 };
    /// A time so far in the future that waits for it never expire early.
    pub const INFINITE: Time = Time { nanos: i64::MAX };

    /// Whether this is the sentinel invalid time.
    pub fn is_valid(self) -> bool {
        self != Time::INVALID
    }

    /// Raw nanoseconds since the driver's epoch.
    pub const fn as_nanos_i64(self) -> i64 {
        self.nanos
    }

    /// `self + d`.
    pub fn plus(self, d: Duration) -> Time {
        Time {
            nanos: self.nanos.saturating_add(d.as_nanos_i64()),
        }
    }

    /// `self - other`, as a `Duration` (may be negative if `other > self`).
    pub fn minus(self, other: Time) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(other.nanos))
    }
}

/// Pluggable source of monotonic time, installed once per process.
pub trait ClockDriver: Send + Sync {
    /// The current time according to this driver.
    fn now(&self) -> Time;
}

/// Driver anchored to `Instant::now()` at construction; `now()` returns
/// nanoseconds elapsed since then.
pub struct MonotonicDriver {
    origin: Instant,
}

impl MonotonicDriver {
    /// Construct a driver anchored to the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockDriver for MonotonicDriver {
    fn now(&self) -> Time {
        Time {
            nanos: self.origin.elapsed().as_nanos() as i64,
        }
    }
}

/// Driver that offsets an inner driver's time by a fixed amount. Useful for
/// simulating clock skew in tests.
pub struct OffsetDriver<D: ClockDriver> {
    inner: D,
    offset: Duration,
}

impl<D: ClockDriver> OffsetDriver<D> {
    /// Wrap `inner`, adding `offset` to every observation.
    pub fn new(inner: D, offset: Duration) -> Self {
        Self { inner, offset }
    }
}

impl<D: ClockDriver> ClockDriver for OffsetDriver<D> {
    fn now(&self) -> Time {
        self.inner.now().plus(self.offset)
    }
}

/// Driver that always returns a fixed time, useful for deterministic tests.
pub struct ZeroAnchoredDriver {
    fixed: RwLock<Time>,
}

impl ZeroAnchoredDriver {
    /// Construct a driver that always reports `Time::ZERO` until advanced.
    pub fn new() -> Self {
        Self {
            fixed: RwLock::new(Time::ZERO),
        }
    }

    /// Advance the fixed time by `d`.
    pub fn advance(&self, d: Duration) {
        let mut guard = self.fixed.write().unwrap();
        *guard = guard.plus(d);
    }
}

impl Default for ZeroAnchoredDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockDriver for ZeroAnchoredDriver {
    fn now(&self) -> Time {
        *self.fixed.read().unwrap()
    }
}

static CLOCK_DRIVER: OnceLock<RwLock<Box<dyn ClockDriver>>> = OnceLock::new();

fn driver_cell() -> &'static RwLock<Box<dyn ClockDriver>> {
    CLOCK_DRIVER.get_or_init(|| RwLock::new(Box::new(MonotonicDriver::new())))
}

/// Install a new clock driver, replacing whatever was previously installed.
///
/// Intended for tests; calling this while other threads are waiting on
/// deadlines computed from the old driver can change their observed timeout.
pub fn install_driver(driver: Box<dyn ClockDriver>) {
    let mut guard = driver_cell().write().unwrap();
    *guard = driver;
}

/// The current time according to the installed driver.
pub fn now() -> Time {
    driver_cell().read().unwrap().now()
}

/// `(monotonic_nanos, wall_clock_nanos)`, sampled back to back.
///
/// Logging and tracing sinks correlate the process-local monotonic clock
/// used throughout this crate with wall-clock time for human-readable
/// timestamps; this is the single place that pairs the two.
pub fn get_time() -> (i64, i64) {
    let monotonic = now().as_nanos_i64();
    let wall = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    (monotonic, wall)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_conversions_round_trip() {
        let d = Duration::from_millis(1500);
        assert_eq!(d.as_nanos_i64(), 1_500_000_000);
        assert_eq!(d.as_micros_i64(), 1_500_000);
        assert_eq!(d.as_millis_i64(), 1500);
        assert!((d.as_secs_f64() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn duration_timespec_round_trip() {
        let d = Duration::from_nanos(1_234_567_890);
        let ts = d.to_timespec();
        let back = Duration::from_timespec(ts);
        assert_eq!(d, back);
    }

    #[test]
    fn duration_hz_round_trip() {
        let d = Duration::from_hz(1000.0);
        assert_eq!(d.as_millis_i64(), 1);
        assert!((d.to_hertz() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn time_plus_minus() {
        let t0 = Time::ZERO;
        let t1 = t0.plus(Duration::from_secs(5));
        assert_eq!(t1.minus(t0), Duration::from_secs(5));
    }

    #[test]
    fn zero_anchored_driver_is_deterministic() {
        let driver = ZeroAnchoredDriver::new();
        assert_eq!(driver.now(), Time::ZERO);
        driver.advance(Duration::from_secs(1));
        assert_eq!(driver.now(), Time::from_nanos_for_test(1_000_000_000));
    }

    #[test]
    fn monotonic_driver_is_nondecreasing() {
        let driver = MonotonicDriver::new();
        let a = driver.now();
        let b = driver.now();
        assert!(b >= a);
    }

    #[test]
    fn get_time_pairs_monotonic_and_wall_clock() {
        let (monotonic, wall) = get_time();
        assert!(monotonic >= 0);
        assert!(wall > 0);
    }

    impl Time {
        fn from_nanos_for_test(nanos: i64) -> Time {
            Time { nanos }
        }
    }
}
