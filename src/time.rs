//! Time abstraction for the admission core.
//!
//! Every time-dependent component (the sliding-window log, the tenant
//! queue's enqueue timestamps, the eviction sweep) is driven through a
//! pluggable [`TimeSource`] rather than calling [`SystemTime::now`]
//! directly, so that tests can advance the clock deterministically instead
//! of sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock time used throughout the admission core.
///
/// Time is expressed in **fractional seconds since the Unix epoch**, not
/// process-relative microseconds: the sliding-window log's `reset_at` is a
/// wall-clock second a caller can compare against their own clock, so unlike
/// a purely monotonic anchor this source must track real time.
///
/// # Monotonicity caveat
///
/// [`SystemTimeSource`] is backed by [`SystemTime`], which is *not*
/// guaranteed monotonic: a backward NTP step can make `now_secs()` return a
/// value smaller than a previous call for the same key. A backward jump
/// temporarily over-admits (stale entries look even more stale); a forward
/// jump expires entries early. Both are accepted per the rate-limiting
/// contract; a production deployment that cannot tolerate this should
/// supply a monotonic [`TimeSource`] instead.
pub trait TimeSource: Send + Sync {
    /// Returns the current time as fractional seconds since the Unix epoch.
    fn now_secs(&self) -> f64;
}

/// The default [`TimeSource`], backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}
