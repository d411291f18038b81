//! The sliding-window-log rate counter.
//!
//! Unlike a fixed-window or weighted-counter approximation, this keeps the
//! actual admitted timestamps per key (a *log*), trading a weighted
//! counter's O(1) update for an O(k) prune where `k` is the number of
//! timestamps evicted this call — bounded by `max_requests`, since the log
//! is never allowed to grow past it. Per-key state lives in a [`DashMap`]
//! and is evicted lazily on access, keyed off a `last_access` timestamp,
//! which is what backs [`SlidingWindowLog::sweep_idle`].

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::key::{Key, Policy};
use crate::time::TimeSource;

/// Outcome of a single `check_and_consume` call against the log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub remaining: u32,
    /// Wall-clock second at which the oldest in-window entry expires, or
    /// `now + window` if the window was empty before this call.
    pub reset_at: u64,
}

/// A read-only snapshot of a key's in-window state, for [`SlidingWindowLog::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitSnapshot {
    pub count: u32,
    pub remaining: u32,
    pub timestamps: Vec<f64>,
    pub window_start: f64,
    pub now: f64,
}

struct Entry {
    log: VecDeque<f64>,
    last_access: f64,
}

/// Per-key sliding-window-log rate counter.
///
/// Linearizable per key: concurrent calls for the same [`Key`] serialize on
/// that key's [`Mutex`], but calls for different keys never contend with
/// each other beyond whatever shard of the underlying [`DashMap`] they land
/// in — `DashMap` shards its backing table across a fixed number of
/// stripes internally, which is exactly the "shard by hash of K to N
/// stripes" contention-reduction approach, so no second
/// hashing layer is introduced on top of it.
pub struct SlidingWindowLog<T: TimeSource = crate::time::SystemTimeSource> {
    entries: DashMap<Key, Mutex<Entry>>,
    time_source: T,
}

impl SlidingWindowLog<crate::time::SystemTimeSource> {
    pub fn new() -> Self {
        Self::with_time_source(crate::time::SystemTimeSource)
    }
}

impl<T: TimeSource> Default for SlidingWindowLog<T>
where
    T: Default,
{
    fn default() -> Self {
        Self::with_time_source(T::default())
    }
}

impl<T: TimeSource> SlidingWindowLog<T> {
    pub fn with_time_source(time_source: T) -> Self {
        Self { entries: DashMap::new(), time_source }
    }

    /// The current time as seen by this log's [`TimeSource`].
    pub fn now(&self) -> f64 {
        self.time_source.now_secs()
    }

    /// Prunes stale entries for `key`, then admits or denies against `policy`.
    pub fn check_and_consume(&self, key: &Key, policy: &Policy) -> RateLimitOutcome {
        let now = self.time_source.now_secs();
        let window_start = now - policy.window_secs();

        let slot = self.entries.entry(key.clone()).or_insert_with(|| {
            Mutex::new(Entry { log: VecDeque::new(), last_access: now })
        });
        let mut entry = slot.lock().unwrap_or_else(|e| e.into_inner());
        entry.last_access = now;

        while let Some(&head) = entry.log.front() {
            if head <= window_start {
                entry.log.pop_front();
            } else {
                break;
            }
        }

        let count = entry.log.len() as u32;
        if count < policy.max_requests {
            entry.log.push_back(now);
            RateLimitOutcome {
                allowed: true,
                remaining: policy.max_requests - count - 1,
                reset_at: (now + policy.window_secs()).floor() as u64,
            }
        } else {
            let oldest = *entry.log.front().unwrap_or(&now);
            RateLimitOutcome {
                allowed: false,
                remaining: 0,
                reset_at: (oldest + policy.window_secs()).floor() as u64,
            }
        }
    }

    /// Reads `key`'s in-window state without consuming any budget. Never mutates.
    pub fn status(&self, key: &Key, policy: &Policy) -> RateLimitSnapshot {
        let now = self.time_source.now_secs();
        let window_start = now - policy.window_secs();

        let timestamps: Vec<f64> = match self.entries.get(key) {
            Some(slot) => {
                let entry = slot.lock().unwrap_or_else(|e| e.into_inner());
                entry.log.iter().copied().filter(|&ts| ts > window_start).collect()
            }
            None => Vec::new(),
        };

        let count = timestamps.len() as u32;
        RateLimitSnapshot {
            count,
            remaining: policy.max_requests.saturating_sub(count),
            timestamps,
            window_start,
            now,
        }
    }

    /// Removes keys that have not been accessed (by `check_and_consume`)
    /// for longer than `grace`.
    ///
    /// Called periodically by the admission facade rather than evicting
    /// during every access, so
    /// a burst of denied requests against a saturated key doesn't pay an
    /// eviction check on every call.
    pub fn sweep_idle(&self, grace: std::time::Duration) -> usize {
        let now = self.time_source.now_secs();
        let grace_secs = grace.as_secs_f64();
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let last_access = slot.lock().unwrap_or_else(|e| e.into_inner()).last_access;
            let stale = now - last_access > grace_secs;
            if stale {
                removed += 1;
            }
            !stale
        });
        removed
    }

    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.entries.len()
    }
}
