//! The admission key and rate-limit policy.

use std::sync::Arc;
use std::time::Duration;

/// Identifies a logical stream of requests subject to its own rate limit.
///
/// Two keys are equal iff their tenant, client and action strings are equal
/// — equality is structural, not by-reference, so the same logical key built
/// from independently-allocated strings still hits the same sliding-window
/// log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub tenant_id: Arc<str>,
    pub client_id: Arc<str>,
    pub action_type: Arc<str>,
}

impl Key {
    /// Builds a key from owned or borrowed string-likes.
    pub fn new(
        tenant_id: impl Into<Arc<str>>,
        client_id: impl Into<Arc<str>>,
        action_type: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            action_type: action_type.into(),
        }
    }
}

/// A rate-limit policy: at most `max_requests` admits per `window`.
///
/// Policies are supplied by the caller on every call rather than stored
/// alongside the counter, since the limit may have been reconfigured by an
/// external configuration store between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Policy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    #[inline]
    pub(crate) fn window_secs(&self) -> f64 {
        self.window.as_secs_f64()
    }
}
