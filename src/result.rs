//! Public result and status types returned by the admission facade.
//!
//! These map directly onto the external interface a caller sees:
//! `allowed`, `remaining_requests`, `reset_time_seconds`, `status`.

/// The outcome of a three-way admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Admitted and counted against the rate limit synchronously.
    Processed,
    /// Accepted into the tenant's queue for deferred execution.
    Queued,
    /// Turned away: the tenant's queue was also full (or the controller
    /// has begun shutting down).
    Rejected,
}

/// The result of a single `check_and_consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    /// Meaningful only when `status == Processed`.
    pub remaining: u32,
    /// The wall-clock second the oldest in-window request expires.
    /// `None` for `Queued`/`Rejected`, since no rate-limit decision was made.
    pub reset_at: Option<u64>,
    pub status: CheckStatus,
}

impl CheckResult {
    pub(crate) fn processed(outcome: crate::sliding_window::RateLimitOutcome) -> Self {
        Self {
            allowed: outcome.allowed,
            remaining: outcome.remaining,
            reset_at: Some(outcome.reset_at),
            status: CheckStatus::Processed,
        }
    }

    pub(crate) fn queued() -> Self {
        Self { allowed: false, remaining: 0, reset_at: None, status: CheckStatus::Queued }
    }

    pub(crate) fn rejected() -> Self {
        Self { allowed: false, remaining: 0, reset_at: None, status: CheckStatus::Rejected }
    }
}

/// A snapshot of a tenant's gate and queue state, for `status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub queue_limit: usize,
    pub tenant_in_flight: u32,
    pub global_in_flight: u32,
    pub gate_limit: u32,
}

/// The combined read-only record returned by `AdmissionController::status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub rate_limit: crate::sliding_window::RateLimitSnapshot,
    pub queue: QueueSnapshot,
}
