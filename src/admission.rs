//! The admission facade: composes the sliding-window log and the load
//! manager into the three externally-visible operations this crate exposes:
//! `check_and_consume`, `status`, and `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::{self, Error};
use crate::key::{Key, Policy};
use crate::load_manager::{LoadManager, QueuedRequest, RateLimitCheckFn};
use crate::result::{CheckResult, Status};
use crate::sliding_window::SlidingWindowLog;
use crate::time::{SystemTimeSource, TimeSource};

/// Construction-time configuration. The core never reads files or an
/// external store — every bound is a constructor argument.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    /// Global in-flight request bound (`G`). Default `100`.
    pub gate_limit: u32,
    /// Per-tenant queue bound (`Q`). Default `50`.
    pub queue_limit: usize,
    /// How often idle sliding-window-log keys are swept. Default `60s`.
    pub sweep_interval: Duration,
    /// How long a key may go untouched before a sweep removes it.
    /// Default `300s`.
    pub sweep_grace: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            gate_limit: 100,
            queue_limit: 50,
            sweep_interval: Duration::from_secs(60),
            sweep_grace: Duration::from_secs(300),
        }
    }
}

/// The request-admission controller: the crate's only public entry point.
///
/// Owns the sliding-window log, the load manager (gate + tenant queues +
/// scheduler), and the background idle-key sweep task. Dropping a value of
/// this type does not wait for the scheduler to stop; call
/// [`AdmissionController::shutdown`] first if a clean stop matters.
///
/// Every operation, including `shutdown`, takes `&self`: a controller is
/// meant to be shared as `Arc<AdmissionController>` across tasks, and
/// shutdown must be callable while other clones are still in use, so that
/// in-flight and new `check_and_consume` calls can actually observe it
/// racing against them rather than only being reachable once every other
/// caller has already gone away.
pub struct AdmissionController<T: TimeSource + 'static = SystemTimeSource> {
    sliding_window: Arc<SlidingWindowLog<T>>,
    load_manager: Arc<LoadManager>,
    scheduler: AsyncMutex<Option<JoinHandle<()>>>,
    sweeper: AsyncMutex<Option<JoinHandle<()>>>,
}

impl AdmissionController<SystemTimeSource> {
    pub fn new(config: AdmissionConfig) -> Self {
        Self::with_time_source(config, SystemTimeSource)
    }
}

impl<T: TimeSource + 'static> AdmissionController<T> {
    pub fn with_time_source(config: AdmissionConfig, time_source: T) -> Self {
        let sliding_window = Arc::new(SlidingWindowLog::with_time_source(time_source));
        let load_manager = LoadManager::new(config.gate_limit, config.queue_limit);

        let check_fn: RateLimitCheckFn = {
            let sliding_window = sliding_window.clone();
            Arc::new(move |key: &Key, policy: &Policy| sliding_window.check_and_consume(key, policy))
        };
        let scheduler = load_manager.spawn_scheduler(check_fn);

        let sweeper = {
            let sliding_window = sliding_window.clone();
            let interval = config.sweep_interval;
            let grace = config.sweep_grace;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick fires immediately; skip it so a
                // freshly-constructed controller doesn't sweep against an
                // empty table for no reason.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let removed = sliding_window.sweep_idle(grace);
                    if removed > 0 {
                        tracing::debug!(removed, "swept idle sliding-window-log keys");
                    }
                }
            })
        };

        Self {
            sliding_window,
            load_manager,
            scheduler: AsyncMutex::new(Some(scheduler)),
            sweeper: AsyncMutex::new(Some(sweeper)),
        }
    }

    /// Checks and, if admitted, consumes one unit of `key`'s rate-limit
    /// budget — or queues/rejects the request when the global gate is
    /// saturated.
    pub async fn check_and_consume(&self, key: Key, policy: Policy) -> Result<CheckResult, Error> {
        error::validate(&key, &policy)?;

        if self.load_manager.try_acquire(&key.tenant_id) {
            let outcome = self.sliding_window.check_and_consume(&key, &policy);
            self.load_manager.release(&key.tenant_id);
            return Ok(CheckResult::processed(outcome));
        }

        let (tx, _rx) = oneshot::channel();
        let req = QueuedRequest {
            key: key.clone(),
            policy,
            enqueued_at: self.sliding_window.now(),
            completion: tx,
        };

        if self.load_manager.enqueue(key.tenant_id.clone(), req).await {
            tracing::trace!(tenant = %key.tenant_id, "request queued");
            Ok(CheckResult::queued())
        } else {
            tracing::warn!(tenant = %key.tenant_id, "request rejected: tenant queue full");
            Ok(CheckResult::rejected())
        }
    }

    /// Like [`Self::check_and_consume`], but also returns the receiving
    /// half of the queued request's completion handle when `status ==
    /// Queued`, so a caller that wants to await the eventual outcome can.
    pub async fn check_and_consume_awaitable(
        &self,
        key: Key,
        policy: Policy,
    ) -> Result<(CheckResult, Option<oneshot::Receiver<CheckResult>>), Error> {
        error::validate(&key, &policy)?;

        if self.load_manager.try_acquire(&key.tenant_id) {
            let outcome = self.sliding_window.check_and_consume(&key, &policy);
            self.load_manager.release(&key.tenant_id);
            return Ok((CheckResult::processed(outcome), None));
        }

        let (tx, rx) = oneshot::channel();
        let req = QueuedRequest {
            key: key.clone(),
            policy,
            enqueued_at: self.sliding_window.now(),
            completion: tx,
        };

        if self.load_manager.enqueue(key.tenant_id.clone(), req).await {
            Ok((CheckResult::queued(), Some(rx)))
        } else {
            Ok((CheckResult::rejected(), None))
        }
    }

    /// Reads the combined rate-limit and queue state for `key`. Never mutates.
    pub fn status(&self, key: &Key, policy: &Policy) -> Result<Status, Error> {
        error::validate(key, policy)?;
        Ok(Status {
            rate_limit: self.sliding_window.status(key, policy),
            queue: self.load_manager.queue_status(&key.tenant_id),
        })
    }

    /// Stops accepting new admissions, drains every queued request with a
    /// `Rejected` result, and waits for the scheduler and sweep tasks to
    /// finish.
    ///
    /// Takes `&self` so it can be called through a shared `Arc` while other
    /// clones are still issuing `check_and_consume`/`status` calls. Safe to
    /// call more than once, from more than one task, concurrently: the
    /// shutdown flag and the sweeper/scheduler handles are each consumed at
    /// most once, so a second concurrent call simply returns once the first
    /// has taken them.
    pub async fn shutdown(&self) {
        self.load_manager.shutdown();
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.abort();
        }
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            let _ = scheduler.await;
        }
    }
}
