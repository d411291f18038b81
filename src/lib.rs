//! A multi-tenant request admission controller.
//!
//! Combines three pieces, each implemented in its own module and composable
//! on its own:
//!
//! - [`sliding_window`] — an exact sliding-window-log rate limiter, keyed by
//!   tenant/client/action.
//! - [`load_manager`] — a bounded global concurrency gate plus per-tenant
//!   FIFO queues, served by a fair round-robin scheduler.
//! - [`admission`] — the facade tying the two together into the three
//!   operations a caller actually uses: `check_and_consume`, `status`, and
//!   `shutdown`.
//!
//! Most users only need [`AdmissionController`]:
//!
//! ```no_run
//! use admission_core::{AdmissionConfig, AdmissionController, Key, Policy};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let controller = AdmissionController::new(AdmissionConfig::default());
//! let key = Key::new("tenant-a", "client-1", "search");
//! let policy = Policy::new(100, Duration::from_secs(60));
//!
//! let result = controller.check_and_consume(key, policy).await.unwrap();
//! println!("{:?}", result.status);
//! # }
//! ```

mod admission;
mod error;
mod key;
mod load_manager;
mod result;
mod sliding_window;
mod time;

pub use admission::{AdmissionConfig, AdmissionController};
pub use error::Error;
pub use key::{Key, Policy};
pub use result::{CheckResult, CheckStatus, QueueSnapshot, Status};
pub use sliding_window::{RateLimitOutcome, RateLimitSnapshot};
pub use time::{SystemTimeSource, TimeSource};
