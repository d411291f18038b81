//! Run with:
//!
//! ```no_rust
//! cargo run --example admission_demo
//! ```

use admission_core::{AdmissionConfig, AdmissionController, CheckStatus, Key, Policy};
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let controller = AdmissionController::new(AdmissionConfig {
        gate_limit: 4,
        queue_limit: 8,
        ..AdmissionConfig::default()
    });

    let key = Key::new("tenant-a", "client-1", "search");
    let policy = Policy::new(3, Duration::from_secs(10));

    for _ in 0..5 {
        let result = controller
            .check_and_consume(key.clone(), policy)
            .await
            .expect("valid key and policy");

        match result.status {
            CheckStatus::Processed if result.allowed => {
                println!("processed: allowed, {} remaining", result.remaining);
            }
            CheckStatus::Processed => {
                println!("processed: denied, resets at {:?}", result.reset_at);
            }
            CheckStatus::Queued => println!("queued: waiting for a gate slot"),
            CheckStatus::Rejected => println!("rejected: tenant queue is full"),
        }
    }

    let status = controller.status(&key, &policy).expect("valid key and policy");
    println!(
        "status: {} in-window, {} in flight / {} gate limit",
        status.rate_limit.count, status.queue.tenant_in_flight, status.queue.gate_limit
    );

    controller.shutdown().await;
}
