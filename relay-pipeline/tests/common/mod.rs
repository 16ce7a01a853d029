#![allow(dead_code)]

use relay_pipeline::{LoadConfiguration, ServiceConfiguration};
use std::time::Duration;

mod memory_store;
pub use memory_store::MemoryStore;

/// Default configuration with in-memory stores
pub fn test_config() -> ServiceConfiguration {
    ServiceConfiguration::try_from(LoadConfiguration::default()).expect("default config")
}

/// Waits for a condition to be true with timeout, measured on the tokio
/// clock so paused-time tests advance through it
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
