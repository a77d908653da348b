pub mod cache;
pub mod retry;

pub use cache::{Cache, CacheStore, MemoryStore};
pub use retry::{retry, RetryPolicy};

/// Wall-clock milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
