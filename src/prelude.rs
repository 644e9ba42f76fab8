use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Type alias for Arc<RwLock<T>>, a common pattern for shared mutable state
pub type RwArc<T> = Arc<RwLock<T>>;

/// Current wall-clock time in unix seconds (0 if the clock is before the epoch)
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
