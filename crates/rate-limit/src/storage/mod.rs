//! Counter stores backing the limiter pairs.

use std::time::Duration;

use async_trait::async_trait;

use crate::key::RateLimitKey;

#[cfg(test)]
pub(crate) mod fake;
pub mod memory;
pub mod redis;
pub(crate) mod redis_pool;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// A successful consumption of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    /// Points left in the current window.
    pub remaining_points: u32,
    /// Time until the window ends and the budget is restored.
    pub ms_before_next: u64,
}

/// Why a point could not be consumed.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    /// The key has no points left in its window or is blocked.
    #[error("Quota exceeded, next point in {ms_before_next}ms")]
    QuotaExceeded {
        /// Time until the window or block ends.
        ms_before_next: u64,
    },

    /// The store could not account for the request.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Infrastructure failures of a store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Could not get a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store did not answer in time.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with an error or something unexpected.
    #[error("Query error: {0}")]
    Query(String),
}

/// Atomically consumes one point for a key.
///
/// Each store is bound to one tier: points, window, block duration and key prefix are
/// fixed when it is constructed.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Consume one point for `key`.
    async fn consume(&self, key: &RateLimitKey) -> Result<Consumption, ConsumeError>;
}
