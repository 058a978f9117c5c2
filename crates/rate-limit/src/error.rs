//! Error types for rate limiting.

use std::time::Duration;

use config::Tier;
use jiff::Timestamp;

use crate::{classifier::ClassifierError, storage::StorageError, verdict};

/// Errors that can occur while setting up rate limiting.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The classification rules could not be built from the route configuration.
    #[error("Invalid route configuration: {0}")]
    Classifier(#[from] ClassifierError),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A rejected operation, with everything a caller needs to tell the client when to retry.
///
/// Returned by the in-process adapter; the network adapter renders the same values as
/// a 429 response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rate limit exceeded for tier {tier}, retry in {retry_after_seconds}s")]
pub struct RateLimitExceeded {
    /// Tier of the operation.
    pub tier: Tier,
    /// Whole seconds to wait before retrying, at least one.
    pub retry_after_seconds: u64,
    /// Points per window of the tier.
    pub limit: u32,
    /// Points left, always zero for a rejection.
    pub remaining: u32,
    /// When the window or block ends, in seconds since the epoch.
    pub reset_epoch_seconds: i64,
}

impl RateLimitExceeded {
    pub(crate) fn new(tier: Tier, limit: u32, retry_after: Duration, now: Timestamp) -> Self {
        let retry_after_seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);

        Self {
            tier,
            retry_after_seconds: retry_after_seconds.max(1),
            limit,
            remaining: 0,
            reset_epoch_seconds: verdict::ceil_epoch_seconds(verdict::timestamp_after(now, retry_after_ms)),
        }
    }

    /// The retry hint as a duration.
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_seconds)
    }
}
