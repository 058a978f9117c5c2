//! Outcome of a consumption attempt.

use std::time::Duration;

use config::Tier;
use jiff::{SignedDuration, Timestamp};

use crate::error::RateLimitExceeded;

/// Retry hint given when the decision could not be computed.
pub const FAIL_CLOSED_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Result of consuming one point for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The operation may proceed.
    Allowed(Admission),
    /// The key exhausted its quota or is blocked.
    Denied(RateLimitExceeded),
    /// Neither store could account for the operation. Treated as a denial.
    InternalFailure {
        /// Tier of the operation.
        tier: Tier,
        /// Points per window of the tier.
        limit: u32,
    },
}

impl Verdict {
    /// Whether the operation may proceed. Only `Allowed` admits.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed(_))
    }

    /// Collapses the verdict into the two outcomes callers act on.
    ///
    /// `InternalFailure` becomes a denial with no remaining points and a fixed retry hint.
    pub fn into_result(self) -> Result<Admission, RateLimitExceeded> {
        match self {
            Verdict::Allowed(admission) => Ok(admission),
            Verdict::Denied(exceeded) => Err(exceeded),
            Verdict::InternalFailure { tier, limit } => Err(RateLimitExceeded::new(
                tier,
                limit,
                FAIL_CLOSED_RETRY_AFTER,
                Timestamp::now(),
            )),
        }
    }
}

/// An admitted operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Tier of the operation.
    pub tier: Tier,
    /// Points per window of the tier.
    pub limit: u32,
    /// Points left in the current window.
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: Timestamp,
}

impl Admission {
    /// Admission for a limiter that is switched off: the full quota, resetting now.
    pub fn unlimited(tier: Tier, limit: u32) -> Self {
        Self {
            tier,
            limit,
            remaining: limit,
            reset_at: Timestamp::now(),
        }
    }

    /// Window end in whole seconds since the epoch, rounded up.
    pub fn reset_epoch_seconds(&self) -> i64 {
        ceil_epoch_seconds(self.reset_at)
    }
}

/// `now + ms`, saturating at the largest representable timestamp.
pub(crate) fn timestamp_after(now: Timestamp, ms: u64) -> Timestamp {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);

    now.checked_add(SignedDuration::from_millis(ms)).unwrap_or(Timestamp::MAX)
}

pub(crate) fn ceil_epoch_seconds(timestamp: Timestamp) -> i64 {
    let seconds = timestamp.as_second();

    if timestamp.subsec_nanosecond() > 0 {
        seconds + 1
    } else {
        seconds
    }
}
