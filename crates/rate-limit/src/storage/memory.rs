//! Process-local counter store.
//!
//! Counts only the requests seen by this process. Atomicity per key comes from the
//! shard lock `DashMap` holds while an entry is mutated.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{Consumption, ConsumeError, CounterStore};
use crate::{key::RateLimitKey, tier::TierConfig};

/// Expired windows are swept after this many consumptions.
const SWEEP_INTERVAL: u64 = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    consumed: u32,
    expires_at: Instant,
}

/// In-memory counter store for one tier.
pub struct MemoryStore {
    points: u32,
    duration: Duration,
    block: Option<Duration>,
    key_prefix: String,
    windows: DashMap<String, Window>,
    consumptions: AtomicU64,
}

impl MemoryStore {
    /// Create a store enforcing the quota of `config`.
    pub fn new(config: &TierConfig) -> Self {
        Self {
            points: config.points,
            duration: config.duration,
            block: config.block(),
            key_prefix: config.key_prefix.to_string(),
            windows: DashMap::new(),
            consumptions: AtomicU64::new(0),
        }
    }

    /// Number of keys currently tracked, expired ones included until the next sweep.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn consume_now(&self, key: &RateLimitKey, now: Instant) -> Result<Consumption, ConsumeError> {
        let storage_key = format!("{}{}", self.key_prefix, key);

        let result = {
            let mut window = self.windows.entry(storage_key).or_insert_with(|| Window {
                consumed: 0,
                expires_at: now + self.duration,
            });

            if window.expires_at <= now {
                window.consumed = 0;
                window.expires_at = now + self.duration;
            }

            window.consumed = window.consumed.saturating_add(1);

            if window.consumed > self.points {
                // The first rejected attempt trips the block; later ones do not extend it.
                if let Some(block) = self.block
                    && window.consumed == self.points + 1
                {
                    window.expires_at = now + block;
                }

                Err(ConsumeError::QuotaExceeded {
                    ms_before_next: millis_until(window.expires_at, now),
                })
            } else {
                Ok(Consumption {
                    remaining_points: self.points - window.consumed,
                    ms_before_next: millis_until(window.expires_at, now),
                })
            }
        };

        if self.consumptions.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep(now);
        }

        result
    }

    fn sweep(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.expires_at > now);

        log::debug!(
            "Swept {} expired rate limit windows with prefix '{}'",
            before.saturating_sub(self.windows.len()),
            self.key_prefix
        );
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn consume(&self, key: &RateLimitKey) -> Result<Consumption, ConsumeError> {
        self.consume_now(key, Instant::now())
    }
}

fn millis_until(deadline: Instant, now: Instant) -> u64 {
    u64::try_from(deadline.saturating_duration_since(now).as_millis()).unwrap_or(u64::MAX)
}
