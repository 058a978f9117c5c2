//! Redis counter store, shared by every instance of the fleet.
//!
//! A single Lua script creates the window, increments it and trips the block, so
//! concurrent consumers on different hosts never see more than `points` successes
//! per window.
//!
//! Only the connection checkout is retried. Once the script has been sent it may have
//! committed, and running it again would charge the caller twice.

use std::{future::Future, sync::LazyLock, time::Duration};

use async_trait::async_trait;
use config::RetryConfig;

use super::{
    Consumption, ConsumeError, CounterStore, StorageError,
    redis_pool::{Connection, Pool},
};
use crate::{key::RateLimitKey, tier::TierConfig};

/// KEYS[1] = counter, ARGV = points, window ms, block ms (0 = none).
/// Returns the consumed count and the remaining TTL in milliseconds.
static CONSUME_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
        local points = tonumber(ARGV[1])
        local duration = tonumber(ARGV[2])
        local block = tonumber(ARGV[3])

        redis.call('SET', KEYS[1], 0, 'PX', duration, 'NX')
        local consumed = redis.call('INCR', KEYS[1])
        local ttl = redis.call('PTTL', KEYS[1])

        if ttl < 0 then
            redis.call('PEXPIRE', KEYS[1], duration)
            ttl = duration
        end

        if block > 0 and consumed == points + 1 then
            redis.call('PEXPIRE', KEYS[1], block)
            ttl = block
        end

        return {consumed, ttl}
        "#,
    )
});

/// Redis counter store for one tier.
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
    points: u32,
    duration_ms: u64,
    block_ms: u64,
    response_timeout: Duration,
    retry: RetryConfig,
}

impl RedisStore {
    pub(crate) fn new(
        pool: Pool,
        global_prefix: &str,
        config: &TierConfig,
        response_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            pool,
            key_prefix: format!("{global_prefix}{}", config.key_prefix),
            points: config.points,
            duration_ms: millis(config.duration),
            block_ms: config.block().map(millis).unwrap_or(0),
            response_timeout,
            retry,
        }
    }

    fn storage_key(&self, key: &RateLimitKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// A pooled connection, each attempt bounded by the response timeout.
    async fn checkout(&self) -> Result<Connection, StorageError> {
        match tokio::time::timeout(self.response_timeout, self.pool.get()).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e)) => Err(StorageError::Connection(e.to_string())),
            Err(_) => Err(StorageError::Timeout(self.response_timeout)),
        }
    }

    /// Runs the script once. Never retried.
    async fn eval(&self, mut connection: Connection, storage_key: &str) -> Result<(i64, i64), StorageError> {
        let mut script = CONSUME_SCRIPT.key(storage_key);
        script.arg(self.points).arg(self.duration_ms).arg(self.block_ms);
        let invocation = script.invoke_async(&mut *connection);

        match tokio::time::timeout(self.response_timeout, invocation).await {
            Ok(result) => result.map_err(|e| StorageError::Query(e.to_string())),
            Err(_) => Err(StorageError::Timeout(self.response_timeout)),
        }
    }
}

/// Delays between two attempts: `backoff`, doubling, capped at `max_backoff`.
/// One delay fewer than there are attempts.
fn backoff_delays(retry: &RetryConfig) -> impl Iterator<Item = Duration> {
    let cap = retry.max_backoff;

    std::iter::successors(Some(retry.backoff.min(cap)), move |delay| {
        Some(delay.saturating_mul(2).min(cap))
    })
    .take(retry.attempts.saturating_sub(1) as usize)
}

/// Runs `checkout` until it succeeds or the policy is exhausted, then `run` exactly once.
async fn checkout_then_run<C, T, Checkout, CheckoutFuture, Run, RunFuture>(
    retry: &RetryConfig,
    mut checkout: Checkout,
    run: Run,
) -> Result<T, StorageError>
where
    Checkout: FnMut() -> CheckoutFuture,
    CheckoutFuture: Future<Output = Result<C, StorageError>>,
    Run: FnOnce(C) -> RunFuture,
    RunFuture: Future<Output = Result<T, StorageError>>,
{
    let mut delays = backoff_delays(retry);
    let mut attempt = 1;

    let connection = loop {
        let error = match checkout().await {
            Ok(connection) => break connection,
            Err(error) => error,
        };

        let Some(delay) = delays.next() else {
            return Err(error);
        };

        log::debug!(
            "Redis checkout attempt {attempt}/{} failed: {error}, retrying in {delay:?}",
            retry.attempts
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    };

    run(connection).await
}

#[async_trait]
impl CounterStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn consume(&self, key: &RateLimitKey) -> Result<Consumption, ConsumeError> {
        let storage_key = self.storage_key(key);

        let (consumed, ttl) = checkout_then_run(
            &self.retry,
            || self.checkout(),
            |connection: Connection| self.eval(connection, &storage_key),
        )
        .await?;

        interpret(self.points, consumed, ttl)
    }
}

/// Turns the script result into a consumption or a rejection.
fn interpret(points: u32, consumed: i64, ttl: i64) -> Result<Consumption, ConsumeError> {
    if consumed < 1 {
        return Err(StorageError::Query(format!("unexpected consumed count {consumed}")).into());
    }

    let ms_before_next = u64::try_from(ttl).unwrap_or(0);

    if consumed > i64::from(points) {
        return Err(ConsumeError::QuotaExceeded { ms_before_next });
    }

    Ok(Consumption {
        remaining_points: points - consumed as u32,
        ms_before_next,
    })
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
