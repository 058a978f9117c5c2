//! Primary-then-fallback consumption with a fail-closed outcome.

use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use config::Tier;
use jiff::Timestamp;
use telemetry::{Counter, KeyValue, metrics};

use crate::{
    error::RateLimitExceeded,
    key::RateLimitKey,
    storage::{Consumption, ConsumeError, CounterStore},
    tier::{TierConfig, TierRegistry},
    verdict::{self, Admission, Verdict},
};

/// The two counters of a tier: one shared by the fleet, one local to the process.
#[derive(Clone)]
pub struct LimiterPair {
    /// Consulted first.
    pub primary: Arc<dyn CounterStore>,
    /// Consulted when the primary fails for reasons other than an exhausted quota.
    pub fallback: Arc<dyn CounterStore>,
}

/// Builds the pair of a tier on its first use.
pub type PairFactory = Box<dyn Fn(&TierConfig) -> LimiterPair + Send + Sync>;

#[derive(Clone, Copy)]
enum Source {
    Primary,
    Fallback,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Primary => "primary",
            Source::Fallback => "fallback",
        }
    }
}

/// Consumes points against the pair of each tier.
///
/// Pairs are created lazily, at most once per tier, and never replaced.
pub struct ConsumptionEngine {
    registry: TierRegistry,
    factory: PairFactory,
    pairs: [OnceLock<LimiterPair>; Tier::COUNT],
    decisions: Counter<u64>,
    store_failures: Counter<u64>,
}

impl ConsumptionEngine {
    /// Create an engine for the quotas in `registry`, building pairs with `factory`.
    pub fn new(registry: TierRegistry, factory: PairFactory) -> Self {
        let meter = metrics::meter();

        Self {
            registry,
            factory,
            pairs: std::array::from_fn(|_| OnceLock::new()),
            decisions: meter.u64_counter(metrics::ADMISSION_DECISIONS).build(),
            store_failures: meter.u64_counter(metrics::STORE_FAILURES).build(),
        }
    }

    /// The quotas this engine enforces.
    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    /// The pair of `tier`, built on first use.
    pub fn pair(&self, tier: Tier) -> &LimiterPair {
        self.pairs[tier.index()].get_or_init(|| {
            let pair = (self.factory)(self.registry.get(tier));

            log::debug!(
                "Initialized limiter pair for tier {tier} (primary: {}, fallback: {})",
                pair.primary.name(),
                pair.fallback.name()
            );

            pair
        })
    }

    /// Consume one point of `tier` for `key`.
    ///
    /// The fallback is only consulted after an infrastructure failure of the primary.
    /// When both fail the verdict is [`Verdict::InternalFailure`], never an admission.
    pub async fn consume(&self, tier: Tier, key: &RateLimitKey) -> Verdict {
        let limit = self.registry.get(tier).points;
        let pair = self.pair(tier);

        let primary_error = match pair.primary.consume(key).await {
            Ok(consumption) => return self.allowed(tier, limit, consumption, Source::Primary),
            Err(ConsumeError::QuotaExceeded { ms_before_next }) => {
                return self.denied(tier, limit, key, ms_before_next, Source::Primary);
            }
            Err(ConsumeError::Storage(error)) => error,
        };

        log::warn!(
            "Primary rate limit store '{}' failed for tier {tier}, using fallback: {primary_error}",
            pair.primary.name()
        );

        self.record_store_failure(tier, pair.primary.as_ref());

        match pair.fallback.consume(key).await {
            Ok(consumption) => self.allowed(tier, limit, consumption, Source::Fallback),
            Err(ConsumeError::QuotaExceeded { ms_before_next }) => {
                self.denied(tier, limit, key, ms_before_next, Source::Fallback)
            }
            Err(ConsumeError::Storage(error)) => {
                log::error!(
                    "Fallback rate limit store '{}' failed for tier {tier}, denying '{key}': {error}",
                    pair.fallback.name()
                );

                self.record_store_failure(tier, pair.fallback.as_ref());
                self.record_decision(tier, "failed_closed", "none");

                Verdict::InternalFailure { tier, limit }
            }
        }
    }

    fn allowed(&self, tier: Tier, limit: u32, consumption: Consumption, source: Source) -> Verdict {
        self.record_decision(tier, "allowed", source.as_str());

        Verdict::Allowed(Admission {
            tier,
            limit,
            remaining: consumption.remaining_points,
            reset_at: verdict::timestamp_after(Timestamp::now(), consumption.ms_before_next),
        })
    }

    fn denied(&self, tier: Tier, limit: u32, key: &RateLimitKey, ms_before_next: u64, source: Source) -> Verdict {
        log::debug!("Rate limit exceeded for '{key}' on tier {tier}, next point in {ms_before_next}ms");

        self.record_decision(tier, "denied", source.as_str());

        Verdict::Denied(RateLimitExceeded::new(
            tier,
            limit,
            Duration::from_millis(ms_before_next),
            Timestamp::now(),
        ))
    }

    fn record_decision(&self, tier: Tier, outcome: &'static str, store: &'static str) {
        self.decisions.add(
            1,
            &[
                KeyValue::new("tier", tier.as_str()),
                KeyValue::new("outcome", outcome),
                KeyValue::new("store", store),
            ],
        );
    }

    fn record_store_failure(&self, tier: Tier, store: &dyn CounterStore) {
        self.store_failures.add(
            1,
            &[KeyValue::new("store", store.name()), KeyValue::new("tier", tier.as_str())],
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::fake::FakeStore;

    struct Harness {
        engine: ConsumptionEngine,
        primary: FakeStore,
        fallback: FakeStore,
        factory_calls: Arc<AtomicUsize>,
    }

    /// An engine whose every tier is backed by the same two fakes, sized for `tier`.
    fn harness(tier: Tier) -> Harness {
        let registry = TierRegistry::builtin();
        let primary = FakeStore::new(registry.get(tier));
        let fallback = FakeStore::new(registry.get(tier));
        let factory_calls = Arc::new(AtomicUsize::new(0));

        let factory: PairFactory = {
            let primary = primary.clone();
            let fallback = fallback.clone();
            let factory_calls = factory_calls.clone();

            Box::new(move |_: &TierConfig| {
                factory_calls.fetch_add(1, Ordering::SeqCst);

                LimiterPair {
                    primary: Arc::new(primary.clone()),
                    fallback: Arc::new(fallback.clone()),
                }
            })
        };

        Harness {
            engine: ConsumptionEngine::new(registry, factory),
            primary,
            fallback,
            factory_calls,
        }
    }

    fn remaining(verdict: &Verdict) -> u32 {
        match verdict {
            Verdict::Allowed(admission) => admission.remaining,
            other => unreachable!("expected an admission, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn thought_submissions_trip_the_block() {
        let harness = harness(Tier::MutateThought);
        let key = RateLimitKey::build(None, Some("203.0.113.5"));

        let mut remainders = Vec::new();

        for _ in 0..3 {
            remainders.push(remaining(&harness.engine.consume(Tier::MutateThought, &key).await));
        }

        assert_eq!(remainders, [2, 1, 0]);

        let Verdict::Denied(exceeded) = harness.engine.consume(Tier::MutateThought, &key).await else {
            unreachable!("fourth submission is denied");
        };

        assert_eq!(exceeded.retry_after_seconds, 300);
        assert_eq!(exceeded.remaining, 0);
        assert_eq!(exceeded.limit, 3);
        assert_eq!(harness.fallback.calls(), 0);
    }

    #[tokio::test]
    async fn primary_admits_and_reports_the_window() {
        let harness = harness(Tier::GetStandard);
        let key = RateLimitKey::build(Some("abc"), Some("198.51.100.7"));

        let before = Timestamp::now();
        let Verdict::Allowed(admission) = harness.engine.consume(Tier::GetStandard, &key).await else {
            unreachable!("first read is admitted");
        };

        assert_eq!(admission.limit, 120);
        assert_eq!(admission.remaining, 119);
        assert!(admission.reset_at > before);
        assert!(admission.reset_epoch_seconds() <= before.as_second() + 61);
    }

    #[tokio::test]
    async fn primary_failure_is_served_by_the_fallback() {
        let harness = harness(Tier::InteractionLike);
        let key = RateLimitKey::build(None, Some("203.0.113.5"));

        for _ in 0..70 {
            harness.fallback.consume(&key).await.unwrap();
        }

        harness.primary.set_failing(true);

        let verdict = harness.engine.consume(Tier::InteractionLike, &key).await;

        assert_eq!(remaining(&verdict), 49);
        assert_eq!(harness.primary.calls(), 1);
    }

    #[tokio::test]
    async fn fallback_denials_are_denials() {
        let harness = harness(Tier::MutateThought);
        let key = RateLimitKey::build(None, Some("203.0.113.5"));

        harness.primary.set_failing(true);

        for _ in 0..3 {
            assert!(harness.engine.consume(Tier::MutateThought, &key).await.is_allowed());
        }

        assert!(matches!(
            harness.engine.consume(Tier::MutateThought, &key).await,
            Verdict::Denied(_)
        ));
    }

    #[tokio::test]
    async fn quota_exceeded_on_primary_does_not_consult_the_fallback() {
        let harness = harness(Tier::MutateThought);
        let key = RateLimitKey::build(Some("abc"), Some("203.0.113.5"));

        for _ in 0..4 {
            harness.engine.consume(Tier::MutateThought, &key).await;
        }

        assert_eq!(harness.fallback.calls(), 0);
    }

    #[tokio::test]
    async fn both_stores_failing_fails_closed() {
        let harness = harness(Tier::InteractionLike);
        let key = RateLimitKey::build(Some("abc"), Some("203.0.113.5"));

        harness.primary.set_failing(true);
        harness.fallback.set_failing(true);

        let verdict = harness.engine.consume(Tier::InteractionLike, &key).await;

        assert_eq!(
            verdict,
            Verdict::InternalFailure {
                tier: Tier::InteractionLike,
                limit: 120
            }
        );

        let exceeded = verdict.into_result().unwrap_err();

        assert_eq!(exceeded.remaining, 0);
        assert_eq!(exceeded.retry_after_seconds, 1);
    }

    #[tokio::test]
    async fn recovered_primary_is_used_again() {
        let harness = harness(Tier::GetSearch);
        let key = RateLimitKey::build(None, Some("203.0.113.5"));

        harness.primary.set_failing(true);
        assert_eq!(remaining(&harness.engine.consume(Tier::GetSearch, &key).await), 29);

        harness.primary.set_failing(false);
        assert_eq!(remaining(&harness.engine.consume(Tier::GetSearch, &key).await), 29);
        assert_eq!(harness.fallback.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pairs_are_built_once_per_tier() {
        let harness = Arc::new(harness(Tier::GetStandard));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let harness = harness.clone();

                tokio::spawn(async move {
                    let key = RateLimitKey::build(None, Some(&format!("10.0.0.{i}")));
                    harness.engine.consume(Tier::GetStandard, &key).await
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_allowed());
        }

        assert_eq!(harness.factory_calls.load(Ordering::SeqCst), 1);

        harness.engine.pair(Tier::GetSearch);
        harness.engine.pair(Tier::GetSearch);

        assert_eq!(harness.factory_calls.load(Ordering::SeqCst), 2);
    }
}
