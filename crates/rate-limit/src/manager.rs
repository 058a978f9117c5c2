//! Rate limit manager, the entry point of both admission adapters.

use std::sync::Arc;

use config::{RateLimitConfig, RedisConfig, StorageConfig, Tier};
use telemetry::{
    KeyValue,
    metrics::{ADMISSION_DURATION, Recorder},
};

use crate::{
    classifier::{Classifier, Operation},
    context::ClientContext,
    engine::{ConsumptionEngine, LimiterPair, PairFactory},
    error::{RateLimitError, RateLimitExceeded},
    storage::{MemoryStore, RedisStore, StorageError, redis_pool},
    tier::{TierConfig, TierRegistry},
    verdict::{Admission, Verdict},
};

/// Classifies operations and admits them against their tier's quota.
pub struct RateLimitManager {
    enabled: bool,
    classifier: Classifier,
    engine: ConsumptionEngine,
}

impl RateLimitManager {
    /// Create a manager with the configured primary store.
    ///
    /// An unreachable Redis does not fail construction: it is reported and the
    /// fallback serves requests until the server answers.
    pub async fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let classifier = Classifier::from_config(&config.routes)?;
        let registry = TierRegistry::from_overrides(&config.tiers);

        let factory = match &config.storage {
            StorageConfig::Memory => memory_factory(),
            StorageConfig::Redis(redis_config) => redis_factory(redis_config).await?,
        };

        Ok(Self::with_engine(
            config.enabled,
            classifier,
            ConsumptionEngine::new(registry, factory),
        ))
    }

    /// Create a manager around an existing engine, for custom stores.
    pub fn with_engine(enabled: bool, classifier: Classifier, engine: ConsumptionEngine) -> Self {
        Self {
            enabled,
            classifier,
            engine,
        }
    }

    /// Whether operations are counted at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Tier of an operation.
    pub fn classify(&self, operation: &Operation<'_>) -> Tier {
        self.classifier.classify(operation)
    }

    /// The classification rules in use.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// The quotas in use.
    pub fn registry(&self) -> &TierRegistry {
        self.engine.registry()
    }

    /// Consume one point of `tier` for the caller described by `context`.
    pub async fn check(&self, tier: Tier, context: &ClientContext) -> Verdict {
        if !self.enabled {
            return Verdict::Allowed(Admission::unlimited(tier, self.registry().get(tier).points));
        }

        let recorder = Recorder::start(ADMISSION_DURATION, [KeyValue::new("tier", tier.as_str())]);

        let verdict = self.engine.consume(tier, &context.key()).await;

        let outcome = match &verdict {
            Verdict::Allowed(_) => "allowed",
            Verdict::Denied(_) => "denied",
            Verdict::InternalFailure { .. } => "failed_closed",
        };

        recorder.finish(outcome);

        verdict
    }

    /// Classify `operation`, then consume one point of its tier.
    pub async fn check_operation(&self, operation: &Operation<'_>, context: &ClientContext) -> (Tier, Verdict) {
        let tier = self.classify(operation);
        let verdict = self.check(tier, context).await;

        (tier, verdict)
    }

    /// Admit an operation of `tier` for the caller of the current request.
    ///
    /// Outside of a request the caller is anonymous at an unknown address.
    pub async fn admit(&self, tier: Tier) -> Result<Admission, RateLimitExceeded> {
        self.admit_as(tier, &ClientContext::current()).await
    }

    /// Admit an operation of `tier` for an explicit caller.
    pub async fn admit_as(&self, tier: Tier, context: &ClientContext) -> Result<Admission, RateLimitExceeded> {
        self.check(tier, context).await.into_result()
    }
}

fn memory_factory() -> PairFactory {
    log::warn!("Rate limits use process memory as primary store, quotas are not shared between instances");

    Box::new(|config: &TierConfig| LimiterPair {
        primary: Arc::new(MemoryStore::new(config)),
        fallback: Arc::new(MemoryStore::new(config)),
    })
}

async fn redis_factory(config: &RedisConfig) -> Result<PairFactory, RateLimitError> {
    let pool = redis_pool::create_pool(config)
        .map_err(|e| StorageError::Connection(format!("Failed to create Redis pool: {e}")))?;

    match tokio::time::timeout(config.response_timeout, pool.get()).await {
        Ok(Ok(_)) => log::debug!("Connected to Redis for rate limiting"),
        Ok(Err(e)) => log::warn!("Redis is not reachable, falling back to process memory until it is: {e}"),
        Err(_) => log::warn!(
            "Redis did not answer within {:?}, falling back to process memory until it does",
            config.response_timeout
        ),
    }

    let global_prefix = config.key_prefix.clone();
    let response_timeout = config.response_timeout;
    let retry = config.retry.clone();

    Ok(Box::new(move |tier_config: &TierConfig| LimiterPair {
        primary: Arc::new(RedisStore::new(
            pool.clone(),
            &global_prefix,
            tier_config,
            response_timeout,
            retry.clone(),
        )),
        fallback: Arc::new(MemoryStore::new(tier_config)),
    }))
}
