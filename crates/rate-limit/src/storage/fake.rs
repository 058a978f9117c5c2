use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

use super::{Consumption, ConsumeError, CounterStore, MemoryStore, StorageError};
use crate::{key::RateLimitKey, tier::TierConfig};

/// Memory-backed store that can be switched into failing like an unreachable server.
#[derive(Clone)]
pub(crate) struct FakeStore {
    inner: Arc<MemoryStore>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FakeStore {
    pub(crate) fn new(config: &TierConfig) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new(config)),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for FakeStore {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn consume(&self, key: &RateLimitKey) -> Result<Consumption, ConsumeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("connection refused".to_string()).into());
        }

        self.inner.consume(key).await
    }
}
