//! Tiered admission control.
//!
//! Every inbound operation is classified into a [`Tier`], keyed by the caller's
//! identity and address, and consumes one point from a fixed-window counter. Counters
//! live in a shared primary store (Redis) with a process-local fallback; when neither
//! can decide, the operation is denied.

#![deny(missing_docs)]

mod classifier;
mod context;
mod engine;
mod error;
mod key;
mod manager;
pub mod storage;
mod tier;
mod verdict;

pub use classifier::{Classifier, ClassifierError, Operation, Predicate, Rule};
pub use config::Tier;
pub use context::ClientContext;
pub use engine::{ConsumptionEngine, LimiterPair, PairFactory};
pub use error::{RateLimitError, RateLimitExceeded};
pub use key::RateLimitKey;
pub use manager::RateLimitManager;
pub use storage::{Consumption, ConsumeError, CounterStore, MemoryStore, StorageError};
pub use tier::{TierConfig, TierRegistry};
pub use verdict::{Admission, FAIL_CLOSED_RETRY_AFTER, Verdict};
