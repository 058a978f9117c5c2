//! Quota parameters per tier.

use std::{borrow::Cow, collections::BTreeMap, time::Duration};

use config::{Tier, TierQuota};

/// Quota of a single tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Operations allowed per window.
    pub points: u32,
    /// Length of the base window.
    pub duration: Duration,
    /// Punitive window applied once the quota is exceeded.
    pub block_duration: Option<Duration>,
    /// Namespace prepended to every key of the tier.
    pub key_prefix: Cow<'static, str>,
}

impl TierConfig {
    /// The block duration, if one applies. A zero block never trips.
    pub fn block(&self) -> Option<Duration> {
        self.block_duration.filter(|block| !block.is_zero())
    }

    /// Built-in quota of a tier.
    pub fn builtin(tier: Tier) -> Self {
        let (points, duration, block, key_prefix) = match tier {
            Tier::GetStandard => (120, 60, None, "rl:get:standard:"),
            Tier::GetSearch => (30, 60, None, "rl:get:search:"),
            Tier::MutateStandard => (30, 60, None, "rl:mutate:standard:"),
            Tier::MutateContent => (20, 60, Some(120), "rl:mutate:content:"),
            Tier::MutateThought => (3, 60, Some(300), "rl:mutate:thought:"),
            Tier::InteractionLike => (120, 60, None, "rl:interaction:like:"),
            Tier::InteractionNotificationUpdate => (60, 60, None, "rl:interaction:notification:"),
        };

        Self {
            points,
            duration: Duration::from_secs(duration),
            block_duration: block.map(Duration::from_secs),
            key_prefix: Cow::Borrowed(key_prefix),
        }
    }

    fn with_override(tier: Tier, quota: &TierQuota) -> Self {
        let builtin = Self::builtin(tier);

        Self {
            points: quota.points,
            duration: quota.duration,
            block_duration: quota.block_duration,
            key_prefix: quota
                .key_prefix
                .clone()
                .map(Cow::Owned)
                .unwrap_or(builtin.key_prefix),
        }
    }
}

/// Fixed table from tier to quota, built once at startup.
#[derive(Debug, Clone)]
pub struct TierRegistry {
    configs: [TierConfig; Tier::COUNT],
}

impl TierRegistry {
    /// The built-in quotas.
    pub fn builtin() -> Self {
        Self::from_overrides(&BTreeMap::new())
    }

    /// Built-in quotas with the configured overrides applied.
    pub fn from_overrides(overrides: &BTreeMap<Tier, TierQuota>) -> Self {
        let configs = Tier::ALL.map(|tier| match overrides.get(&tier) {
            Some(quota) => TierConfig::with_override(tier, quota),
            None => TierConfig::builtin(tier),
        });

        Self { configs }
    }

    /// Quota of the given tier.
    pub fn get(&self, tier: Tier) -> &TierConfig {
        &self.configs[tier.index()]
    }
}

impl Default for TierRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
