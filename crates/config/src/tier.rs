//! The closed set of admission tiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A named category of inbound operation with its own quota.
///
/// The set is closed: every classified operation resolves to exactly one of
/// these, and an unknown tier cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Plain reads.
    #[serde(rename = "get:standard")]
    GetStandard,
    /// Search queries, either on a search path or the listing with a search term.
    #[serde(rename = "get:search")]
    GetSearch,
    /// Writes that match no more specific rule.
    #[serde(rename = "mutate:standard")]
    MutateStandard,
    /// Writes on primary content resources.
    #[serde(rename = "mutate:content")]
    MutateContent,
    /// Anonymous thought submission, the most abused surface.
    #[serde(rename = "mutate:thought")]
    MutateThought,
    /// Like and unlike toggles.
    #[serde(rename = "interaction:like")]
    InteractionLike,
    /// Notification management writes.
    #[serde(rename = "interaction:notificationUpdate")]
    InteractionNotificationUpdate,
}

impl Tier {
    /// Every tier, in declaration order.
    pub const ALL: [Tier; 7] = [
        Tier::GetStandard,
        Tier::GetSearch,
        Tier::MutateStandard,
        Tier::MutateContent,
        Tier::MutateThought,
        Tier::InteractionLike,
        Tier::InteractionNotificationUpdate,
    ];

    /// Number of tiers.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index of the tier, usable for fixed-size per-tier tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The canonical `family:name` form of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::GetStandard => "get:standard",
            Tier::GetSearch => "get:search",
            Tier::MutateStandard => "mutate:standard",
            Tier::MutateContent => "mutate:content",
            Tier::MutateThought => "mutate:thought",
            Tier::InteractionLike => "interaction:like",
            Tier::InteractionNotificationUpdate => "interaction:notificationUpdate",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTier(pub String);

impl fmt::Display for UnknownTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown rate limit tier '{}'", self.0)
    }
}

impl std::error::Error for UnknownTier {}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}
