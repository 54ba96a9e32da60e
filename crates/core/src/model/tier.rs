use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{TestId, TierId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TierError {
    #[error("tier label cannot be empty")]
    EmptyLabel,

    #[error("tier threshold {0} is reserved")]
    ReservedThreshold(i64),

    #[error("tiers {first} and {second} share threshold {threshold}")]
    DuplicateThreshold {
        first: TierId,
        second: TierId,
        threshold: i64,
    },

    #[error("tier {tier} belongs to test {found}, expected {expected}")]
    ForeignTier {
        tier: TierId,
        expected: TestId,
        found: TestId,
    },
}

/// A labeled score bracket. A score qualifies for the tier with the greatest
/// threshold that does not exceed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTier {
    id: TierId,
    test_id: TestId,
    label: String,
    threshold: i64,
}

impl ResultTier {
    /// # Errors
    ///
    /// Returns `TierError::EmptyLabel` for a blank label and
    /// `TierError::ReservedThreshold` for `i64::MIN`, which only the
    /// below-lowest sentinel may use.
    pub fn new(
        id: TierId,
        test_id: TestId,
        label: impl Into<String>,
        threshold: i64,
    ) -> Result<Self, TierError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(TierError::EmptyLabel);
        }
        if threshold == ResolvedTier::BELOW_LOWEST_THRESHOLD {
            return Err(TierError::ReservedThreshold(threshold));
        }
        Ok(Self {
            id,
            test_id,
            label: label.trim().to_owned(),
            threshold,
        })
    }

    #[must_use]
    pub fn id(&self) -> TierId {
        self.id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

/// Outcome of resolving a score: a configured tier, or the sentinel for
/// scores below every configured threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedTier {
    Tier {
        id: TierId,
        label: String,
        threshold: i64,
    },
    BelowLowest,
}

impl ResolvedTier {
    /// Threshold reported by the sentinel; strictly below any configurable tier.
    pub const BELOW_LOWEST_THRESHOLD: i64 = i64::MIN;

    pub const BELOW_LOWEST_LABEL: &'static str = "below lowest tier";

    #[must_use]
    pub fn threshold(&self) -> i64 {
        match self {
            ResolvedTier::Tier { threshold, .. } => *threshold,
            ResolvedTier::BelowLowest => Self::BELOW_LOWEST_THRESHOLD,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            ResolvedTier::Tier { label, .. } => label,
            ResolvedTier::BelowLowest => Self::BELOW_LOWEST_LABEL,
        }
    }

    #[must_use]
    pub fn tier_id(&self) -> Option<TierId> {
        match self {
            ResolvedTier::Tier { id, .. } => Some(*id),
            ResolvedTier::BelowLowest => None,
        }
    }

    #[must_use]
    pub fn is_below_lowest(&self) -> bool {
        matches!(self, ResolvedTier::BelowLowest)
    }

    /// Compares two resolved tiers by threshold; higher is better.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.threshold().cmp(&other.threshold())
    }
}

impl From<&ResultTier> for ResolvedTier {
    fn from(tier: &ResultTier) -> Self {
        ResolvedTier::Tier {
            id: tier.id(),
            label: tier.label().to_owned(),
            threshold: tier.threshold(),
        }
    }
}
