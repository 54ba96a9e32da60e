use crate::model::{ResolvedTier, ResultTier, TestId, TierError};

/// Validated tiers of one test, sorted by threshold.
///
/// Construction is where bad configuration is caught; `resolve` itself
/// never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLadder {
    test_id: TestId,
    tiers: Vec<ResultTier>,
}

impl TierLadder {
    /// # Errors
    ///
    /// Returns `TierError::ForeignTier` if a tier belongs to another test and
    /// `TierError::DuplicateThreshold` if two tiers share a threshold.
    pub fn new(test_id: TestId, mut tiers: Vec<ResultTier>) -> Result<Self, TierError> {
        if let Some(foreign) = tiers.iter().find(|t| t.test_id() != test_id) {
            return Err(TierError::ForeignTier {
                tier: foreign.id(),
                expected: test_id,
                found: foreign.test_id(),
            });
        }

        tiers.sort_by_key(|t| (t.threshold(), t.id()));
        if let Some(pair) = tiers
            .windows(2)
            .find(|pair| pair[0].threshold() == pair[1].threshold())
        {
            return Err(TierError::DuplicateThreshold {
                first: pair[0].id(),
                second: pair[1].id(),
                threshold: pair[0].threshold(),
            });
        }

        Ok(Self { test_id, tiers })
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    /// Tiers in ascending threshold order.
    #[must_use]
    pub fn tiers(&self) -> &[ResultTier] {
        &self.tiers
    }

    /// Tier with the greatest threshold not above `score`, or the
    /// below-lowest sentinel.
    #[must_use]
    pub fn resolve(&self, score: i64) -> ResolvedTier {
        let qualifying = self.tiers.partition_point(|t| t.threshold() <= score);
        qualifying
            .checked_sub(1)
            .and_then(|index| self.tiers.get(index))
            .map_or(ResolvedTier::BelowLowest, ResolvedTier::from)
    }
}
