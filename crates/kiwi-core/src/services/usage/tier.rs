//! Tier policy table
//!
//! The one place that maps a [`MembershipTier`] to its daily allowance.

use serde::{Serialize, Serializer};

use crate::models::MembershipTier;

/// A daily allowance, or what is left of one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Bounded(u32),
    Unlimited,
}

impl Limit {
    /// Wire representation: the count, or `-1` for unlimited
    pub fn as_wire(&self) -> i64 {
        match self {
            Limit::Bounded(n) => i64::from(*n),
            Limit::Unlimited => -1,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_wire())
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Limit::Bounded(n) => write!(f, "{}/day", n),
            Limit::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Outcome of comparing a usage count against a tier's allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub is_allowed: bool,
    pub limit: Limit,
    pub remaining: Limit,
}

/// Daily call allowance per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    free: Limit,
    basic: Limit,
    standard: Limit,
    premium: Limit,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            free: Limit::Bounded(10),
            basic: Limit::Bounded(100),
            standard: Limit::Bounded(500),
            premium: Limit::Unlimited,
        }
    }
}

impl TierPolicy {
    /// Allowance for a tier
    pub fn limit_for(&self, tier: MembershipTier) -> Limit {
        match tier {
            MembershipTier::Free => self.free,
            MembershipTier::Basic => self.basic,
            MembershipTier::Standard => self.standard,
            MembershipTier::Premium => self.premium,
        }
    }

    /// Override one tier's allowance
    pub fn with_limit(mut self, tier: MembershipTier, limit: Limit) -> Self {
        match tier {
            MembershipTier::Free => self.free = limit,
            MembershipTier::Basic => self.basic = limit,
            MembershipTier::Standard => self.standard = limit,
            MembershipTier::Premium => self.premium = limit,
        }
        self
    }

    /// Compare today's usage against the tier's allowance
    pub fn evaluate(&self, tier: MembershipTier, current_usage: u32) -> Allowance {
        match self.limit_for(tier) {
            Limit::Unlimited => Allowance {
                is_allowed: true,
                limit: Limit::Unlimited,
                remaining: Limit::Unlimited,
            },
            Limit::Bounded(limit) => Allowance {
                is_allowed: current_usage < limit,
                limit: Limit::Bounded(limit),
                remaining: Limit::Bounded(limit.saturating_sub(current_usage)),
            },
        }
    }

    /// All tiers with their allowances, cheapest first
    pub fn table(&self) -> Vec<(MembershipTier, Limit)> {
        MembershipTier::ALL
            .iter()
            .map(|tier| (*tier, self.limit_for(*tier)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = TierPolicy::default();
        assert_eq!(policy.limit_for(MembershipTier::Free), Limit::Bounded(10));
        assert_eq!(policy.limit_for(MembershipTier::Basic), Limit::Bounded(100));
        assert_eq!(policy.limit_for(MembershipTier::Standard), Limit::Bounded(500));
        assert_eq!(policy.limit_for(MembershipTier::Premium), Limit::Unlimited);
    }

    #[test]
    fn test_bounded_tiers_compare_strictly() {
        let policy = TierPolicy::default();
        for (tier, limit) in policy.table() {
            let Limit::Bounded(max) = limit else { continue };
            for used in [0, max.saturating_sub(1), max, max + 7] {
                let allowance = policy.evaluate(tier, used);
                assert_eq!(allowance.is_allowed, used < max, "{} at {}", tier, used);
                assert_eq!(allowance.remaining, Limit::Bounded(max.saturating_sub(used)));
            }
        }
    }

    #[test]
    fn test_free_tier_last_call() {
        let policy = TierPolicy::default();
        let allowance = policy.evaluate(MembershipTier::Free, 9);
        assert!(allowance.is_allowed);
        assert_eq!(allowance.remaining, Limit::Bounded(1));

        let allowance = policy.evaluate(MembershipTier::Free, 10);
        assert!(!allowance.is_allowed);
        assert_eq!(allowance.remaining, Limit::Bounded(0));
    }

    #[test]
    fn test_unlimited_ignores_usage() {
        let allowance = TierPolicy::default().evaluate(MembershipTier::Premium, 10_000);
        assert!(allowance.is_allowed);
        assert_eq!(allowance.remaining.as_wire(), -1);
        assert_eq!(allowance.limit.as_wire(), -1);
    }

    #[test]
    fn test_limit_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Limit::Bounded(42)).unwrap(), "42");
        assert_eq!(serde_json::to_string(&Limit::Unlimited).unwrap(), "-1");
    }

    #[test]
    fn test_with_limit_override() {
        let policy = TierPolicy::default().with_limit(MembershipTier::Free, Limit::Bounded(3));
        assert!(!policy.evaluate(MembershipTier::Free, 3).is_allowed);
    }
}
