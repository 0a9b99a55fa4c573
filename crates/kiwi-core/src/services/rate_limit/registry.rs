//! Named limiter groups

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{RateLimitDecision, RateLimitPolicy, RateLimiter};
use crate::config::RateLimitSettings;

/// Logical API groups with their own request budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitGroup {
    Global,
    General,
    KeywordAnalysis,
    Trends,
}

const TREND_SERVICES: &[&str] = &["trends", "naver_datalab", "daum_datalab"];

const KEYWORD_SERVICES: &[&str] = &[
    "keyword_analysis",
    "keyword_expand",
    "quick_search",
    "naver_ads",
    "youtube_keywords",
    "coupang_wing",
    "rank_tracking",
    "influence",
];

impl RateLimitGroup {
    pub const ALL: [RateLimitGroup; 4] = [
        RateLimitGroup::Global,
        RateLimitGroup::General,
        RateLimitGroup::KeywordAnalysis,
        RateLimitGroup::Trends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitGroup::Global => "global",
            RateLimitGroup::General => "general",
            RateLimitGroup::KeywordAnalysis => "keyword_analysis",
            RateLimitGroup::Trends => "trends",
        }
    }

    /// Requests per minute when nothing is configured
    pub fn default_per_minute(&self) -> u32 {
        match self {
            RateLimitGroup::Global => 60,
            RateLimitGroup::General => 30,
            RateLimitGroup::KeywordAnalysis => 10,
            RateLimitGroup::Trends => 5,
        }
    }

    /// Limiter class for a usage service name
    pub fn for_service(service: &str) -> Self {
        let service = service.trim();
        if TREND_SERVICES.contains(&service) {
            RateLimitGroup::Trends
        } else if KEYWORD_SERVICES.contains(&service) {
            RateLimitGroup::KeywordAnalysis
        } else {
            RateLimitGroup::General
        }
    }
}

impl fmt::Display for RateLimitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RateLimitGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateLimitGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("Unknown rate limit group: {}", s))
    }
}

/// One limiter per group, all sharing the same eviction routine
#[derive(Debug)]
pub struct RateLimiters {
    global: RateLimiter,
    general: RateLimiter,
    keyword_analysis: RateLimiter,
    trends: RateLimiter,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

impl RateLimiters {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let build = |group| RateLimiter::new(RateLimitPolicy::per_minute(settings.per_minute(group)));
        Self {
            global: build(RateLimitGroup::Global),
            general: build(RateLimitGroup::General),
            keyword_analysis: build(RateLimitGroup::KeywordAnalysis),
            trends: build(RateLimitGroup::Trends),
        }
    }

    pub fn limiter(&self, group: RateLimitGroup) -> &RateLimiter {
        match group {
            RateLimitGroup::Global => &self.global,
            RateLimitGroup::General => &self.general,
            RateLimitGroup::KeywordAnalysis => &self.keyword_analysis,
            RateLimitGroup::Trends => &self.trends,
        }
    }

    pub fn check(&self, group: RateLimitGroup, identifier: &str) -> RateLimitDecision {
        self.limiter(group).check(identifier)
    }

    /// Evict expired windows in every group, returning the total removed
    pub fn cleanup_all(&self) -> usize {
        RateLimitGroup::ALL
            .iter()
            .map(|group| self.limiter(*group).cleanup())
            .sum()
    }

    /// Tracked identifiers across all groups
    pub fn tracked(&self) -> usize {
        RateLimitGroup::ALL
            .iter()
            .map(|group| self.limiter(*group).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_classification() {
        assert_eq!(RateLimitGroup::for_service("trends"), RateLimitGroup::Trends);
        assert_eq!(RateLimitGroup::for_service("naver_datalab"), RateLimitGroup::Trends);
        assert_eq!(
            RateLimitGroup::for_service("keyword_analysis"),
            RateLimitGroup::KeywordAnalysis
        );
        assert_eq!(
            RateLimitGroup::for_service("coupang_wing"),
            RateLimitGroup::KeywordAnalysis
        );
        assert_eq!(RateLimitGroup::for_service("export"), RateLimitGroup::General);
    }

    #[test]
    fn test_default_budgets() {
        let limiters = RateLimiters::default();
        assert_eq!(limiters.limiter(RateLimitGroup::General).policy().max_requests, 30);
        assert_eq!(
            limiters.limiter(RateLimitGroup::KeywordAnalysis).policy().max_requests,
            10
        );
        assert_eq!(limiters.limiter(RateLimitGroup::Trends).policy().max_requests, 5);
    }

    #[test]
    fn test_groups_have_independent_state() {
        let settings = RateLimitSettings {
            trends_per_minute: 1,
            ..RateLimitSettings::default()
        };
        let limiters = RateLimiters::from_settings(&settings);

        assert!(limiters.check(RateLimitGroup::Trends, "u1").success);
        assert!(!limiters.check(RateLimitGroup::Trends, "u1").success);
        assert!(limiters.check(RateLimitGroup::General, "u1").success);
        assert_eq!(limiters.tracked(), 2);
    }

    #[test]
    fn test_group_round_trips_through_str() {
        for group in RateLimitGroup::ALL {
            assert_eq!(group.as_str().parse::<RateLimitGroup>().unwrap(), group);
        }
        assert!("bogus".parse::<RateLimitGroup>().is_err());
    }
}
