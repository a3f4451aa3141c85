// Freshness Policy - data components, tiers and staleness rules

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// A refreshable slice of per-subject data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Quotes,
    Fundamentals,
    FilingsIndex,
    FilingsDocuments,
    News,
    Signals,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Quotes,
        Component::Fundamentals,
        Component::FilingsIndex,
        Component::FilingsDocuments,
        Component::News,
        Component::Signals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Quotes => "quotes",
            Component::Fundamentals => "fundamentals",
            Component::FilingsIndex => "filings_index",
            Component::FilingsDocuments => "filings_documents",
            Component::News => "news",
            Component::Signals => "signals",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Static rule for this component (TTL before any override)
    pub fn default_rule(&self) -> FreshnessRule {
        match self {
            Component::Quotes => FreshnessRule {
                tier: Tier::Fast,
                ttl_ms: None,
                class: JobClass::Light,
                groupable: true,
                depends_on: &[],
            },
            Component::Fundamentals => FreshnessRule {
                tier: Tier::Reliable,
                ttl_ms: Some(6 * HOUR_MS),
                class: JobClass::Light,
                groupable: true,
                depends_on: &[],
            },
            Component::FilingsIndex => FreshnessRule {
                tier: Tier::Reliable,
                ttl_ms: Some(12 * HOUR_MS),
                class: JobClass::Light,
                groupable: false,
                depends_on: &[],
            },
            Component::FilingsDocuments => FreshnessRule {
                tier: Tier::Slow,
                ttl_ms: None,
                class: JobClass::Heavy,
                groupable: false,
                depends_on: &[Component::FilingsIndex],
            },
            Component::News => FreshnessRule {
                tier: Tier::Slow,
                ttl_ms: Some(12 * HOUR_MS),
                class: JobClass::Heavy,
                groupable: false,
                depends_on: &[],
            },
            Component::Signals => FreshnessRule {
                tier: Tier::Slow,
                ttl_ms: None,
                class: JobClass::Light,
                groupable: false,
                depends_on: &[Component::Fundamentals, Component::Quotes],
            },
        }
    }

    pub fn tier(&self) -> Tier {
        self.default_rule().tier
    }

    pub fn class(&self) -> JobClass {
        self.default_rule().class
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caching tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Never cached, fetched on read; never scheduled in the background
    Fast,
    /// Source data with a short TTL
    Reliable,
    /// Long-lived derived data, rebuilt on dependency change or schema advance
    Slow,
}

/// Concurrency budget a job draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobClass {
    Light,
    Heavy,
}

impl JobClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobClass::Light => "LIGHT",
            JobClass::Heavy => "HEAVY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LIGHT" => Some(JobClass::Light),
            "HEAVY" => Some(JobClass::Heavy),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessRule {
    pub tier: Tier,
    /// None means no time-based expiry
    pub ttl_ms: Option<i64>,
    pub class: JobClass,
    /// Refreshed in bulk under a group key rather than per subject
    pub groupable: bool,
    /// Sources whose refresh invalidates this (Slow tier) component
    pub depends_on: &'static [Component],
}

/// Mapping from component to rule, with TTL overrides
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    ttl_overrides: HashMap<Component, i64>,
    grouping_enabled: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            ttl_overrides: HashMap::new(),
            grouping_enabled: true,
        }
    }
}

impl FreshnessPolicy {
    /// Override the TTL of a Reliable or Slow component. Fast components keep no TTL.
    pub fn with_ttl(mut self, component: Component, ttl_ms: i64) -> Self {
        if component.tier() != Tier::Fast {
            self.ttl_overrides.insert(component, ttl_ms);
        }
        self
    }

    pub fn with_grouping(mut self, enabled: bool) -> Self {
        self.grouping_enabled = enabled;
        self
    }

    pub fn rule(&self, component: Component) -> FreshnessRule {
        let mut rule = component.default_rule();
        if let Some(ttl) = self.ttl_overrides.get(&component) {
            rule.ttl_ms = Some(*ttl);
        }
        if !self.grouping_enabled {
            rule.groupable = false;
        }
        rule
    }

    /// Components the background scheduler is responsible for (Reliable + Slow)
    pub fn scheduled_components(&self) -> impl Iterator<Item = Component> {
        Component::ALL
            .into_iter()
            .filter(|c| c.tier() != Tier::Fast)
    }

    pub fn components_in(&self, tier: Tier) -> impl Iterator<Item = Component> {
        Component::ALL.into_iter().filter(move |c| c.tier() == tier)
    }
}

/// Maps a subject to the key under which groupable components are fetched in bulk
pub trait SubjectGrouper: Send + Sync {
    fn group_key(&self, subject_key: &str) -> String;
}

/// Groups tickers by exchange suffix (`VOD.L` -> `exchange:L`, `AAPL` -> `exchange:US`)
pub struct ExchangeSuffixGrouper;

impl SubjectGrouper for ExchangeSuffixGrouper {
    fn group_key(&self, subject_key: &str) -> String {
        match subject_key.rsplit_once('.') {
            Some((_, suffix)) if !suffix.is_empty() => {
                format!("exchange:{}", suffix.to_ascii_uppercase())
            }
            _ => "exchange:US".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_component_has_exactly_one_tier() {
        for component in Component::ALL {
            let rule = component.default_rule();
            match rule.tier {
                Tier::Fast => assert!(rule.ttl_ms.is_none(), "{component} must have no TTL"),
                Tier::Reliable => assert!(rule.ttl_ms.is_some(), "{component} needs a TTL"),
                Tier::Slow => {}
            }
        }
    }

    #[test]
    fn test_scheduled_components_exclude_fast_tier() {
        let policy = FreshnessPolicy::default();
        let scheduled: Vec<_> = policy.scheduled_components().collect();
        assert_eq!(scheduled.len(), 5);
        assert!(!scheduled.contains(&Component::Quotes));
    }

    #[test]
    fn test_ttl_override_ignored_for_fast_tier() {
        let policy = FreshnessPolicy::default()
            .with_ttl(Component::Quotes, 1_000)
            .with_ttl(Component::Fundamentals, 2_000);
        assert_eq!(policy.rule(Component::Quotes).ttl_ms, None);
        assert_eq!(policy.rule(Component::Fundamentals).ttl_ms, Some(2_000));
    }

    #[test]
    fn test_grouping_can_be_disabled() {
        let policy = FreshnessPolicy::default().with_grouping(false);
        assert!(!policy.rule(Component::Fundamentals).groupable);
    }

    #[test]
    fn test_component_round_trip_names() {
        assert_eq!(Component::parse("filings_documents"), Some(Component::FilingsDocuments));
        assert_eq!(Component::parse("bogus"), None);
    }

    #[test]
    fn test_exchange_suffix_grouper() {
        let grouper = ExchangeSuffixGrouper;
        assert_eq!(grouper.group_key("VOD.L"), "exchange:L");
        assert_eq!(grouper.group_key("shop.to"), "exchange:TO");
        assert_eq!(grouper.group_key("AAPL"), "exchange:US");
        assert_eq!(grouper.group_key("BRK."), "exchange:US");
    }
}
