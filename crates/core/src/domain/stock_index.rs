// Stock Index - per-subject freshness ledger

use super::freshness::{Component, FreshnessRule, Tier};
use super::job::SubjectKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global schema tag for derived data
pub type SchemaVersion = i64;

/// When a component was last refreshed and under which schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStamp {
    pub updated_at: i64, // epoch ms
    pub schema_version: SchemaVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIndexEntry {
    pub subject_key: SubjectKey,
    pub stamps: BTreeMap<Component, ComponentStamp>,
}

/// Why a component needs (or does not need) a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Missing,
    Expired,
    SchemaOutdated,
    DependencyChanged,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

impl StockIndexEntry {
    pub fn new(subject_key: impl Into<String>) -> Self {
        Self {
            subject_key: subject_key.into(),
            stamps: BTreeMap::new(),
        }
    }

    pub fn stamp(&self, component: Component) -> Option<&ComponentStamp> {
        self.stamps.get(&component)
    }

    pub fn last_updated(&self, component: Component) -> Option<i64> {
        self.stamp(component).map(|s| s.updated_at)
    }

    /// True when the component's derived value predates the global schema version
    pub fn schema_outdated(&self, component: Component, global: SchemaVersion) -> bool {
        self.stamp(component)
            .is_some_and(|s| s.schema_version < global)
    }

    /// Evaluate a component against its rule. Never mutates the entry.
    pub fn staleness(
        &self,
        component: Component,
        rule: &FreshnessRule,
        now_millis: i64,
        global: SchemaVersion,
    ) -> Staleness {
        if rule.tier == Tier::Slow && self.schema_outdated(component, global) {
            return Staleness::SchemaOutdated;
        }

        let Some(stamp) = self.stamp(component) else {
            return Staleness::Missing;
        };

        if rule.tier == Tier::Slow {
            let dependency_moved = rule
                .depends_on
                .iter()
                .filter_map(|dep| self.last_updated(*dep))
                .any(|dep_updated| dep_updated > stamp.updated_at);
            if dependency_moved {
                return Staleness::DependencyChanged;
            }
        }

        match rule.ttl_ms {
            Some(ttl) if now_millis - stamp.updated_at >= ttl => Staleness::Expired,
            _ => Staleness::Fresh,
        }
    }
}

/// Staleness of a component for a subject that may have no entry yet
pub fn evaluate(
    entry: Option<&StockIndexEntry>,
    component: Component,
    rule: &FreshnessRule,
    now_millis: i64,
    global: SchemaVersion,
) -> Staleness {
    match entry {
        None => Staleness::Missing,
        Some(e) => e.staleness(component, rule, now_millis, global),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(stamps: &[(Component, i64, SchemaVersion)]) -> StockIndexEntry {
        let mut entry = StockIndexEntry::new("AAPL");
        for (component, at, version) in stamps {
            entry.stamps.insert(
                *component,
                ComponentStamp {
                    updated_at: *at,
                    schema_version: *version,
                },
            );
        }
        entry
    }

    #[test]
    fn test_absent_entry_is_missing() {
        let rule = Component::Fundamentals.default_rule();
        assert_eq!(
            evaluate(None, Component::Fundamentals, &rule, 0, 1),
            Staleness::Missing
        );
    }

    #[test]
    fn test_reliable_ttl_boundary() {
        let rule = Component::Fundamentals.default_rule();
        let ttl = rule.ttl_ms.unwrap();
        let entry = stamped(&[(Component::Fundamentals, 1_000, 1)]);

        assert_eq!(
            entry.staleness(Component::Fundamentals, &rule, 1_000 + ttl - 1, 1),
            Staleness::Fresh
        );
        assert_eq!(
            entry.staleness(Component::Fundamentals, &rule, 1_000 + ttl, 1),
            Staleness::Expired
        );
    }

    #[test]
    fn test_schema_mismatch_wins_over_ttl() {
        let rule = Component::News.default_rule();
        let entry = stamped(&[(Component::News, 1_000, 1)]);
        assert_eq!(
            entry.staleness(Component::News, &rule, 1_001, 2),
            Staleness::SchemaOutdated
        );
    }

    #[test]
    fn test_schema_mismatch_ignored_for_reliable_tier() {
        let rule = Component::FilingsIndex.default_rule();
        let entry = stamped(&[(Component::FilingsIndex, 1_000, 1)]);
        assert_eq!(
            entry.staleness(Component::FilingsIndex, &rule, 1_001, 2),
            Staleness::Fresh
        );
    }

    #[test]
    fn test_slow_component_stale_when_dependency_refreshed() {
        let rule = Component::FilingsDocuments.default_rule();
        let entry = stamped(&[
            (Component::FilingsDocuments, 1_000, 1),
            (Component::FilingsIndex, 2_000, 1),
        ]);
        assert_eq!(
            entry.staleness(Component::FilingsDocuments, &rule, 2_001, 1),
            Staleness::DependencyChanged
        );
    }

    #[test]
    fn test_slow_component_without_ttl_stays_fresh() {
        let rule = Component::Signals.default_rule();
        let entry = stamped(&[
            (Component::Signals, 5_000, 1),
            (Component::Fundamentals, 5_000, 1),
        ]);
        assert_eq!(
            entry.staleness(Component::Signals, &rule, i64::MAX / 2, 1),
            Staleness::Fresh
        );
    }
}
