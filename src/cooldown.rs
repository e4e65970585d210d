//! Per-(MMSI, rule-type) cooldown store (§4.E): suppresses repeat alerts
//! within `alert_cooldown_sec` of event time. Process-wide, "update if
//! newer" semantics so concurrent sessions can share it safely.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::RuleType;

#[derive(Debug, Clone, Default)]
pub struct CooldownStore {
    last_fired: HashMap<(String, RuleType), DateTime<Utc>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an alert at `timestamp` for `(mmsi, rule_type)` is
    /// allowed (updates the stored timestamp as a side effect); `false` if
    /// it falls within the cooldown window and must be suppressed.
    pub fn allow(&mut self, mmsi: &str, rule_type: RuleType, timestamp: DateTime<Utc>, cooldown_sec: i64) -> bool {
        let key = (mmsi.to_string(), rule_type);
        match self.last_fired.get(&key) {
            Some(prev) => {
                let delta = (timestamp - *prev).num_seconds();
                if delta < cooldown_sec {
                    false
                } else {
                    self.last_fired.insert(key, timestamp);
                    true
                }
            }
            None => {
                self.last_fired.insert(key, timestamp);
                true
            }
        }
    }

    pub fn last_alert_timestamp(&self, mmsi: &str, rule_type: RuleType) -> Option<DateTime<Utc>> {
        self.last_fired.get(&(mmsi.to_string(), rule_type)).copied()
    }

    /// Removes entries whose `last_alert_timestamp` is older than `cutoff`.
    /// Scheduling this periodically is an external maintenance concern; the
    /// operation itself lives here so it can be unit-tested and called
    /// on demand.
    pub fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.last_fired.len();
        self.last_fired.retain(|_, ts| *ts >= cutoff);
        before - self.last_fired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_alert_always_allowed() {
        let mut store = CooldownStore::new();
        let t = Utc.timestamp_opt(1000, 0).unwrap();
        assert!(store.allow("1", RuleType::Teleport, t, 300));
    }

    #[test]
    fn suppresses_within_cooldown_window() {
        let mut store = CooldownStore::new();
        let t0 = Utc.timestamp_opt(1000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1060, 0).unwrap(); // +60s, < 300s cooldown
        assert!(store.allow("1", RuleType::Teleport, t0, 300));
        assert!(!store.allow("1", RuleType::Teleport, t1, 300));
    }

    #[test]
    fn allows_after_cooldown_elapses() {
        let mut store = CooldownStore::new();
        let t0 = Utc.timestamp_opt(1000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1400, 0).unwrap(); // +400s
        assert!(store.allow("1", RuleType::Teleport, t0, 300));
        assert!(store.allow("1", RuleType::Teleport, t1, 300));
    }

    #[test]
    fn different_rule_types_are_independent() {
        let mut store = CooldownStore::new();
        let t = Utc.timestamp_opt(1000, 0).unwrap();
        assert!(store.allow("1", RuleType::Teleport, t, 300));
        assert!(store.allow("1", RuleType::TurnRate, t, 300));
    }

    #[test]
    fn purge_removes_old_entries_only() {
        let mut store = CooldownStore::new();
        let old = Utc.timestamp_opt(0, 0).unwrap();
        let recent = Utc.timestamp_opt(1_000_000, 0).unwrap();
        store.allow("1", RuleType::Teleport, old, 300);
        store.allow("2", RuleType::Teleport, recent, 300);
        let removed = store.purge_older_than(Utc.timestamp_opt(500_000, 0).unwrap());
        assert_eq!(removed, 1);
        assert!(store.last_alert_timestamp("1", RuleType::Teleport).is_none());
        assert!(store.last_alert_timestamp("2", RuleType::Teleport).is_some());
    }
}
