//! Pipeline orchestration (§4.F): for each incoming point, update latest,
//! update track, run rules in order, apply cooldown, persist, update max
//! severity.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::cooldown::CooldownStore;
use crate::error::StoreError;
use crate::model::{Alert, AlertCooldown, AlertStatus, VesselPosition};
use crate::model::AisPoint;
use crate::rules::dispatch_table;
use crate::store::Store;
use crate::track_store::TrackStore;

pub struct Pipeline {
    track_store: TrackStore,
    cooldown: Arc<Mutex<CooldownStore>>,
    store: Arc<dyn Store>,
    config: Config,
}

impl Pipeline {
    /// `cooldown` is process-wide (§5): concurrent sessions share it, and
    /// its "update if newer" semantics make that safe without further
    /// coordination.
    pub fn new(store: Arc<dyn Store>, cooldown: Arc<Mutex<CooldownStore>>, config: Config) -> Self {
        Self {
            track_store: TrackStore::new(config.track_window_size),
            cooldown,
            store,
            config,
        }
    }

    /// Processes one point: pushes it into the track store, upserts
    /// `VesselLatest`, runs the seven rules in order, applies cooldown
    /// suppression, persists fired alerts, and returns them.
    ///
    /// A rule panic-equivalent (an `Err` surfaced by a rule, were one to
    /// return `Result`) would be caught and skipped per §7(iii); these
    /// rules are pure and infallible by construction, so the only failure
    /// mode modeled here is persistence (§7 classes iv/v).
    pub async fn process_point(&mut self, point: AisPoint) -> Result<Vec<Alert>, StoreError> {
        let mmsi = point.mmsi.clone();
        let accepted = self.track_store.push(point.clone());
        if !accepted {
            debug!(mmsi, "ignored non-increasing-timestamp point");
            return Ok(Vec::new());
        }

        let mut vessel_latest = match self.store.get_vessel_latest(&mmsi).await? {
            Some(mut v) => {
                v.update_from_point(&point);
                v
            }
            None => crate::model::VesselLatest::from_point(&point),
        };
        self.store.upsert_vessel_latest(vessel_latest.clone()).await?;
        self.store.append_position(VesselPosition::from(&point)).await?;

        let mut fired = Vec::new();

        let pair = self.track_store.window(&mmsi).and_then(|w| w.last_pair());
        if let Some((p1, p2)) = pair {
            for rule in dispatch_table() {
                let Some(firing) = rule(&p1, &p2, &self.config) else {
                    continue;
                };

                let allowed = self.cooldown.lock().await.allow(
                    &mmsi,
                    firing.rule_type,
                    p2.timestamp,
                    self.config.alert_cooldown_sec,
                );
                if !allowed {
                    debug!(mmsi, rule = firing.rule_type.as_str(), "suppressed by cooldown");
                    continue;
                }

                let alert = Alert {
                    id: 0,
                    timestamp: p2.timestamp,
                    mmsi: mmsi.clone(),
                    rule_type: firing.rule_type,
                    severity: firing.severity,
                    summary: firing.summary,
                    evidence: firing.evidence,
                    status: AlertStatus::New,
                    notes: None,
                };

                match self.persist_alert(alert, &mut vessel_latest).await {
                    Ok(alert) => fired.push(alert),
                    Err(e) => {
                        warn!(mmsi, error = %e, "failed to persist alert, this point only");
                        return Err(e);
                    }
                }
            }
        }

        Ok(fired)
    }

    async fn persist_alert(
        &self,
        alert: Alert,
        vessel_latest: &mut crate::model::VesselLatest,
    ) -> Result<Alert, StoreError> {
        self.store
            .put_cooldown(AlertCooldown {
                mmsi: alert.mmsi.clone(),
                rule_type: alert.rule_type,
                last_alert_timestamp: alert.timestamp,
            })
            .await?;

        let stored = self.store.insert_alert(alert).await?;

        vessel_latest.last_alert_severity = vessel_latest.last_alert_severity.max(stored.severity);
        self.store.upsert_vessel_latest(vessel_latest.clone()).await?;

        Ok(stored)
    }
}

/// Used by `rule_type` lookups in tests/ambient code paths that need the
/// current wall clock outside of a point's own timestamp (e.g. cooldown
/// purging from `main.rs`).
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleType;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn pt(mmsi: &str, t: i64, lat: f64, lon: f64) -> AisPoint {
        AisPoint {
            mmsi: mmsi.to_string(),
            timestamp: Utc.timestamp_opt(t, 0).unwrap(),
            lat,
            lon,
            sog: None,
            cog: None,
            heading: None,
        }
    }

    fn new_cooldown() -> Arc<Mutex<CooldownStore>> {
        Arc::new(Mutex::new(CooldownStore::new()))
    }

    #[tokio::test]
    async fn processing_a_point_upserts_vessel_latest() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = Pipeline::new(store.clone(), new_cooldown(), Config::default());
        pipeline.process_point(pt("1", 0, 40.0, -74.0)).await.unwrap();
        let v = store.get_vessel_latest("1").await.unwrap().unwrap();
        assert_eq!(v.timestamp.timestamp(), 0);
    }

    #[tokio::test]
    async fn teleport_pair_fires_one_alert() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = Pipeline::new(store.clone(), new_cooldown(), Config::default());
        pipeline.process_point(pt("1", 0, 40.0, -74.0)).await.unwrap();
        let alerts = pipeline.process_point(pt("1", 60, 41.0, -74.0)).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_type, RuleType::Teleport);
        assert_eq!(store.alert_count().await, 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_second_identical_trigger() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = Pipeline::new(store.clone(), new_cooldown(), Config::default());
        pipeline.process_point(pt("1", 0, 40.0, -74.0)).await.unwrap();
        pipeline.process_point(pt("1", 60, 41.0, -74.0)).await.unwrap();
        // second teleport-triggering pair, 60s later in event time (< 300s cooldown)
        pipeline.process_point(pt("1", 120, 42.0, -74.0)).await.unwrap();
        assert_eq!(store.alert_count().await, 1);
    }

    #[tokio::test]
    async fn last_alert_severity_is_monotonically_non_decreasing() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = Pipeline::new(store.clone(), new_cooldown(), Config::default());
        pipeline.process_point(pt("1", 0, 40.0, -74.0)).await.unwrap();
        pipeline.process_point(pt("1", 60, 41.0, -74.0)).await.unwrap();
        let v1 = store.get_vessel_latest("1").await.unwrap().unwrap();
        assert!(v1.last_alert_severity > 0);

        pipeline.process_point(pt("1", 4000, 41.001, -74.0)).await.unwrap();
        let v2 = store.get_vessel_latest("1").await.unwrap().unwrap();
        assert!(v2.last_alert_severity >= v1.last_alert_severity);
    }
}
