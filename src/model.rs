//! Core data model: the shapes that flow between loader, track store,
//! rules, cooldown store, and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One AIS position report for a vessel. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AisPoint {
    pub mmsi: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl AisPoint {
    pub fn dt_sec(&self, other: &AisPoint) -> f64 {
        (self.timestamp - other.timestamp).num_milliseconds() as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    New,
    Reviewed,
    Resolved,
    FalsePositive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Teleport,
    TeleportT2,
    TurnRate,
    TurnRateT2,
    PositionInvalid,
    Acceleration,
    HeadingCogConsistency,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Teleport => "TELEPORT",
            RuleType::TeleportT2 => "TELEPORT_T2",
            RuleType::TurnRate => "TURN_RATE",
            RuleType::TurnRateT2 => "TURN_RATE_T2",
            RuleType::PositionInvalid => "POSITION_INVALID",
            RuleType::Acceleration => "ACCELERATION",
            RuleType::HeadingCogConsistency => "HEADING_COG_CONSISTENCY",
        }
    }
}

/// Rule-specific and common evidence fields attached to a fired alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub dt_sec: f64,
    pub distance_m: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_speed_knots: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_rate_deg_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_knots_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    pub p1_lat: f64,
    pub p1_lon: f64,
    pub p1_timestamp: DateTime<Utc>,
    pub p2_lat: f64,
    pub p2_lon: f64,
    pub p2_timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub mmsi: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: u32,
    pub summary: String,
    pub evidence: Evidence,
    pub status: AlertStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Per-MMSI last-seen snapshot, upserted on every processed point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselLatest {
    pub mmsi: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub last_alert_severity: u32,
}

impl VesselLatest {
    pub fn from_point(p: &AisPoint) -> Self {
        Self {
            mmsi: p.mmsi.clone(),
            timestamp: p.timestamp,
            lat: p.lat,
            lon: p.lon,
            sog: p.sog,
            cog: p.cog,
            heading: p.heading,
            last_alert_severity: 0,
        }
    }

    pub fn update_from_point(&mut self, p: &AisPoint) {
        self.timestamp = p.timestamp;
        self.lat = p.lat;
        self.lon = p.lon;
        self.sog = p.sog;
        self.cog = p.cog;
        self.heading = p.heading;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCooldown {
    pub mmsi: String,
    pub rule_type: RuleType,
    pub last_alert_timestamp: DateTime<Utc>,
}

/// Append-only position history row (§6 optional `vessel_positions` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesselPosition {
    pub mmsi: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl From<&AisPoint> for VesselPosition {
    fn from(p: &AisPoint) -> Self {
        Self {
            mmsi: p.mmsi.clone(),
            timestamp: p.timestamp,
            lat: p.lat,
            lon: p.lon,
            sog: p.sog,
            cog: p.cog,
            heading: p.heading,
        }
    }
}
