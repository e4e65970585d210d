//! Seven pure detection rules (§4.D), dispatched in a fixed order (§4.F).
//!
//! Each rule is `(p1, p2, cfg) -> Option<RuleFiring>`. Adding a rule means
//! appending to `dispatch_table`; no subclassing.

use crate::config::Config;
use crate::geo::{haversine_m, heading_delta_deg, implied_speed_knots};
use crate::model::{Evidence, RuleType};
use crate::model::AisPoint;

/// What a rule produces before the pipeline assigns an id/status and
/// checks it against the cooldown store.
#[derive(Debug, Clone)]
pub struct RuleFiring {
    pub rule_type: RuleType,
    pub severity: u32,
    pub summary: String,
    pub evidence: Evidence,
}

fn base_evidence(p1: &AisPoint, p2: &AisPoint, dt: f64) -> Evidence {
    Evidence {
        dt_sec: dt,
        distance_m: haversine_m(p1.lat, p1.lon, p2.lat, p2.lon),
        p1_lat: p1.lat,
        p1_lon: p1.lon,
        p1_timestamp: p1.timestamp,
        p2_lat: p2.lat,
        p2_lon: p2.lon,
        p2_timestamp: p2.timestamp,
        ..Default::default()
    }
}

/// 511 is the AIS "not available" sentinel; loader already normalizes it
/// to `None`, so valid heading here only ever means `Some`.
fn is_valid_heading(h: Option<f64>) -> bool {
    matches!(h, Some(v) if v != 511.0)
}

fn floor_u32(x: f64) -> u32 {
    x.floor().max(0.0) as u32
}

// ── R1: TELEPORT ────────────────────────────────────────────────────────────

pub fn rule_teleport(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if dt <= 0.0 {
        return None;
    }
    let sp = implied_speed_knots(p1.lat, p1.lon, p2.lat, p2.lon, dt)?;

    let (_threshold, tier, severity) = if dt <= cfg.teleport_dt_short_max_sec {
        let thr = cfg.teleport_speed_knots_short;
        if sp <= thr {
            return None;
        }
        (thr, "short", floor_u32(100.0 * (sp - thr) / thr).min(100))
    } else if dt <= cfg.teleport_dt_medium_max_sec {
        let thr = cfg.teleport_speed_knots_medium;
        if sp <= thr {
            return None;
        }
        (thr, "medium", floor_u32(100.0 * (sp - thr) / thr).min(100))
    } else if dt <= cfg.teleport_dt_long_max_sec {
        let thr = cfg.teleport_speed_knots_medium;
        if sp <= 2.0 * thr {
            return None;
        }
        (thr, "long_gap", 30)
    } else {
        return None;
    };

    let mut evidence = base_evidence(p1, p2, dt);
    evidence.implied_speed_knots = Some(sp);
    evidence.tier = Some(tier.to_string());

    Some(RuleFiring {
        rule_type: RuleType::Teleport,
        severity,
        summary: format!("implausible displacement: {sp:.1} kn implied ({tier} gap)"),
        evidence,
    })
}

// ── R2: TELEPORT_T2 ─────────────────────────────────────────────────────────

pub fn rule_teleport_t2(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if dt <= 0.0 || dt > cfg.teleport_dt_medium_max_sec {
        return None;
    }
    let sp = implied_speed_knots(p1.lat, p1.lon, p2.lat, p2.lon, dt)?;

    let (low, high, tier) = if dt <= cfg.teleport_dt_short_max_sec {
        (cfg.teleport_suspicious_min_knots, cfg.teleport_speed_knots_short, "short")
    } else {
        (cfg.teleport_speed_knots_short, cfg.teleport_speed_knots_medium, "medium")
    };

    if !(sp > low && sp < high) {
        return None;
    }

    let severity = 20 + floor_u32(40.0 * (sp - low) / (high - low));

    let mut evidence = base_evidence(p1, p2, dt);
    evidence.implied_speed_knots = Some(sp);
    evidence.tier = Some(tier.to_string());

    Some(RuleFiring {
        rule_type: RuleType::TeleportT2,
        severity,
        summary: format!("suspicious displacement: {sp:.1} kn implied ({tier} gap)"),
        evidence,
    })
}

// ── angular signal selection shared by R3/R4 ────────────────────────────────

fn select_angle_delta(p1: &AisPoint, p2: &AisPoint) -> Option<f64> {
    let heading_ok = is_valid_heading(p1.heading) && is_valid_heading(p2.heading);
    let cog_ok = p1.cog.is_some() && p2.cog.is_some();

    if heading_ok && cog_ok {
        let heading_change = heading_delta_deg(p1.heading.unwrap(), p2.heading.unwrap());
        let cog_change = heading_delta_deg(p1.cog.unwrap(), p2.cog.unwrap());
        if heading_change > 0.1 || cog_change < 0.1 {
            Some(heading_change)
        } else {
            Some(cog_change)
        }
    } else if heading_ok {
        Some(heading_delta_deg(p1.heading.unwrap(), p2.heading.unwrap()))
    } else if cog_ok {
        Some(heading_delta_deg(p1.cog.unwrap(), p2.cog.unwrap()))
    } else {
        None
    }
}

fn effective_speed(p1: &AisPoint, p2: &AisPoint, dt: f64) -> Option<f64> {
    p2.sog.or_else(|| implied_speed_knots(p1.lat, p1.lon, p2.lat, p2.lon, dt))
}

// ── R3: TURN_RATE ────────────────────────────────────────────────────────────

pub fn rule_turn_rate(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if dt < cfg.turn_rate_dt_min_sec {
        return None;
    }
    let angle = select_angle_delta(p1, p2)?;
    let speed = effective_speed(p1, p2, dt)?;

    if speed < cfg.min_speed_for_turn_check_low_knots {
        return None;
    }
    // Low-speed tier uses a fixed 4.5 deg/s threshold (§4.D R3); the
    // normal tier uses the configurable `max_turn_rate_deg_per_sec`.
    const LOW_SPEED_TIER_THRESHOLD: f64 = 4.5;
    let (threshold, cap) = if speed < cfg.min_speed_for_turn_check_knots {
        (LOW_SPEED_TIER_THRESHOLD, 50u32)
    } else {
        (cfg.max_turn_rate_deg_per_sec, 100u32)
    };

    let rate = angle / dt;
    if rate <= threshold {
        return None;
    }
    let severity = floor_u32(cap as f64 * (rate - threshold) / threshold).min(cap);

    let mut evidence = base_evidence(p1, p2, dt);
    evidence.turn_rate_deg_per_sec = Some(rate);

    Some(RuleFiring {
        rule_type: RuleType::TurnRate,
        severity,
        summary: format!("implausible turn rate: {rate:.2} deg/s at {speed:.1} kn"),
        evidence,
    })
}

// ── R4: TURN_RATE_T2 ─────────────────────────────────────────────────────────

pub fn rule_turn_rate_t2(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if dt < cfg.turn_rate_dt_min_sec {
        return None;
    }
    let angle = select_angle_delta(p1, p2)?;
    let speed = effective_speed(p1, p2, dt)?;
    if speed < cfg.min_speed_for_turn_check_low_knots {
        return None;
    }

    let rate = angle / dt;
    let low = cfg.turn_rate_suspicious_min_deg_per_sec;
    let high = cfg.max_turn_rate_deg_per_sec;
    if !(rate > low && rate < high) {
        return None;
    }

    let severity = 15 + floor_u32(35.0 * (rate - low) / (high - low));

    let mut evidence = base_evidence(p1, p2, dt);
    evidence.turn_rate_deg_per_sec = Some(rate);

    Some(RuleFiring {
        rule_type: RuleType::TurnRateT2,
        severity,
        summary: format!("suspicious turn rate: {rate:.2} deg/s at {speed:.1} kn"),
        evidence,
    })
}

// ── R5: POSITION_INVALID ─────────────────────────────────────────────────────

pub fn rule_position_invalid(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if dt <= 0.0 {
        return None;
    }
    let mut evidence = base_evidence(p1, p2, dt);

    if !(-90.0..=90.0).contains(&p2.lat) || !(-180.0..=180.0).contains(&p2.lon) {
        return Some(RuleFiring {
            rule_type: RuleType::PositionInvalid,
            severity: 100,
            summary: format!("out-of-range coordinates: lat={:.4} lon={:.4}", p2.lat, p2.lon),
            evidence,
        });
    }

    if p2.lat.abs() < 0.001 && p2.lon.abs() < 0.001 {
        return Some(RuleFiring {
            rule_type: RuleType::PositionInvalid,
            severity: 100,
            summary: "null-island position (0, 0)".to_string(),
            evidence,
        });
    }

    if p1.lat == p2.lat && p1.lon == p2.lon && dt > 60.0 && p2.sog.is_some_and(|s| s > 1.0) {
        return Some(RuleFiring {
            rule_type: RuleType::PositionInvalid,
            severity: 70,
            summary: "stuck position while reportedly underway".to_string(),
            evidence,
        });
    }

    let distance_km = evidence.distance_m / 1000.0;
    if distance_km >= cfg.position_outlier_distance_km {
        if let Some(sp) = implied_speed_knots(p1.lat, p1.lon, p2.lat, p2.lon, dt) {
            if sp > 1000.0 {
                evidence.implied_speed_knots = Some(sp);
                return Some(RuleFiring {
                    rule_type: RuleType::PositionInvalid,
                    severity: 90,
                    summary: format!("extreme displacement: {distance_km:.0} km"),
                    evidence,
                });
            }
        }
    }

    None
}

// ── R6: ACCELERATION ─────────────────────────────────────────────────────────

pub fn rule_acceleration(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if !(dt > 0.0 && dt <= 300.0) {
        return None;
    }

    let mut evidence = base_evidence(p1, p2, dt);

    if let Some(sog) = p2.sog {
        if let Some(implied) = implied_speed_knots(p1.lat, p1.lon, p2.lat, p2.lon, dt) {
            let diff = (implied - sog).abs();
            if diff > cfg.sog_implied_speed_diff_threshold_knots {
                evidence.implied_speed_knots = Some(implied);
                let severity = floor_u32(
                    100.0 * diff / cfg.sog_implied_speed_diff_threshold_knots,
                )
                .min(100);
                return Some(RuleFiring {
                    rule_type: RuleType::Acceleration,
                    severity,
                    summary: format!("SOG/implied-speed mismatch: {diff:.1} kn"),
                    evidence,
                });
            }
            // fall through to the sog-vs-sog check below only if no diff alert fired
        }
    }

    if let (Some(sog1), Some(sog2)) = (p1.sog, p2.sog) {
        let accel = (sog2 - sog1).abs() / dt;
        if accel > cfg.max_accel_knots_per_sec {
            evidence.acceleration_knots_per_sec = Some(accel);
            let severity = floor_u32(100.0 * accel / cfg.max_accel_knots_per_sec).min(100);
            return Some(RuleFiring {
                rule_type: RuleType::Acceleration,
                severity,
                summary: format!("implausible acceleration: {accel:.2} kn/s"),
                evidence,
            });
        }
    }

    None
}

// ── R7: HEADING_COG_CONSISTENCY ──────────────────────────────────────────────

pub fn rule_heading_cog_consistency(p1: &AisPoint, p2: &AisPoint, cfg: &Config) -> Option<RuleFiring> {
    let dt = p2.dt_sec(p1);
    if !(dt > 0.0 && dt <= 10.0) {
        return None;
    }
    let speed = effective_speed(p1, p2, dt)?;
    if speed < 15.0 {
        return None;
    }

    let heading_delta = if is_valid_heading(p1.heading) && is_valid_heading(p2.heading) {
        Some(heading_delta_deg(p1.heading.unwrap(), p2.heading.unwrap()))
    } else {
        None
    };
    let cog_delta = match (p1.cog, p2.cog) {
        (Some(c1), Some(c2)) => Some(heading_delta_deg(c1, c2)),
        _ => None,
    };

    let larger = match (heading_delta, cog_delta) {
        (Some(h), Some(c)) => h.max(c),
        (Some(h), None) => h,
        (None, Some(c)) => c,
        (None, None) => return None,
    };

    let rate = larger / dt;
    if rate <= cfg.max_turn_rate_high_speed_deg_per_sec {
        return None;
    }

    let severity = floor_u32(
        100.0 * (rate - cfg.max_turn_rate_high_speed_deg_per_sec)
            / cfg.max_turn_rate_high_speed_deg_per_sec,
    )
    .min(100);

    let mut evidence = base_evidence(p1, p2, dt);
    evidence.turn_rate_deg_per_sec = Some(rate);

    Some(RuleFiring {
        rule_type: RuleType::HeadingCogConsistency,
        severity,
        summary: format!("heading/COG inconsistent at speed: rate {rate:.2} deg/s"),
        evidence,
    })
}

/// Fixed dispatch order (§4.D / §4.F): appending a rule means adding a row
/// here, never subclassing.
pub fn dispatch_table() -> Vec<fn(&AisPoint, &AisPoint, &Config) -> Option<RuleFiring>> {
    vec![
        rule_teleport,
        rule_teleport_t2,
        rule_turn_rate,
        rule_turn_rate_t2,
        rule_position_invalid,
        rule_acceleration,
        rule_heading_cog_consistency,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pt(t: i64, lat: f64, lon: f64, sog: Option<f64>, cog: Option<f64>, heading: Option<f64>) -> AisPoint {
        AisPoint {
            mmsi: "123456789".to_string(),
            timestamp: Utc.timestamp_opt(t, 0).unwrap(),
            lat,
            lon,
            sog,
            cog,
            heading,
        }
    }

    #[test]
    fn teleport_short_fires_with_severity_100() {
        let p1 = pt(0, 40.0, -74.0, None, None, None);
        let p2 = pt(60, 41.0, -74.0, None, None, None);
        let cfg = Config::default();
        let firing = rule_teleport(&p1, &p2, &cfg).expect("should fire");
        assert_eq!(firing.rule_type, RuleType::Teleport);
        assert_eq!(firing.severity, 100);
        assert_eq!(firing.evidence.tier.as_deref(), Some("short"));
    }

    #[test]
    fn no_fire_below_band() {
        let p1 = pt(0, 40.0, -74.0, None, None, None);
        let p2 = pt(60, 40.001, -74.0, None, None, None);
        let cfg = Config::default();
        assert!(rule_teleport(&p1, &p2, &cfg).is_none());
        assert!(rule_teleport_t2(&p1, &p2, &cfg).is_none());
    }

    #[test]
    fn null_island_fires_severity_100() {
        let p1 = pt(0, 10.0, 10.0, None, None, None);
        let p2 = pt(10, 0.0, 0.0, None, None, None);
        let cfg = Config::default();
        let firing = rule_position_invalid(&p1, &p2, &cfg).expect("should fire");
        assert_eq!(firing.severity, 100);
    }

    #[test]
    fn turn_rate_low_speed_no_fire() {
        let p1 = pt(0, 40.0, -74.0, Some(1.0), None, Some(0.0));
        let p2 = pt(10, 40.0, -74.0, Some(1.0), None, Some(45.0));
        let cfg = Config::default();
        assert!(rule_turn_rate(&p1, &p2, &cfg).is_none());
    }

    #[test]
    fn heading_vs_cog_selection_uses_cog_when_heading_stuck() {
        let p1 = pt(0, 40.0, -74.0, Some(20.0), Some(0.0), Some(90.0));
        let p2 = pt(10, 40.0, -74.0, Some(20.0), Some(90.0), Some(90.0));
        let cfg = Config::default();
        let firing = rule_turn_rate(&p1, &p2, &cfg).expect("should fire");
        assert!((firing.evidence.turn_rate_deg_per_sec.unwrap() - 9.0).abs() < 1e-6);
    }

    #[test]
    fn rules_short_circuit_when_dt_non_positive() {
        let p1 = pt(10, 40.0, -74.0, Some(50.0), Some(0.0), Some(0.0));
        let p2 = pt(0, 41.0, -74.0, Some(50.0), Some(0.0), Some(0.0));
        let cfg = Config::default();
        for rule in dispatch_table() {
            assert!(rule(&p1, &p2, &cfg).is_none());
        }
    }

    #[test]
    fn acceleration_prefers_sog_mismatch_over_raw_accel() {
        let p1 = pt(0, 40.0, -74.0, Some(5.0), None, None);
        let p2 = pt(10, 40.02, -74.0, Some(10.0), None, None);
        let cfg = Config::default();
        let firing = rule_acceleration(&p1, &p2, &cfg);
        if let Some(f) = firing {
            assert_eq!(f.rule_type, RuleType::Acceleration);
        }
    }
}
