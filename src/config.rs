//! Detection thresholds and operational configuration (§6 table), loadable
//! from TOML and validated at startup.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub teleport_speed_knots_short: f64,
    pub teleport_speed_knots_medium: f64,
    pub teleport_dt_short_max_sec: f64,
    pub teleport_dt_medium_max_sec: f64,
    pub teleport_dt_long_max_sec: f64,
    pub teleport_suspicious_min_knots: f64,
    pub max_turn_rate_deg_per_sec: f64,
    pub max_turn_rate_high_speed_deg_per_sec: f64,
    pub min_speed_for_turn_check_knots: f64,
    pub min_speed_for_turn_check_low_knots: f64,
    pub turn_rate_dt_min_sec: f64,
    pub turn_rate_suspicious_min_deg_per_sec: f64,
    pub max_accel_knots_per_sec: f64,
    pub sog_implied_speed_diff_threshold_knots: f64,
    pub position_outlier_distance_km: f64,
    pub alert_cooldown_sec: i64,
    pub default_batch_size: usize,
    pub streaming_threshold_mb: f64,
    pub chunk_size: usize,
    pub track_window_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            teleport_speed_knots_short: 60.0,
            teleport_speed_knots_medium: 100.0,
            teleport_dt_short_max_sec: 120.0,
            teleport_dt_medium_max_sec: 1800.0,
            teleport_dt_long_max_sec: 3600.0,
            teleport_suspicious_min_knots: 40.0,
            max_turn_rate_deg_per_sec: 3.0,
            max_turn_rate_high_speed_deg_per_sec: 20.0,
            min_speed_for_turn_check_knots: 10.0,
            min_speed_for_turn_check_low_knots: 3.0,
            turn_rate_dt_min_sec: 2.0,
            turn_rate_suspicious_min_deg_per_sec: 1.0,
            max_accel_knots_per_sec: 5.0,
            sog_implied_speed_diff_threshold_knots: 20.0,
            position_outlier_distance_km: 1000.0,
            alert_cooldown_sec: 300,
            default_batch_size: 100,
            streaming_threshold_mb: 50.0,
            chunk_size: 10_000,
            track_window_size: 5,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Every threshold must be positive, finite, and within a sane upper bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive_bounded = [
            ("teleport_speed_knots_short", self.teleport_speed_knots_short, 1000.0),
            ("teleport_speed_knots_medium", self.teleport_speed_knots_medium, 1000.0),
            ("teleport_suspicious_min_knots", self.teleport_suspicious_min_knots, 1000.0),
            ("max_turn_rate_deg_per_sec", self.max_turn_rate_deg_per_sec, 360.0),
            ("max_turn_rate_high_speed_deg_per_sec", self.max_turn_rate_high_speed_deg_per_sec, 360.0),
            ("min_speed_for_turn_check_knots", self.min_speed_for_turn_check_knots, 1000.0),
            ("min_speed_for_turn_check_low_knots", self.min_speed_for_turn_check_low_knots, 1000.0),
            ("turn_rate_suspicious_min_deg_per_sec", self.turn_rate_suspicious_min_deg_per_sec, 360.0),
            ("max_accel_knots_per_sec", self.max_accel_knots_per_sec, 1000.0),
            ("sog_implied_speed_diff_threshold_knots", self.sog_implied_speed_diff_threshold_knots, 1000.0),
            ("position_outlier_distance_km", self.position_outlier_distance_km, 40_075.0),
            ("streaming_threshold_mb", self.streaming_threshold_mb, 100_000.0),
        ];
        for (name, value, max) in positive_bounded {
            if !(value.is_finite() && value > 0.0 && value <= max) {
                return Err(ConfigError::OutOfRange {
                    field: name,
                    value,
                });
            }
        }

        let positive_time_bounded = [
            ("teleport_dt_short_max_sec", self.teleport_dt_short_max_sec),
            ("teleport_dt_medium_max_sec", self.teleport_dt_medium_max_sec),
            ("teleport_dt_long_max_sec", self.teleport_dt_long_max_sec),
            ("turn_rate_dt_min_sec", self.turn_rate_dt_min_sec),
        ];
        for (name, value) in positive_time_bounded {
            if !(value.is_finite() && value > 0.0 && value <= 86_400.0) {
                return Err(ConfigError::OutOfRange { field: name, value });
            }
        }

        if !(self.alert_cooldown_sec >= 0 && self.alert_cooldown_sec <= 86_400) {
            return Err(ConfigError::OutOfRange {
                field: "alert_cooldown_sec",
                value: self.alert_cooldown_sec as f64,
            });
        }

        if self.default_batch_size == 0 || self.default_batch_size > 100_000 {
            return Err(ConfigError::OutOfRange {
                field: "default_batch_size",
                value: self.default_batch_size as f64,
            });
        }
        if self.chunk_size == 0 || self.chunk_size > 100_000 {
            return Err(ConfigError::OutOfRange {
                field: "chunk_size",
                value: self.chunk_size as f64,
            });
        }
        if self.track_window_size < 2 {
            return Err(ConfigError::OutOfRange {
                field: "track_window_size",
                value: self.track_window_size as f64,
            });
        }

        if !(self.teleport_dt_short_max_sec < self.teleport_dt_medium_max_sec
            && self.teleport_dt_medium_max_sec <= self.teleport_dt_long_max_sec)
        {
            return Err(ConfigError::OutOfRange {
                field: "teleport_dt_*_max_sec ordering",
                value: 0.0,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.max_turn_rate_deg_per_sec = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_streaming_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.streaming_threshold_mb = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_cooldown_rejected() {
        let mut cfg = Config::default();
        cfg.alert_cooldown_sec = -1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg = Config::from_toml_str("alert_cooldown_sec = 60\n").unwrap();
        assert_eq!(cfg.alert_cooldown_sec, 60);
        assert_eq!(cfg.default_batch_size, 100);
    }
}
