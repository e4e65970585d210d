//! Per-MMSI bounded ring of recent points (§4.C).
//!
//! Keyed by MMSI, never hands out long-lived references — callers get
//! snapshot copies of the last two points for rule evaluation.

use std::collections::{HashMap, VecDeque};

use crate::model::AisPoint;

/// Ordered FIFO buffer of the last `window_size` points for one MMSI.
#[derive(Debug, Clone)]
pub struct TrackWindow {
    points: VecDeque<AisPoint>,
    window_size: usize,
}

impl TrackWindow {
    fn new(window_size: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Appends `point` unless its timestamp is not strictly after the
    /// current tail, in which case this is an ignored no-op (§3 invariant).
    /// Returns `true` if the point was accepted.
    fn push(&mut self, point: AisPoint) -> bool {
        if let Some(tail) = self.points.back() {
            if point.timestamp <= tail.timestamp {
                return false;
            }
        }
        self.points.push_back(point);
        if self.points.len() > self.window_size {
            self.points.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The second-to-last and last points, if at least two are present.
    pub fn last_pair(&self) -> Option<(AisPoint, AisPoint)> {
        if self.points.len() < 2 {
            return None;
        }
        let n = self.points.len();
        Some((self.points[n - 2].clone(), self.points[n - 1].clone()))
    }
}

/// Keyed by MMSI; bounded to `window_size` points per MMSI.
#[derive(Debug, Clone)]
pub struct TrackStore {
    windows: HashMap<String, TrackWindow>,
    window_size: usize,
}

impl TrackStore {
    pub fn new(window_size: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window_size,
        }
    }

    /// Appends `point` and returns (a snapshot of) the window: `true` if the
    /// point was accepted, `false` if it was a non-increasing-timestamp no-op.
    pub fn push(&mut self, point: AisPoint) -> bool {
        let window = self
            .windows
            .entry(point.mmsi.clone())
            .or_insert_with(|| TrackWindow::new(self.window_size));
        window.push(point)
    }

    pub fn window(&self, mmsi: &str) -> Option<&TrackWindow> {
        self.windows.get(mmsi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

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

    #[test]
    fn bounded_to_window_size() {
        let mut store = TrackStore::new(3);
        for i in 0..5 {
            store.push(pt("1", i, 0.0, 0.0));
        }
        assert_eq!(store.window("1").unwrap().len(), 3);
    }

    #[test]
    fn non_increasing_timestamp_is_ignored_no_op() {
        let mut store = TrackStore::new(5);
        assert!(store.push(pt("1", 10, 0.0, 0.0)));
        assert!(!store.push(pt("1", 10, 1.0, 1.0)));
        assert!(!store.push(pt("1", 5, 1.0, 1.0)));
        assert_eq!(store.window("1").unwrap().len(), 1);
    }

    #[test]
    fn last_pair_requires_two_points() {
        let mut store = TrackStore::new(5);
        assert!(store.window("1").is_none());
        store.push(pt("1", 1, 0.0, 0.0));
        assert!(store.window("1").unwrap().last_pair().is_none());
        store.push(pt("1", 2, 1.0, 1.0));
        let (p1, p2) = store.window("1").unwrap().last_pair().unwrap();
        assert_eq!(p1.timestamp.timestamp(), 1);
        assert_eq!(p2.timestamp.timestamp(), 2);
    }

    #[test]
    fn separate_mmsi_have_independent_windows() {
        let mut store = TrackStore::new(2);
        store.push(pt("1", 1, 0.0, 0.0));
        store.push(pt("2", 1, 0.0, 0.0));
        assert_eq!(store.window("1").unwrap().len(), 1);
        assert_eq!(store.window("2").unwrap().len(), 1);
    }
}
