//! End-to-end replay-driver scenario: loads points through the real
//! pipeline and broadcast hub, with `tokio::time::pause` providing
//! deterministic event-time pacing instead of a high speedup factor over
//! real sleeps.

use std::sync::Arc;

use ais_anomaly_detector::broadcast::BroadcastHub;
use ais_anomaly_detector::config::Config;
use ais_anomaly_detector::cooldown::CooldownStore;
use ais_anomaly_detector::model::AisPoint;
use ais_anomaly_detector::pipeline::Pipeline;
use ais_anomaly_detector::replay::{run_replay, ReplayConfig, ReplayHandle};
use ais_anomaly_detector::store::MemoryStore;
use chrono::{TimeZone, Utc};
use tokio::sync::Mutex;

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

#[tokio::test(start_paused = true)]
async fn paced_replay_advances_virtual_clock_and_fires_a_teleport_alert() {
    let store = Arc::new(MemoryStore::new());
    let cooldown = Arc::new(Mutex::new(CooldownStore::new()));
    let pipeline = Pipeline::new(store.clone(), cooldown, Config::default());
    let hub = BroadcastHub::new(16);
    let mut alerts_rx = hub.subscribe();
    let handle = ReplayHandle::new();

    // 60 event-time seconds apart, one degree of latitude — a teleport per
    // the short tier. At speedup 0.1 that is 600 real seconds of pacing;
    // with the clock paused, `run_replay`'s internal `tokio::time::sleep`
    // calls fast-forward instead of actually waiting.
    let points = vec![pt("1", 0, 40.0, -74.0), pt("1", 60, 41.0, -74.0)];

    let started = tokio::time::Instant::now();
    run_replay(
        points,
        pipeline,
        hub,
        handle.clone(),
        ReplayConfig { speedup: 0.1, batch_size: 1 },
    )
    .await;
    assert_eq!(started.elapsed(), std::time::Duration::from_secs(600));

    let status = handle.status().await;
    assert!(!status.running);
    assert_eq!(status.processed, 2);

    let mut saw_alert = false;
    while let Ok(msg) = alerts_rx.try_recv() {
        if msg.contains("\"kind\":\"alert\"") {
            saw_alert = true;
        }
    }
    assert!(saw_alert, "expected the teleport pair to broadcast an alert envelope");
    assert_eq!(store.alert_count().await, 1);
}
