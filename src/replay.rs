//! Replay driver (§4.G): paces a loaded or streamed point sequence by
//! event-time delta / speedup, feeds each point to the pipeline, and
//! broadcasts alerts and progress ticks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::broadcast::{BroadcastHub, BroadcastMessage};
use crate::error::StoreError;
use crate::model::AisPoint;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStatus {
    pub running: bool,
    pub processed: u64,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub stop_requested: bool,
}

/// Shared handle a caller uses to observe and cancel an in-flight replay.
#[derive(Clone)]
pub struct ReplayHandle {
    status: Arc<RwLock<ReplayStatus>>,
    stop: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
}

impl ReplayHandle {
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(ReplayStatus::default())),
            stop: Arc::new(AtomicBool::new(false)),
            processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub async fn status(&self) -> ReplayStatus {
        let mut s = self.status.read().await.clone();
        s.processed = self.processed.load(Ordering::Relaxed);
        s.stop_requested = self.stop.load(Ordering::SeqCst);
        s
    }

    /// Marks the handle as running before the replay task has been polled,
    /// so a concurrent start sees an accurate gate immediately after this
    /// handle is registered.
    pub async fn mark_starting(&self) {
        self.status.write().await.running = true;
    }
}

impl Default for ReplayHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReplayConfig {
    pub speedup: f64,
    pub batch_size: usize,
}

/// Drives `points` (already loaded or streamed-and-flattened, in ascending
/// timestamp order) through `pipeline`, pacing by event time and
/// broadcasting every `batch_size` successfully processed points.
pub async fn run_replay(
    points: Vec<AisPoint>,
    mut pipeline: Pipeline,
    hub: BroadcastHub,
    handle: ReplayHandle,
    cfg: ReplayConfig,
) {
    {
        let mut status = handle.status.write().await;
        status.running = true;
        status.stop_requested = false;
    }
    handle.processed.store(0, Ordering::Relaxed);

    let speedup = cfg.speedup.max(0.1);
    let mut prev_timestamp: Option<DateTime<Utc>> = None;
    let mut batch_alerts = Vec::new();
    let mut batch_count = 0usize;
    let mut errors = 0u64;

    for point in points {
        if handle.stop.load(Ordering::SeqCst) {
            info!("replay cancelled, flushing pending broadcasts");
            break;
        }

        if let Some(prev) = prev_timestamp {
            let delta = (point.timestamp - prev).num_milliseconds() as f64 / 1000.0;
            let delta = delta.max(0.0);
            let sleep_secs = delta / speedup;
            if sleep_secs > 0.0 {
                tokio::time::sleep(std::time::Duration::from_secs_f64(sleep_secs)).await;
            }
        }
        prev_timestamp = Some(point.timestamp);

        match pipeline.process_point(point.clone()).await {
            Ok(alerts) => {
                handle.processed.fetch_add(1, Ordering::Relaxed);
                batch_count += 1;
                batch_alerts.extend(alerts);
                {
                    let mut status = handle.status.write().await;
                    status.last_timestamp = Some(point.timestamp);
                }
            }
            Err(StoreError::Unreachable(msg)) => {
                // Class (v): system-wide persistence failure. Escalate —
                // stop the replay and broadcast a single `error` envelope.
                error!(error = %msg, "store unreachable, stopping replay");
                flush_batch(&hub, &mut batch_alerts, handle.processed.load(Ordering::Relaxed));
                hub.publish(&BroadcastMessage::Error {
                    message: format!("persistence backend unreachable: {msg}"),
                });
                let mut status = handle.status.write().await;
                status.running = false;
                return;
            }
            Err(e) => {
                // Per-point persistence failure: roll back this point only,
                // count it, continue (§7 class iv).
                errors += 1;
                warn!(error = %e, mmsi = %point.mmsi, "point processing failed, skipping");
            }
        }

        if batch_count >= cfg.batch_size {
            flush_batch(&hub, &mut batch_alerts, handle.processed.load(Ordering::Relaxed));
            batch_count = 0;
        }
    }

    flush_batch(&hub, &mut batch_alerts, handle.processed.load(Ordering::Relaxed));

    if errors > 0 {
        error!(errors, "replay finished with per-point errors");
    }

    let mut status = handle.status.write().await;
    status.running = false;
}

fn flush_batch(hub: &BroadcastHub, batch_alerts: &mut Vec<crate::model::Alert>, processed: u64) {
    for alert in batch_alerts.drain(..) {
        hub.publish(&BroadcastMessage::Alert(alert));
    }
    hub.publish(&BroadcastMessage::Tick { processed });
}
