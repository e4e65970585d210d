//! Single-replay-session gate (§5): a process-wide "running" flag rejects
//! concurrent starts with a conflict error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::broadcast::{BroadcastHub, BroadcastMessage};
use crate::config::Config;
use crate::cooldown::CooldownStore;
use crate::error::{LoadError, SessionError};
use crate::loader;
use crate::pipeline::Pipeline;
use crate::replay::{run_replay, ReplayConfig, ReplayHandle, ReplayStatus};
use crate::store::Store;

pub struct SessionRegistry {
    current: Mutex<Option<ReplayHandle>>,
    store: Arc<dyn Store>,
    hub: BroadcastHub,
    config: Config,
    cooldown: Arc<Mutex<CooldownStore>>,
}

pub struct StartReplayArgs {
    pub path: PathBuf,
    pub speedup: f64,
    pub use_streaming: Option<bool>,
    pub batch_size: Option<usize>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn Store>, hub: BroadcastHub, config: Config) -> Self {
        Self {
            current: Mutex::new(None),
            store,
            hub,
            config,
            cooldown: Arc::new(Mutex::new(CooldownStore::new())),
        }
    }

    /// Purges cooldown entries older than `cutoff` from the process-wide
    /// shared cooldown table (§4.E maintenance task).
    pub async fn purge_cooldowns_older_than(&self, cutoff: chrono::DateTime<Utc>) {
        self.cooldown.lock().await.purge_older_than(cutoff);
    }

    pub async fn status(&self) -> ReplayStatus {
        match self.current.lock().await.as_ref() {
            Some(handle) => handle.status().await,
            None => ReplayStatus::default(),
        }
    }

    pub fn hub_subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.hub.subscribe()
    }

    pub async fn stop(&self) -> bool {
        match self.current.lock().await.as_ref() {
            Some(handle) => {
                handle.request_stop();
                true
            }
            None => false,
        }
    }

    /// Rejects a concurrent start with `SessionError::Conflict`; otherwise
    /// loads the input (materializing or streaming based on file size vs
    /// `streaming_threshold_mb`, unless overridden) and spawns the replay
    /// as its own cooperative task.
    pub async fn start(self: &Arc<Self>, args: StartReplayArgs) -> Result<(), SessionError> {
        let mut slot = self.current.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.status().await.running {
                return Err(SessionError::Conflict);
            }
        }

        let points = match self.load_input(&args) {
            Ok(points) => points,
            Err(e) => {
                broadcast_fatal_error(&self.hub, e.to_string());
                return Err(e);
            }
        };
        let handle = ReplayHandle::new();
        handle.mark_starting().await;
        *slot = Some(handle.clone());
        drop(slot);

        let pipeline = Pipeline::new(self.store.clone(), self.cooldown.clone(), self.config.clone());
        let hub = self.hub.clone();
        let batch_size = args.batch_size.unwrap_or(self.config.default_batch_size);
        let replay_cfg = ReplayConfig {
            speedup: args.speedup,
            batch_size,
        };

        info!(points = points.len(), "starting replay session");
        tokio::spawn(async move {
            run_replay(points, pipeline, hub.clone(), handle, replay_cfg).await;
        });

        Ok(())
    }

    fn load_input(&self, args: &StartReplayArgs) -> Result<Vec<crate::model::AisPoint>, SessionError> {
        if !args.path.exists() {
            return Err(SessionError::Load(LoadError::NotFound(args.path.display().to_string())));
        }

        let use_streaming = args.use_streaming.unwrap_or_else(|| self.should_stream(&args.path));

        let points = if use_streaming {
            loader::load_points_streaming(&args.path, self.config.chunk_size)?
                .into_iter()
                .flatten()
                .collect()
        } else {
            loader::load_points(&args.path)?
        };
        Ok(points)
    }

    /// Materialize-vs-stream selection (§4.G): inputs larger than the
    /// configured threshold stream; otherwise materialize.
    fn should_stream(&self, path: &Path) -> bool {
        let threshold_bytes = self.config.streaming_threshold_mb * 1024.0 * 1024.0;
        std::fs::metadata(path)
            .map(|m| m.len() as f64 > threshold_bytes)
            .unwrap_or(false)
    }
}

/// On fatal session start failure, broadcast an `error` envelope matching
/// the `error` broadcast contract (§7 policy: a single error broadcast
/// plus the terminal status reflecting `running=false`).
pub fn broadcast_fatal_error(hub: &BroadcastHub, message: impl Into<String>) {
    hub.publish(&BroadcastMessage::Error { message: message.into() });
}
