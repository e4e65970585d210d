use std::sync::Arc;
use std::time::Duration;

use ais_anomaly_detector::broadcast::BroadcastHub;
use ais_anomaly_detector::config::Config;
use ais_anomaly_detector::control::{self, AppState};
use ais_anomaly_detector::session::SessionRegistry;
use ais_anomaly_detector::store::MemoryStore;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ais-anomaly-detector", about = "AIS vessel-position anomaly detection pipeline")]
struct Args {
    /// Path to a TOML config file overriding the rule-threshold defaults
    #[arg(short, long)]
    config: Option<String>,
    /// HTTP listen port
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    control::record_startup_time();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ais_anomaly_detector=info".into()),
        )
        .init();

    info!("AIS anomaly detector v{} starting", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = load_config(args.config.as_deref());
    let store = Arc::new(MemoryStore::new());
    let hub = BroadcastHub::default();
    let sessions = Arc::new(SessionRegistry::new(store, hub, config));

    spawn_cooldown_purge_task(sessions.clone());

    let cors_origins_env =
        std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let cors = if cors_origins_env.trim() == "*" {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<_> = cors_origins_env
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    };

    let app = control::router(AppState { sessions }).layer(cors);

    let port = std::env::var("PORT").unwrap_or_else(|_| args.port.to_string());
    let addr = format!("0.0.0.0:{port}");
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Config precedence: `--config` flag, then `CONFIG_PATH` env var, then
/// built-in defaults.
fn load_config(cli_path: Option<&str>) -> Config {
    let path = cli_path.map(str::to_string).or_else(|| std::env::var("CONFIG_PATH").ok());
    match path {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => match Config::from_toml_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "invalid config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, path, "could not read config file, using defaults");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

/// The cooldown table's periodic purge is an external maintenance task
/// (§4.E); this loop is the one caller this binary wires it up for.
fn spawn_cooldown_purge_task(sessions: Arc<SessionRegistry>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(86_400));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(7);
            sessions.purge_cooldowns_older_than(cutoff).await;
        }
    });
}
