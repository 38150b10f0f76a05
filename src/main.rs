use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use viewtime_agent::api::{HttpViewingTimeApi, StaticTokenProvider, TokenProvider};
use viewtime_agent::config::{AppConfig, CliConfig, FileConfig};
use viewtime_agent::device::{DeviceIdentity, DeviceType};
use viewtime_agent::{metrics, PlaybackState, ViewingTimeAgent};

/// Monitor CLI: runs the enforcement engine for one profile against a
/// real backend and logs every verdict transition.
#[derive(Parser, Debug)]
struct CliArgs {
    /// The viewer profile to enforce for.
    pub profile_id: String,

    /// Base URL of the viewing-time backend.
    #[clap(long)]
    pub backend_url: Option<String>,

    /// Bearer token for the backend (falls back to the VIEWTIME_TOKEN env var).
    #[clap(long)]
    pub token: Option<String>,

    /// Title to simulate playback for; without it only polling runs.
    #[clap(long)]
    pub title_id: Option<String>,

    /// Path to a TOML config file; its values override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Path of the persisted device identity file.
    #[clap(long)]
    pub device_file: Option<PathBuf>,

    /// Device type reported with heartbeats (web, android, ios, tv).
    #[clap(long, default_value = "web")]
    pub device_type: String,

    /// Timeout in seconds for backend requests.
    #[clap(long, default_value_t = 10)]
    pub request_timeout_sec: u64,

    /// Balance poll interval in seconds while unlocked.
    #[clap(long, default_value_t = 45)]
    pub poll_interval_sec: u64,

    /// Balance poll interval in seconds while locked.
    #[clap(long, default_value_t = 5)]
    pub locked_poll_interval_sec: u64,

    /// Heartbeat interval in seconds while playing.
    #[clap(long, default_value_t = 30)]
    pub heartbeat_interval_sec: u64,

    /// Consecutive fetch failures before failing closed.
    #[clap(long, default_value_t = 2)]
    pub fail_threshold: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let token = cli_args
        .token
        .clone()
        .or_else(|| std::env::var("VIEWTIME_TOKEN").ok());
    let cli_config = CliConfig {
        backend_url: cli_args.backend_url.clone(),
        token,
        request_timeout_secs: cli_args.request_timeout_sec,
        device_file: cli_args.device_file.clone(),
        device_type: cli_args.device_type.clone(),
        poll_interval_secs: cli_args.poll_interval_sec,
        locked_poll_interval_secs: cli_args.locked_poll_interval_sec,
        heartbeat_interval_secs: cli_args.heartbeat_interval_sec,
        fail_threshold: cli_args.fail_threshold,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    let device_type = DeviceType::from_str(&config.device_type);
    let device = DeviceIdentity::load_or_create(&config.device_file, device_type)?;
    info!(device_id = %device.device_id, "device identity loaded");

    let tokens: Arc<dyn TokenProvider> = match &config.token {
        Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => {
            warn!("no bearer token configured, requests will be unauthenticated");
            Arc::new(StaticTokenProvider::new(String::new()))
        }
    };
    let api = Arc::new(HttpViewingTimeApi::new(
        config.backend_url.clone(),
        config.request_timeout_secs,
        tokens,
    )?);

    info!(
        backend = %config.backend_url,
        profile = %cli_args.profile_id,
        "starting viewing-time agent"
    );

    let handle = ViewingTimeAgent::spawn(
        api,
        device,
        cli_args.profile_id.clone(),
        config.enforcement.clone(),
    );

    // Pre-flight: the same vocabulary the loops use, consulted once.
    match handle.check_eligibility().await {
        Ok(eligibility) => info!(
            eligible = eligibility.eligible,
            enforcement = %eligibility.enforcement,
            remaining = ?eligibility.remaining_minutes,
            "playback eligibility"
        ),
        Err(e) => warn!("eligibility pre-flight failed: {}", e),
    }

    if let Some(title_id) = &cli_args.title_id {
        info!(title = %title_id, "simulating active playback");
        handle.set_playback(PlaybackState::Playing {
            title_id: title_id.clone(),
        });
    }

    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    status = %snapshot.status,
                    locked = snapshot.is_locked,
                    remaining = ?snapshot.remaining_minutes,
                    settled = snapshot.settled,
                    "enforcement update"
                );
                if let Some(warning) = snapshot.warning {
                    warn!(
                        threshold = warning.threshold_minutes(),
                        "viewing time warning threshold crossed"
                    );
                }
            }
        }
    }

    handle.shutdown().await;
    info!("agent stopped");
    Ok(())
}
