mod file_config;

pub use file_config::{EnforcementConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub backend_url: Option<String>,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub device_file: Option<PathBuf>,
    pub device_type: String,
    pub poll_interval_secs: u64,
    pub locked_poll_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub fail_threshold: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        let defaults = EnforcementSettings::default();
        Self {
            backend_url: None,
            token: None,
            request_timeout_secs: 10,
            device_file: None,
            device_type: "web".to_string(),
            poll_interval_secs: defaults.poll_interval.as_secs(),
            locked_poll_interval_secs: defaults.locked_poll_interval.as_secs(),
            heartbeat_interval_secs: defaults.heartbeat_interval.as_secs(),
            fail_threshold: defaults.fail_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
    pub device_file: PathBuf,
    pub device_type: String,
    pub enforcement: EnforcementSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let backend_url = file
            .backend_url
            .or_else(|| cli.backend_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("backend_url must be specified via --backend-url or in config file")
            })?;

        let token = file.token.or_else(|| cli.token.clone());

        let request_timeout_secs = file.request_timeout_secs.unwrap_or(cli.request_timeout_secs);
        if request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }

        let device_file = file
            .device_file
            .map(PathBuf::from)
            .or_else(|| cli.device_file.clone())
            .unwrap_or_else(|| PathBuf::from("viewtime-device.json"));

        let device_type = file.device_type.unwrap_or_else(|| cli.device_type.clone());

        // Enforcement settings - merge file config with CLI values
        let enf_file = file.enforcement.unwrap_or_default();
        let enforcement = EnforcementSettings {
            poll_interval: Duration::from_secs(
                enf_file.poll_interval_secs.unwrap_or(cli.poll_interval_secs),
            ),
            locked_poll_interval: Duration::from_secs(
                enf_file
                    .locked_poll_interval_secs
                    .unwrap_or(cli.locked_poll_interval_secs),
            ),
            heartbeat_interval: Duration::from_secs(
                enf_file
                    .heartbeat_interval_secs
                    .unwrap_or(cli.heartbeat_interval_secs),
            ),
            fail_threshold: enf_file.fail_threshold.unwrap_or(cli.fail_threshold),
            session_end_grace: Duration::from_millis(
                enf_file.session_end_grace_ms.unwrap_or(1500),
            ),
        };
        enforcement.validate()?;

        Ok(Self {
            backend_url,
            token,
            request_timeout_secs,
            device_file,
            device_type,
            enforcement,
        })
    }
}

/// Tunables for the enforcement loops.
#[derive(Debug, Clone)]
pub struct EnforcementSettings {
    /// Balance poll cadence while unlocked.
    pub poll_interval: Duration,
    /// Balance poll cadence while locked, so a server-side reset or grant
    /// lifts the lock promptly.
    pub locked_poll_interval: Duration,
    /// Heartbeat cadence while a title is actually playing.
    pub heartbeat_interval: Duration,
    /// Consecutive fetch failures before failing closed.
    pub fail_threshold: u32,
    /// How long shutdown waits for the best-effort end-of-session call.
    pub session_end_grace: Duration,
}

impl EnforcementSettings {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() || self.locked_poll_interval.is_zero() {
            bail!("poll intervals must be greater than zero");
        }
        if self.heartbeat_interval.is_zero() {
            bail!("heartbeat_interval must be greater than zero");
        }
        if self.fail_threshold == 0 {
            bail!("fail_threshold must be at least 1");
        }
        Ok(())
    }
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(45),
            locked_poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            fail_threshold: 2,
            session_end_grace: Duration::from_millis(1500),
        }
    }
}
