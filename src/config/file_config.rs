use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub backend_url: Option<String>,
    pub token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub device_file: Option<String>,
    pub device_type: Option<String>,

    // Feature configs
    pub enforcement: Option<EnforcementConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnforcementConfig {
    pub poll_interval_secs: Option<u64>,
    pub locked_poll_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub fail_threshold: Option<u32>,
    pub session_end_grace_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
