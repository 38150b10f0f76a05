//! Persistent device identity for heartbeat attribution.
//!
//! Each installation gets one random device id, created on first access
//! and read thereafter. The id is stored in a small JSON file next to the
//! rest of the client's local state.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEVICE_ID_MIN_LEN: usize = 8;
pub const DEVICE_ID_MAX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Android,
    Ios,
    Tv,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Tv => "tv",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "web" => Self::Web,
            "android" => Self::Android,
            "ios" => Self::Ios,
            "tv" => Self::Tv,
            _ => Self::Unknown,
        }
    }
}

/// The stable per-installation identity attached to every heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub device_type: DeviceType,
}

impl DeviceIdentity {
    /// Load the identity from `path`, creating and persisting a fresh one
    /// if the file does not exist yet. An unreadable or invalid file is
    /// replaced rather than surfaced: losing a device id only splits
    /// heartbeat attribution, it must never block startup.
    pub fn load_or_create(path: &Path, device_type: DeviceType) -> Result<Self> {
        if path.exists() {
            match Self::load(path) {
                Ok(identity) => return Ok(identity),
                Err(e) => {
                    warn!("invalid device identity file {:?}, regenerating: {}", path, e);
                }
            }
        }

        let identity = Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            device_type,
        };
        identity.persist(path)?;
        info!(device_id = %identity.device_id, "created new device identity");
        Ok(identity)
    }

    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device identity file: {:?}", path))?;
        let identity: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse device identity file: {:?}", path))?;
        identity.validate()?;
        Ok(identity)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write device identity file: {:?}", path))
    }

    fn validate(&self) -> Result<()> {
        let id = self.device_id.trim();
        if id.len() < DEVICE_ID_MIN_LEN || id.len() > DEVICE_ID_MAX_LEN {
            bail!(
                "device_id must be {}-{} characters, got {}",
                DEVICE_ID_MIN_LEN,
                DEVICE_ID_MAX_LEN,
                id.len()
            );
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            bail!("device_id must contain only alphanumeric characters and hyphens");
        }
        Ok(())
    }
}
