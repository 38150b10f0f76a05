//! Wire models for the viewing-time backend API.
//!
//! All of these are server-issued snapshots; the client treats them as
//! read-only and disposable. A balance is valid only until the next poll
//! or heartbeat reply supersedes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::enforcement::EnforcementStatus;

/// Point-in-time remaining-time snapshot for one profile.
///
/// Invariant: if `has_limits` is false or `is_unlimited_override` is true,
/// no lock or warning may ever be derived from this balance regardless of
/// the other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewingTimeBalance {
    pub profile_id: String,
    pub is_child_profile: bool,
    pub has_limits: bool,
    pub used_minutes: u32,
    /// None means unlimited.
    pub limit_minutes: Option<u32>,
    /// None means unlimited; can go negative when the server counts overshoot.
    pub remaining_minutes: Option<i64>,
    /// Temporary grant that suspends enforcement regardless of limits.
    pub is_unlimited_override: bool,
    /// When the daily counter zeroes.
    pub next_reset_at: Option<DateTime<Utc>>,
    /// Ascending remaining-minute thresholds at which the UI warns.
    #[serde(default)]
    pub warning_threshold_minutes: Vec<u32>,
}

impl ViewingTimeBalance {
    /// Returns true when no enforcement applies to this profile at all.
    pub fn is_exempt(&self) -> bool {
        !self.has_limits || self.is_unlimited_override
    }
}

/// Body of a liveness heartbeat sent while a title is actually playing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub profile_id: String,
    /// Absent on the first call of a session; the server assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub title_id: String,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
}

/// Authoritative enforcement decision returned for each heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub session_id: String,
    pub enforcement: EnforcementStatus,
    pub remaining_minutes: Option<i64>,
    pub used_minutes: u32,
    /// Educational sessions are exempt from counting.
    #[serde(default)]
    pub is_educational: bool,
}

/// Acknowledgement for the best-effort end-of-session call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndReply {
    pub session_id: String,
    pub total_seconds: u64,
    pub ended_at: DateTime<Utc>,
}

/// Pre-flight playback eligibility check result.
///
/// Shares the enforcement vocabulary with the core loop but is consulted
/// once before a session starts, not repeatedly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackEligibility {
    pub eligible: bool,
    pub enforcement: EnforcementStatus,
    pub remaining_minutes: Option<i64>,
}
