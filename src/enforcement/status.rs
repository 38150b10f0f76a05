//! Enforcement verdict vocabulary shared with the backend.

use serde::{Deserialize, Serialize};

/// The single enforcement verdict derived from the freshest signal.
///
/// Exactly one value is active at any time. It is never mutated directly;
/// the reducer recomputes it from each incoming balance or heartbeat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementStatus {
    Allowed,
    #[serde(rename = "warning_15")]
    Warning15,
    #[serde(rename = "warning_5")]
    Warning5,
    Blocked,
}

impl EnforcementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementStatus::Allowed => "allowed",
            EnforcementStatus::Warning15 => "warning_15",
            EnforcementStatus::Warning5 => "warning_5",
            EnforcementStatus::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "allowed" => Some(EnforcementStatus::Allowed),
            "warning_15" => Some(EnforcementStatus::Warning15),
            "warning_5" => Some(EnforcementStatus::Warning5),
            "blocked" => Some(EnforcementStatus::Blocked),
            _ => None,
        }
    }

    /// Returns true if this verdict gates playback entirely.
    pub fn is_blocked(&self) -> bool {
        matches!(self, EnforcementStatus::Blocked)
    }

    /// Ordering used to decide whether a verdict is worse than another.
    /// Higher means more restrictive.
    pub fn severity(&self) -> u8 {
        match self {
            EnforcementStatus::Allowed => 0,
            EnforcementStatus::Warning15 => 1,
            EnforcementStatus::Warning5 => 2,
            EnforcementStatus::Blocked => 3,
        }
    }
}

impl std::fmt::Display for EnforcementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
