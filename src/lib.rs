//! Viewtime Agent Library
//!
//! Client-side viewing-time enforcement engine for OTT players: polls the
//! backend for a profile's remaining-time balance, reports playback
//! liveness via heartbeats, reduces both streams into one enforcement
//! verdict, and fails closed when the backend becomes unreachable.

pub mod agent;
pub mod api;
pub mod config;
pub mod device;
pub mod enforcement;
pub mod metrics;

// Re-export commonly used types for convenience
pub use agent::{AgentHandle, PlaybackState, ViewingTimeAgent};
pub use api::{ApiError, HttpViewingTimeApi, StaticTokenProvider, TokenProvider, ViewingTimeApi};
pub use config::{AppConfig, CliConfig, EnforcementSettings, FileConfig};
pub use device::{DeviceIdentity, DeviceType};
pub use enforcement::{EnforcementSnapshot, EnforcementStatus, WarningEvent};
