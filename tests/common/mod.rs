//! Common test infrastructure
//!
//! This module provides the mock backend and the helpers shared by the
//! end-to-end tests. Tests should only import from this module, not from
//! internal submodules.

#![allow(dead_code)]

mod backend;

pub use backend::MockBackend;

use std::sync::Arc;
use std::time::Duration;

use viewtime_agent::api::models::ViewingTimeBalance;
use viewtime_agent::api::{HttpViewingTimeApi, StaticTokenProvider, TokenProvider};
use viewtime_agent::device::{DeviceIdentity, DeviceType};
use viewtime_agent::enforcement::EnforcementSnapshot;
use viewtime_agent::{AgentHandle, EnforcementSettings, ViewingTimeAgent};

/// Profile id used by most tests
pub const PROFILE_ID: &str = "profile-kid-1";

/// Title id used by playback tests
pub const TITLE_ID: &str = "title-42";

/// Bearer token the test agent authenticates with
pub const TEST_TOKEN: &str = "test-bearer-token";

/// A child-profile balance with the given remaining minutes.
pub fn child_balance(remaining_minutes: Option<i64>) -> ViewingTimeBalance {
    ViewingTimeBalance {
        profile_id: PROFILE_ID.to_string(),
        is_child_profile: true,
        has_limits: true,
        used_minutes: 30,
        limit_minutes: Some(60),
        remaining_minutes,
        is_unlimited_override: false,
        next_reset_at: None,
        warning_threshold_minutes: vec![5, 15],
    }
}

/// Settings scaled down so the loops tick in milliseconds.
pub fn fast_settings() -> EnforcementSettings {
    EnforcementSettings {
        poll_interval: Duration::from_millis(50),
        locked_poll_interval: Duration::from_millis(20),
        heartbeat_interval: Duration::from_millis(40),
        fail_threshold: 2,
        session_end_grace: Duration::from_millis(500),
    }
}

/// Spawn a real agent talking to the mock backend over HTTP.
pub fn spawn_agent(backend: &MockBackend) -> AgentHandle {
    spawn_agent_with_settings(backend, fast_settings())
}

pub fn spawn_agent_with_settings(
    backend: &MockBackend,
    settings: EnforcementSettings,
) -> AgentHandle {
    let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(TEST_TOKEN));
    let api = Arc::new(
        HttpViewingTimeApi::new(backend.base_url.clone(), 5, tokens)
            .expect("Failed to build API client"),
    );
    let device = DeviceIdentity {
        device_id: "e2e-device-0001".to_string(),
        device_type: DeviceType::Web,
    };
    ViewingTimeAgent::spawn(api, device, PROFILE_ID, settings)
}

/// Wait until the published snapshot satisfies the predicate.
///
/// # Panics
///
/// Panics if the predicate is not satisfied within ~5 seconds.
pub async fn wait_for_snapshot<F>(handle: &AgentHandle, predicate: F) -> EnforcementSnapshot
where
    F: Fn(&EnforcementSnapshot) -> bool,
{
    let mut rx = handle.subscribe();
    for _ in 0..100 {
        {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
        }
        let _ = tokio::time::timeout(Duration::from_millis(50), rx.changed()).await;
    }
    panic!(
        "snapshot predicate never satisfied; last: {:?}",
        rx.borrow().clone()
    );
}

/// Wait until the backend has seen at least `count` heartbeats.
pub async fn wait_for_heartbeats(backend: &MockBackend, count: usize) {
    for _ in 0..100 {
        if backend.heartbeat_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "backend saw only {} heartbeats, expected at least {}",
        backend.heartbeat_count(),
        count
    );
}
