//! The enforcement agent: orchestration of the polling and heartbeat
//! loops for one mounted player view.
//!
//! Two independently scheduled tasks feed the shared reducer: the balance
//! poller and the heartbeat emitter. They hold no scheduling state in
//! common; both read the current profile/title/device context at the
//! moment their timer fires, never values captured at spawn. Derived
//! state is published on a `watch` channel for the embedding player.

mod heartbeat;
mod poller;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::PlaybackEligibility;
use crate::api::{ApiError, ViewingTimeApi};
use crate::config::EnforcementSettings;
use crate::device::DeviceIdentity;
use crate::enforcement::{EnforcementReducer, EnforcementSnapshot, Signal};
use crate::metrics;

/// What the embedding player is currently doing with a title.
///
/// The heartbeat emitter is active only in `Playing`; `Paused` keeps the
/// accounting session open for resumption, `Idle` closes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing { title_id: String },
    Paused { title_id: String },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn title_id(&self) -> Option<&str> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing { title_id } | PlaybackState::Paused { title_id } => {
                Some(title_id)
            }
        }
    }
}

/// Reducer plus the profile context it is scoped to.
struct EngineState {
    reducer: EnforcementReducer,
    profile_id: String,
    /// Bumped on every profile switch; responses stamped with an older
    /// generation are discarded before they reach the reducer.
    generation: u64,
}

/// State shared by the loops and the handle.
pub(crate) struct AgentContext {
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<EnforcementSnapshot>,
    playback_tx: watch::Sender<PlaybackState>,
    device: DeviceIdentity,
    settings: EnforcementSettings,
}

impl AgentContext {
    fn new(profile_id: String, device: DeviceIdentity, settings: EnforcementSettings) -> Self {
        let generation = 1;
        let (snapshot_tx, _) = watch::channel(EnforcementSnapshot::unsettled(generation));
        let (playback_tx, _) = watch::channel(PlaybackState::Idle);
        Self {
            state: Mutex::new(EngineState {
                reducer: EnforcementReducer::new(settings.fail_threshold),
                profile_id,
                generation,
            }),
            snapshot_tx,
            playback_tx,
            device,
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &EnforcementSettings {
        &self.settings
    }

    pub(crate) fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    /// The profile id and generation to stamp an outgoing request with.
    pub(crate) fn current_profile(&self) -> (String, u64) {
        let state = self.state.lock().unwrap();
        (state.profile_id.clone(), state.generation)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.lock().unwrap().reducer.is_locked()
    }

    /// The poll cadence for the current lock state.
    pub(crate) fn poll_tier(&self) -> Duration {
        if self.is_locked() {
            self.settings.locked_poll_interval
        } else {
            self.settings.poll_interval
        }
    }

    pub(crate) fn snapshot(&self) -> EnforcementSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub(crate) fn subscribe_snapshots(&self) -> watch::Receiver<EnforcementSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback_tx.subscribe()
    }

    pub(crate) fn set_playback(&self, playback: PlaybackState) {
        debug!(?playback, "playback state changed");
        self.playback_tx.send_replace(playback);
    }

    /// Apply a signal if it still belongs to the current profile
    /// generation. Returns false when the signal was discarded as
    /// superseded.
    pub(crate) fn apply_if_current(&self, generation: u64, signal: Signal) -> bool {
        let is_poll_failure = matches!(signal, Signal::PollFailed);

        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.generation != generation {
                return false;
            }
            let was_locked = state.reducer.is_locked();
            let mut snapshot = state.reducer.apply(signal);
            snapshot.generation = state.generation;

            if !was_locked && snapshot.is_locked {
                let reason = if is_poll_failure { "fail_closed" } else { "exhausted" };
                metrics::record_lockout(reason);
                info!(reason, "viewing time lock engaged");
            }
            snapshot
        };

        if let Some(warning) = snapshot.warning {
            metrics::record_warning(warning.threshold_minutes());
            info!(
                threshold = warning.threshold_minutes(),
                remaining = ?snapshot.remaining_minutes,
                "viewing time warning"
            );
        }
        metrics::set_enforcement_status(snapshot.status);
        self.snapshot_tx.send_replace(snapshot);
        true
    }

    /// Swap the profile context: bumps the generation, re-arms the
    /// reducer, and publishes a fresh unsettled snapshot. Any in-flight
    /// response for the old profile will fail the generation check.
    pub(crate) fn switch_profile(&self, profile_id: String) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.profile_id = profile_id.clone();
            state.reducer.reset();
            EnforcementSnapshot::unsettled(state.generation)
        };
        metrics::PROFILE_SWITCHES_TOTAL.inc();
        metrics::set_enforcement_status(snapshot.status);
        info!(profile = %profile_id, "switched profile context");
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Entry point for embedding the enforcement engine.
pub struct ViewingTimeAgent;

impl ViewingTimeAgent {
    /// Spawn the polling and heartbeat loops for one profile and return
    /// the handle controlling them.
    pub fn spawn(
        api: Arc<dyn ViewingTimeApi>,
        device: DeviceIdentity,
        profile_id: impl Into<String>,
        settings: EnforcementSettings,
    ) -> AgentHandle {
        let ctx = Arc::new(AgentContext::new(profile_id.into(), device, settings));
        let cancel = CancellationToken::new();

        let poll_task = tokio::spawn(
            poller::BalancePoller::new(Arc::clone(&api), Arc::clone(&ctx), cancel.child_token())
                .run(),
        );
        let heartbeat_task = tokio::spawn(
            heartbeat::HeartbeatEmitter::new(
                Arc::clone(&api),
                Arc::clone(&ctx),
                cancel.child_token(),
            )
            .run(),
        );

        AgentHandle {
            ctx,
            api,
            cancel,
            poll_task,
            heartbeat_task,
        }
    }
}

/// Handle to a running agent.
///
/// Dropping the handle without calling [`AgentHandle::shutdown`] cancels
/// the loops but skips the end-of-session courtesy call.
pub struct AgentHandle {
    ctx: Arc<AgentContext>,
    api: Arc<dyn ViewingTimeApi>,
    cancel: CancellationToken,
    poll_task: JoinHandle<()>,
    heartbeat_task: JoinHandle<()>,
}

impl AgentHandle {
    /// Subscribe to enforcement snapshots. The channel always holds the
    /// latest snapshot; receivers that fall behind see only the newest.
    pub fn subscribe(&self) -> watch::Receiver<EnforcementSnapshot> {
        self.ctx.subscribe_snapshots()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> EnforcementSnapshot {
        self.ctx.snapshot()
    }

    /// Report what the player is doing; drives the heartbeat emitter.
    pub fn set_playback(&self, playback: PlaybackState) {
        self.ctx.set_playback(playback);
    }

    /// Switch to another viewer profile. Invalidates all in-flight state
    /// for the old profile and starts the new one unsettled.
    pub fn switch_profile(&self, profile_id: impl Into<String>) {
        self.ctx.switch_profile(profile_id.into());
    }

    /// Pre-flight eligibility check for the current profile.
    pub async fn check_eligibility(&self) -> Result<PlaybackEligibility, ApiError> {
        let (profile_id, _) = self.ctx.current_profile();
        self.api.playback_eligibility(&profile_id).await
    }

    /// Stop both loops. The heartbeat emitter gets a grace period to
    /// issue its best-effort end-of-session call; after that the tasks
    /// are abandoned rather than blocking shutdown.
    pub async fn shutdown(self) {
        info!("shutting down viewing-time agent");
        self.cancel.cancel();

        let grace = self.ctx.settings().session_end_grace + Duration::from_millis(500);
        if tokio::time::timeout(grace, self.heartbeat_task).await.is_err() {
            warn!("heartbeat emitter did not stop within the grace period");
        }
        if tokio::time::timeout(Duration::from_millis(500), self.poll_task)
            .await
            .is_err()
        {
            warn!("balance poller did not stop within the grace period");
        }
    }
}
