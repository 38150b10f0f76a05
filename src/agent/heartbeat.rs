//! Heartbeat emitter.
//!
//! Active only while a title is actually playing: one beat immediately on
//! activation, then on a fixed interval until playback pauses or ends,
//! the verdict becomes blocked, or the agent shuts down. The first beat
//! of a session carries no session id and receives one from the server;
//! every later beat and the end-of-session call reuse it. Heartbeat
//! failures are silent: that interval's liveness signal is simply lost
//! and the next beat retries.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AgentContext, PlaybackState};
use crate::api::models::HeartbeatRequest;
use crate::api::ViewingTimeApi;
use crate::enforcement::{EnforcementSnapshot, Signal};
use crate::metrics;

/// The accounting session the server opened for the current playback.
struct SessionContext {
    session_id: String,
    /// Profile generation the session was opened under; a switch makes
    /// the session stale.
    generation: u64,
}

/// Outcome of waiting for the next beat.
enum BeatWait {
    /// The interval elapsed; send the next beat.
    Due,
    /// Playback paused/stopped or the verdict became blocked.
    Leave,
    /// The emitter was cancelled.
    Shutdown,
}

pub(crate) struct HeartbeatEmitter {
    api: Arc<dyn ViewingTimeApi>,
    ctx: Arc<AgentContext>,
    cancel: CancellationToken,
    session: Option<SessionContext>,
}

impl HeartbeatEmitter {
    pub(crate) fn new(
        api: Arc<dyn ViewingTimeApi>,
        ctx: Arc<AgentContext>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            ctx,
            cancel,
            session: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut playback_rx = self.ctx.subscribe_playback();
        let mut snapshot_rx = self.ctx.subscribe_snapshots();
        debug!("heartbeat emitter started");

        loop {
            // Idle until a title is playing and the verdict permits it.
            loop {
                let playback = playback_rx.borrow_and_update().clone();
                if matches!(playback, PlaybackState::Idle) {
                    self.close_session("stopped").await;
                }
                if playback.is_playing() && !self.ctx.is_locked() {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return self.stop().await;
                    }
                    changed = playback_rx.changed() => {
                        if changed.is_err() {
                            return self.stop().await;
                        }
                    }
                    changed = snapshot_rx.changed() => {
                        if changed.is_err() {
                            return self.stop().await;
                        }
                        let _ = snapshot_rx.borrow_and_update();
                    }
                }
            }

            // Active: beat now, then every interval while playback holds.
            'active: loop {
                // Consult the live context at the moment of firing.
                let (profile_id, generation) = self.ctx.current_profile();
                let session_is_stale = self
                    .session
                    .as_ref()
                    .map_or(false, |s| s.generation != generation);
                if session_is_stale {
                    self.close_session("profile_switch").await;
                }

                let title_id = match playback_rx.borrow().clone() {
                    PlaybackState::Playing { title_id } => title_id,
                    _ => break 'active,
                };

                let request = HeartbeatRequest {
                    profile_id,
                    session_id: self.session.as_ref().map(|s| s.session_id.clone()),
                    title_id,
                    device_id: self.ctx.device().device_id.clone(),
                    device_type: Some(self.ctx.device().device_type),
                    is_paused: Some(false),
                };

                let result = tokio::select! {
                    result = self.api.send_heartbeat(&request) => result,
                    _ = self.cancel.cancelled() => {
                        return self.stop().await;
                    }
                };

                match result {
                    Ok(reply) => {
                        metrics::record_heartbeat("ok");
                        if self.ctx.generation() == generation {
                            self.session = Some(SessionContext {
                                session_id: reply.session_id.clone(),
                                generation,
                            });
                            self.ctx.apply_if_current(generation, Signal::Heartbeat(reply));
                        } else {
                            debug!("discarding heartbeat reply for superseded profile");
                        }
                    }
                    Err(e) => {
                        metrics::record_heartbeat("error");
                        debug!("heartbeat dropped: {}", e);
                    }
                }

                // No further usage is counted once locked.
                if self.ctx.is_locked() {
                    break 'active;
                }

                match self
                    .wait_for_next_beat(&mut playback_rx, &mut snapshot_rx)
                    .await
                {
                    BeatWait::Due => {}
                    BeatWait::Leave => break 'active,
                    BeatWait::Shutdown => {
                        return self.stop().await;
                    }
                }
            }

            // Left the active loop: a stop closes the session, a pause
            // keeps it open for resumption.
            if matches!(*playback_rx.borrow(), PlaybackState::Idle) {
                self.close_session("stopped").await;
            }
        }
    }

    async fn wait_for_next_beat(
        &self,
        playback_rx: &mut watch::Receiver<PlaybackState>,
        snapshot_rx: &mut watch::Receiver<EnforcementSnapshot>,
    ) -> BeatWait {
        let sleep = tokio::time::sleep(self.ctx.settings().heartbeat_interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return BeatWait::Shutdown,
                _ = &mut sleep => return BeatWait::Due,
                changed = playback_rx.changed() => {
                    if changed.is_err() {
                        return BeatWait::Shutdown;
                    }
                    if !playback_rx.borrow_and_update().is_playing() {
                        return BeatWait::Leave;
                    }
                }
                changed = snapshot_rx.changed() => {
                    if changed.is_err() {
                        return BeatWait::Shutdown;
                    }
                    let _ = snapshot_rx.borrow_and_update();
                    if self.ctx.is_locked() {
                        return BeatWait::Leave;
                    }
                }
            }
        }
    }

    async fn stop(&mut self) {
        self.close_session("shutdown").await;
        debug!("heartbeat emitter stopped");
    }

    /// Best-effort end-of-session call. Never surfaces failures: the
    /// server also times sessions out on its own.
    async fn close_session(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            debug!(session = %session.session_id, reason, "ending viewing session");
            let grace = self.ctx.settings().session_end_grace;
            match tokio::time::timeout(grace, self.api.end_session(&session.session_id)).await {
                Ok(Ok(_)) => metrics::record_session_end("ok"),
                Ok(Err(e)) => {
                    metrics::record_session_end("error");
                    debug!("end-session call failed (ignored): {}", e);
                }
                Err(_) => {
                    metrics::record_session_end("timeout");
                    debug!("end-session call timed out (ignored)");
                }
            }
        }
    }
}
