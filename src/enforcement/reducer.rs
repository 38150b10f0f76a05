//! Single-consumer reduction of the two enforcement signal streams.
//!
//! The polling loop and the heartbeat emitter both feed tagged signals
//! into one reducer, which derives the enforcement verdict, the lock
//! flag, and the one-shot warning events. The reducer is pure state (no
//! I/O) and last-write-wins safe: applying the same signal twice, or
//! applying signals in either arrival order, always leaves it in a state
//! derivable from the freshest signal alone.

use tracing::{debug, info};

use super::fail_guard::FailClosedGuard;
use super::status::EnforcementStatus;
use crate::api::models::{HeartbeatReply, ViewingTimeBalance};

/// Remaining-minute threshold for the early warning.
pub const WARNING_15_THRESHOLD_MINUTES: i64 = 15;

/// Remaining-minute threshold for the final warning.
pub const WARNING_5_THRESHOLD_MINUTES: i64 = 5;

/// A tagged update from one of the signal streams.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Balance snapshot fetched by the polling loop.
    PollBalance(ViewingTimeBalance),
    /// The polling loop failed to fetch a balance (transport, HTTP error,
    /// or malformed body — all equivalent here).
    PollFailed,
    /// Enforcement reply received for an active-playback heartbeat.
    Heartbeat(HeartbeatReply),
}

/// One-shot warning fired when a remaining-time threshold is crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningEvent {
    FifteenMinutes,
    FiveMinutes,
}

impl WarningEvent {
    pub fn threshold_minutes(&self) -> i64 {
        match self {
            WarningEvent::FifteenMinutes => WARNING_15_THRESHOLD_MINUTES,
            WarningEvent::FiveMinutes => WARNING_5_THRESHOLD_MINUTES,
        }
    }
}

/// Published view of the reducer after each applied signal.
#[derive(Debug, Clone)]
pub struct EnforcementSnapshot {
    pub status: EnforcementStatus,
    pub is_locked: bool,
    pub remaining_minutes: Option<i64>,
    /// False until the first signal for the current profile has been
    /// applied; gate decisions must not be rendered from an unsettled
    /// snapshot.
    pub settled: bool,
    /// Cumulative warning latches, re-armed only on profile switch.
    pub warned_15: bool,
    pub warned_5: bool,
    /// The warning that fired on this transition, if any.
    pub warning: Option<WarningEvent>,
    /// Profile generation this snapshot belongs to; stamped by the agent.
    pub generation: u64,
}

impl EnforcementSnapshot {
    /// Starting snapshot for a fresh (or switched) profile.
    pub fn unsettled(generation: u64) -> Self {
        Self {
            status: EnforcementStatus::Allowed,
            is_locked: false,
            remaining_minutes: None,
            settled: false,
            warned_15: false,
            warned_5: false,
            warning: None,
            generation,
        }
    }
}

/// Derives one enforcement verdict from whichever signal arrived last.
pub struct EnforcementReducer {
    status: EnforcementStatus,
    remaining_minutes: Option<i64>,
    settled: bool,
    warned_15: bool,
    warned_5: bool,
    guard: FailClosedGuard,
}

impl EnforcementReducer {
    pub fn new(fail_threshold: u32) -> Self {
        Self {
            status: EnforcementStatus::Allowed,
            remaining_minutes: None,
            settled: false,
            warned_15: false,
            warned_5: false,
            guard: FailClosedGuard::new(fail_threshold),
        }
    }

    /// Apply one tagged signal and return the resulting snapshot.
    pub fn apply(&mut self, signal: Signal) -> EnforcementSnapshot {
        match signal {
            Signal::PollBalance(balance) => {
                self.guard.record_success();
                self.apply_balance(&balance)
            }
            Signal::Heartbeat(reply) => {
                self.guard.record_success();
                self.apply_heartbeat(&reply)
            }
            Signal::PollFailed => self.apply_poll_failure(),
        }
    }

    /// Re-arm warning latches and the failure counter for a new profile.
    pub fn reset(&mut self) {
        self.status = EnforcementStatus::Allowed;
        self.remaining_minutes = None;
        self.settled = false;
        self.warned_15 = false;
        self.warned_5 = false;
        self.guard.reset();
    }

    pub fn is_locked(&self) -> bool {
        self.status.is_blocked()
    }

    pub fn status(&self) -> EnforcementStatus {
        self.status
    }

    /// Current snapshot without applying anything.
    pub fn snapshot(&self) -> EnforcementSnapshot {
        self.make_snapshot(None)
    }

    fn apply_balance(&mut self, balance: &ViewingTimeBalance) -> EnforcementSnapshot {
        let was_locked = self.is_locked();
        self.settled = true;
        self.remaining_minutes = balance.remaining_minutes;
        let derived = Self::derive(balance);
        let warning = self.transition_to(derived);
        if was_locked && !self.is_locked() {
            info!(
                remaining = ?balance.remaining_minutes,
                "lock cleared by fresh balance"
            );
        }
        self.make_snapshot(warning)
    }

    fn apply_heartbeat(&mut self, reply: &HeartbeatReply) -> EnforcementSnapshot {
        let was_locked = self.is_locked();
        self.settled = true;
        self.remaining_minutes = reply.remaining_minutes;
        if reply.is_educational && reply.enforcement.severity() > self.status.severity() {
            // Educational sessions don't count against the limit; their
            // heartbeats may unlock but never worsen the verdict.
            debug!(session = %reply.session_id, "educational heartbeat, verdict unchanged");
            return self.make_snapshot(None);
        }
        let warning = self.transition_to(reply.enforcement);
        if was_locked && !self.is_locked() {
            info!(session = %reply.session_id, "lock cleared by heartbeat reply");
        }
        self.make_snapshot(warning)
    }

    fn apply_poll_failure(&mut self) -> EnforcementSnapshot {
        let tripped = self.guard.record_failure();
        if tripped && !self.status.is_blocked() {
            // Fail closed: an unreachable backend must not keep content
            // unlocked, or blocking the network call would defeat limits.
            info!(
                failures = self.guard.failures(),
                "consecutive balance fetch failures, failing closed"
            );
            self.settled = true;
            self.status = EnforcementStatus::Blocked;
        } else if !tripped {
            debug!(
                failures = self.guard.failures(),
                "balance fetch failed, keeping last known state"
            );
        }
        self.make_snapshot(None)
    }

    /// Pure derivation of a verdict from a balance snapshot.
    fn derive(balance: &ViewingTimeBalance) -> EnforcementStatus {
        if balance.is_exempt() {
            return EnforcementStatus::Allowed;
        }
        match balance.remaining_minutes {
            None => EnforcementStatus::Allowed,
            Some(r) if r <= 0 => EnforcementStatus::Blocked,
            Some(r) if r <= WARNING_5_THRESHOLD_MINUTES => EnforcementStatus::Warning5,
            Some(r) if r <= WARNING_15_THRESHOLD_MINUTES => EnforcementStatus::Warning15,
            Some(_) => EnforcementStatus::Allowed,
        }
    }

    /// Set the new verdict and emit at most one warning per latch.
    fn transition_to(&mut self, status: EnforcementStatus) -> Option<WarningEvent> {
        self.status = status;
        match status {
            EnforcementStatus::Warning15 if !self.warned_15 => {
                self.warned_15 = true;
                Some(WarningEvent::FifteenMinutes)
            }
            EnforcementStatus::Warning5 if !self.warned_5 => {
                self.warned_5 = true;
                Some(WarningEvent::FiveMinutes)
            }
            _ => None,
        }
    }

    fn make_snapshot(&self, warning: Option<WarningEvent>) -> EnforcementSnapshot {
        EnforcementSnapshot {
            status: self.status,
            is_locked: self.status.is_blocked(),
            remaining_minutes: self.remaining_minutes,
            settled: self.settled,
            warned_15: self.warned_15,
            warned_5: self.warned_5,
            warning,
            generation: 0,
        }
    }
}
