//! Balance polling loop.
//!
//! One fetch immediately on start (and on every profile switch), then a
//! repeating fetch at the tier for the current lock state: normal while
//! unlocked, fast while locked. There is exactly one timer at any time;
//! when the lock state flips mid-sleep the timer is cancelled and
//! replaced with the other tier's.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::AgentContext;
use crate::api::ViewingTimeApi;
use crate::enforcement::Signal;
use crate::metrics;

pub(crate) struct BalancePoller {
    api: Arc<dyn ViewingTimeApi>,
    ctx: Arc<AgentContext>,
    cancel: CancellationToken,
}

impl BalancePoller {
    pub(crate) fn new(
        api: Arc<dyn ViewingTimeApi>,
        ctx: Arc<AgentContext>,
        cancel: CancellationToken,
    ) -> Self {
        Self { api, ctx, cancel }
    }

    pub(crate) async fn run(self) {
        let mut snapshot_rx = self.ctx.subscribe_snapshots();
        debug!("balance poller started");

        loop {
            // Read the profile at the moment the timer fires, not at spawn.
            let (profile_id, generation) = self.ctx.current_profile();

            let fetch = self.api.get_balance(&profile_id);
            let result = tokio::select! {
                result = fetch => result,
                _ = self.cancel.cancelled() => break,
            };

            match result {
                Ok(balance) => {
                    metrics::record_balance_poll("ok");
                    if !self
                        .ctx
                        .apply_if_current(generation, Signal::PollBalance(balance))
                    {
                        debug!(profile = %profile_id, "discarding balance for superseded profile");
                    }
                }
                Err(e) => {
                    // Not surfaced: the fail-closed guard turns a streak of
                    // these into a lock, which is the user-visible outcome.
                    metrics::record_balance_poll("error");
                    debug!(profile = %profile_id, "balance fetch failed: {}", e);
                    self.ctx.apply_if_current(generation, Signal::PollFailed);
                }
            }

            if !self.sleep_one_tier(generation, &mut snapshot_rx).await {
                break;
            }
        }

        debug!("balance poller stopped");
    }

    /// Sleep until the next poll is due. Returns false on cancellation.
    ///
    /// Wakes early when a profile switch happens (the new profile needs
    /// its immediate fetch) and swaps the timer when the lock tier flips.
    async fn sleep_one_tier(
        &self,
        generation: u64,
        snapshot_rx: &mut tokio::sync::watch::Receiver<crate::enforcement::EnforcementSnapshot>,
    ) -> bool {
        let mut tier = self.ctx.poll_tier();
        let sleep = tokio::time::sleep(tier);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                changed = snapshot_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if snapshot_rx.borrow_and_update().generation != generation {
                        // Profile switched: fetch immediately for the new one.
                        return true;
                    }
                    let want = self.ctx.poll_tier();
                    if want != tier {
                        debug!(?want, "lock state flipped, replacing poll timer");
                        tier = want;
                        sleep.set(tokio::time::sleep(want));
                    }
                }
            }
        }
    }
}
