//! Viewing-time enforcement state machine.
//!
//! Pure derivation logic: no timers, no network. The agent module owns
//! the loops that feed signals in; this module owns what they mean.

mod fail_guard;
mod reducer;
mod status;

pub use fail_guard::FailClosedGuard;
pub use reducer::{
    EnforcementReducer, EnforcementSnapshot, Signal, WarningEvent,
    WARNING_15_THRESHOLD_MINUTES, WARNING_5_THRESHOLD_MINUTES,
};
pub use status::EnforcementStatus;
