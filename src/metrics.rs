//! Prometheus metrics for the enforcement engine.

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

use crate::enforcement::EnforcementStatus;

/// Metric name prefix for all viewtime metrics
const PREFIX: &str = "viewtime";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref BALANCE_POLLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_balance_polls_total"), "Balance poll attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create balance_polls_total metric");

    pub static ref HEARTBEATS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_heartbeats_total"), "Heartbeats sent by outcome"),
        &["outcome"]
    ).expect("Failed to create heartbeats_total metric");

    pub static ref SESSION_ENDS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_session_ends_total"), "End-of-session calls by outcome"),
        &["outcome"]
    ).expect("Failed to create session_ends_total metric");

    pub static ref LOCKOUTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_lockouts_total"), "Lock engagements by reason"),
        &["reason"]
    ).expect("Failed to create lockouts_total metric");

    pub static ref WARNINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_warnings_total"), "Warning events by threshold"),
        &["threshold"]
    ).expect("Failed to create warnings_total metric");

    pub static ref PROFILE_SWITCHES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_profile_switches_total"),
        "Profile switches handled by the agent"
    ).expect("Failed to create profile_switches_total metric");

    // Current enforcement state as a severity level (0=allowed .. 3=blocked)
    pub static ref ENFORCEMENT_SEVERITY: Gauge = Gauge::new(
        format!("{PREFIX}_enforcement_severity"),
        "Current enforcement verdict severity (0=allowed, 3=blocked)"
    ).expect("Failed to create enforcement_severity metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BALANCE_POLLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HEARTBEATS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SESSION_ENDS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LOCKOUTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(WARNINGS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROFILE_SWITCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENFORCEMENT_SEVERITY.clone()));

    tracing::info!("Metrics system initialized");
}

pub fn record_balance_poll(outcome: &str) {
    BALANCE_POLLS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_heartbeat(outcome: &str) {
    HEARTBEATS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_session_end(outcome: &str) {
    SESSION_ENDS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_lockout(reason: &str) {
    LOCKOUTS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_warning(threshold_minutes: i64) {
    WARNINGS_TOTAL
        .with_label_values(&[&threshold_minutes.to_string()])
        .inc();
}

pub fn set_enforcement_status(status: EnforcementStatus) {
    ENFORCEMENT_SEVERITY.set(status.severity() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn recording_does_not_panic() {
        init_metrics();
        record_balance_poll("ok");
        record_balance_poll("error");
        record_heartbeat("ok");
        record_session_end("error");
        record_lockout("fail_closed");
        record_warning(15);
        set_enforcement_status(EnforcementStatus::Blocked);
        assert_eq!(ENFORCEMENT_SEVERITY.get(), 3.0);
    }
}
