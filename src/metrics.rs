// Prometheus metrics definitions for the CyberQuest backend.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Sessions currently live across all catalogs.
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("cyberquest_active_sessions", "Sessions currently live").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total play-throughs started, by catalog.
    pub static ref SESSIONS_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cyberquest_sessions_started_total", "Total play-throughs started"),
        &["catalog"],
    )
    .unwrap();

    /// Total play-throughs finished, by catalog and outcome (won/lost/ended).
    pub static ref SESSIONS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cyberquest_sessions_completed_total", "Total play-throughs finished"),
        &["catalog", "outcome"],
    )
    .unwrap();

    /// Total answers applied, by catalog and result (correct/incorrect/branch).
    pub static ref ANSWERS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("cyberquest_answers_total", "Total answers applied"),
        &["catalog", "result"],
    )
    .unwrap();

    /// Stale or duplicate clicks that were ignored.
    pub static ref STALE_ACTIONS_TOTAL: IntCounter = IntCounter::new(
        "cyberquest_stale_actions_total",
        "Stale or duplicate clicks ignored",
    )
    .unwrap();

    /// Idle sessions removed by the background sweeper.
    pub static ref SESSIONS_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "cyberquest_sessions_swept_total",
        "Idle sessions removed by the sweeper",
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(SESSIONS_STARTED_TOTAL.clone()),
        Box::new(SESSIONS_COMPLETED_TOTAL.clone()),
        Box::new(ANSWERS_TOTAL.clone()),
        Box::new(STALE_ACTIONS_TOTAL.clone()),
        Box::new(SESSIONS_SWEPT_TOTAL.clone()),
    ];

    for c in collectors {
        REGISTRY.register(c).expect("failed to register metric");
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        let output = gather_metrics();
        assert!(output.is_empty() || output.contains("cyberquest_"));
    }

    #[test]
    fn test_metric_increments() {
        ACTIVE_SESSIONS.inc();
        ACTIVE_SESSIONS.dec();

        SESSIONS_STARTED_TOTAL.with_label_values(&["quiz"]).inc();
        SESSIONS_COMPLETED_TOTAL
            .with_label_values(&["quiz", "won"])
            .inc();
        ANSWERS_TOTAL.with_label_values(&["quiz", "correct"]).inc();
        STALE_ACTIONS_TOTAL.inc();
        SESSIONS_SWEPT_TOTAL.inc_by(2);
    }
}
