// Background sweep of idle sessions. Layered on top of the store; the core
// state machine does not depend on it.

use std::sync::Arc;

use crate::api::EngineMap;
use crate::metrics;

/// How often the sweeper wakes up.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Spawn a background task that drops sessions idle longer than `max_idle`.
pub fn spawn_idle_sweeper(games: Arc<EngineMap>, max_idle: chrono::Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(SWEEP_INTERVAL_SECS)).await;

            for (name, engine) in games.iter() {
                let removed = engine.store().sweep_idle(max_idle);
                if removed > 0 {
                    metrics::SESSIONS_SWEPT_TOTAL.inc_by(removed as u64);
                    tracing::info!(
                        catalog = %name,
                        removed,
                        "Swept idle sessions"
                    );
                }
            }
        }
    });
}
