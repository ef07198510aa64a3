//! In-process recurring sweep
//!
//! Deployments without an external scheduler hitting `POST /api/sla/sweep`
//! can run the sweep from here instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::engine::SlaEngine;

/// Spawn a task that sweeps every organization once per `interval`
pub fn spawn_sla_scheduler(
    engine: Arc<SlaEngine>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    info!("Starting SLA scheduler (interval: {:?})", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match engine.sweep_all().await {
                Ok(summary) if summary.inserted > 0 => info!(
                    inserted = summary.inserted,
                    notified = summary.notified,
                    "scheduled SLA sweep"
                ),
                Ok(_) => {}
                Err(e) => error!("Scheduled SLA sweep failed: {}", e),
            }
        }
    })
}
