use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::model::ContentType;
use crate::orchestrator::{BackupOrchestrator, TriggerAck};

/// Fire an incremental backup of `content_type` every `period`, first one
/// period after start. Ticks that land while a cycle is running are dropped.
pub fn spawn_schedule(
    orchestrator: Arc<BackupOrchestrator>,
    content_type: ContentType,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(%content_type, minutes = period.as_secs() / 60, "schedule armed");
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            debug!(%content_type, "scheduled backup due");
            if orchestrator.trigger(content_type, false) == TriggerAck::AlreadyRunning {
                info!(%content_type, "previous cycle still running, skipping tick");
            }
        }
    })
}
