use chrono::Utc;
use skybook_booking::ExpirySweeper;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Run the expiry sweep every `period_seconds` until the runtime shuts down
pub fn start_expiry_worker(sweeper: Arc<ExpirySweeper>, period_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(period_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry worker started, sweeping every {}s", period_seconds);

        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.sweep(Utc::now()).await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    })
}
