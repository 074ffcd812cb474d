use super::EngineHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Periodically replaces the container set with a fresh fetch
pub struct RefreshLoop {
    handle: EngineHandle,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(handle: EngineHandle, interval: Duration) -> Self {
        Self { handle, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Starting inventory refresh loop"
        );

        // The initial set was loaded at construction
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.handle.refresh_now().await {
                        debug!(error = %e, "Scheduled refresh failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down inventory refresh loop");
                    break;
                }
            }
        }
    }
}
