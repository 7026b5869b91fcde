use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use trailhead_booking::ExpirySweeper;

use crate::state::ResponseCache;

/// Periodic housekeeping: expires abandoned pending bookings (when a policy
/// is configured) and drops stale cache entries.
pub async fn start_housekeeping_worker(
    sweeper: Option<Arc<ExpirySweeper>>,
    cache: Arc<ResponseCache>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        expiry_enabled = sweeper.is_some(),
        "Housekeeping worker started, running every {:?}", every
    );

    loop {
        ticker.tick().await;

        if let Some(sweeper) = &sweeper {
            if let Err(e) = sweeper.sweep().await {
                error!("Failed to expire pending bookings: {}", e);
            }
        }

        let purged = cache.purge_expired();
        if purged > 0 {
            debug!("Purged {} expired cache entries", purged);
        }
    }
}
