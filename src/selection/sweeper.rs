use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::cache::SelectionCache;

/// Run [`SelectionCache::sweep`] every `period` until the handle is aborted
pub fn spawn_sweeper(cache: Arc<SelectionCache>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let stats = cache.sweep();
            if stats.expired > 0 || stats.evicted > 0 {
                info!(
                    expired = stats.expired,
                    evicted = stats.evicted,
                    remaining = cache.len(),
                    "Selection cache swept"
                );
            } else {
                debug!(remaining = cache.len(), "Selection cache sweep: nothing to do");
            }
        }
    })
}
