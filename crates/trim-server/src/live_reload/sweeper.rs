//! Periodic reclamation of unused file watches.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::pool::WatcherPool;

/// Spawn a task that sweeps `pool` every `period`.
///
/// The first sweep runs one full period after the call.
pub(crate) fn spawn_sweeper(pool: Arc<WatcherPool>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let closed = pool.sweep();
            if closed > 0 {
                tracing::info!(closed, "Swept unused file watches");
            } else {
                tracing::trace!("Sweep found nothing to close");
            }
        }
    })
}
