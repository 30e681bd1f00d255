use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Runs `tick` every `period` until `shutdown` is cancelled.
///
/// The loop only waits on the timer or the token, so a tick that has
/// started always runs to completion before the task exits. Ticks missed
/// while a slow tick was running are skipped, not replayed.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;
        log::info!("{} started, period {:?}", name, period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => tick().await,
            }
        }

        log::info!("{} stopped", name);
    })
}
