use super::{SyncError, SyncJob};
use crate::context::CallContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run `job` now and then every `interval` until `shutdown` is cancelled.
///
/// Passes run on the blocking pool, one at a time. A failed pass is logged
/// and the next tick runs a fresh pass. Cancelling `shutdown` also cancels
/// the pass in flight, which then stops at its next check. Returns the
/// number of passes that completed successfully.
pub async fn run_periodically(
    job: Arc<SyncJob>,
    interval: Duration,
    shutdown: CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut succeeded = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Periodic pricing sync received shutdown signal");
                break;
            }
            _ = ticker.tick() => {}
        }

        let ctx = CallContext::new(shutdown.child_token());
        let pass_job = Arc::clone(&job);
        let result = tokio::task::spawn_blocking(move || pass_job.run(&ctx)).await;

        match result {
            Ok(Ok(_)) => succeeded += 1,
            Ok(Err(SyncError::Interrupted(_))) if shutdown.is_cancelled() => {
                info!("Pricing sync pass stopped by shutdown");
                break;
            }
            // Already logged by the job with its partial counters
            Ok(Err(_)) => {}
            Err(e) => error!("Pricing sync pass panicked: {}", e),
        }
    }

    info!("Periodic pricing sync stopped after {} successful pass(es)", succeeded);
    succeeded
}
