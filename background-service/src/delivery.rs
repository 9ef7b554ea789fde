//! Delivery stage: relay the batch, record what made it, persist once.

use crate::shutdown::ShutdownSignal;
use memerelay_core::{
    CandidatePost, CoreError, Deliverer, DeliveryMethod, ErrorExt, ErrorRecovery,
    RecoveryStrategy, RunStats,
};
use seen_store::SeenStore;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub sent: u64,
    pub failed: u64,
    /// Shutdown stopped the batch before every post was attempted.
    pub interrupted: bool,
    /// The seen-set was written at the end of the batch.
    pub persisted: bool,
}

/// Sleep for `duration` unless shutdown is requested first. Returns false
/// when interrupted.
async fn pause(duration: Duration, shutdown: &mut ShutdownSignal) -> bool {
    if duration.is_zero() {
        return !shutdown.is_triggered();
    }
    tokio::select! {
        _ = sleep(duration) => true,
        _ = shutdown.wait() => false,
    }
}

/// Deliver one post, retrying transient failures the way the error's
/// recovery strategy asks for.
async fn deliver_with_recovery<D: Deliverer>(
    deliverer: &D,
    post: &CandidatePost,
    shutdown: &mut ShutdownSignal,
) -> Result<DeliveryMethod, CoreError> {
    let mut attempt = 1;
    loop {
        let error = match deliverer.deliver(post).await {
            Ok(method) => return Ok(method),
            Err(error) => error,
        };

        let RecoveryStrategy::RetryWithBackoff {
            max_attempts,
            initial_delay,
            max_delay,
        } = ErrorRecovery::determine_strategy(&error)
        else {
            return Err(error);
        };
        if attempt >= max_attempts {
            return Err(error);
        }

        let delay = initial_delay
            .saturating_mul(1 << (attempt - 1).min(16))
            .min(max_delay);
        warn!(
            "Delivering {} failed ({}), retrying in {:?} (attempt {}/{})",
            post.id,
            error,
            delay,
            attempt + 1,
            max_attempts
        );
        if !pause(delay, shutdown).await {
            return Err(error);
        }
        attempt += 1;
    }
}

/// Deliver `posts` in order.
///
/// Each success is added to the seen-set right away; each failure is counted
/// and the batch moves on. The seen-set is saved once at the end; a failed save
/// is recorded and left for the next run since the ids stay in memory.
pub async fn deliver_batch<D: Deliverer>(
    posts: &[CandidatePost],
    deliverer: &D,
    seen: &mut SeenStore,
    stats: &mut RunStats,
    send_delay: Duration,
    shutdown: &ShutdownSignal,
) -> DeliveryReport {
    let mut shutdown = shutdown.clone();
    let mut report = DeliveryReport::default();

    for (index, post) in posts.iter().enumerate() {
        let proceed = if index == 0 {
            !shutdown.is_triggered()
        } else {
            pause(send_delay, &mut shutdown).await
        };
        if !proceed {
            info!(
                "Shutdown requested, leaving {} posts for a later run",
                posts.len() - index
            );
            report.interrupted = true;
            break;
        }

        report.attempted += 1;
        match deliver_with_recovery(deliverer, post, &mut shutdown).await {
            Ok(method) => {
                seen.insert(post.id.clone());
                stats.record_sent(1);
                report.sent += 1;
                info!("Delivered {} from r/{} as {}", post.id, post.source, method);
            }
            Err(e) => {
                e.log_error();
                stats.record_failed(format!("post {}: {}", post.id, e));
                report.failed += 1;
            }
        }
    }

    if seen.is_dirty() {
        match seen.save() {
            Ok(()) => {
                report.persisted = true;
                debug!("Seen-set saved ({} ids)", seen.len());
            }
            Err(e) => {
                let e = CoreError::from(e);
                error!("Could not save seen-set, will retry after the next run: {}", e);
                stats.record_error(&e);
            }
        }
    }

    report
}
