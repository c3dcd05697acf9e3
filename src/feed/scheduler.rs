use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::feed::{ApplyOutcome, FeedService};

/// Drives `FeedService::refresh_now` on a fixed period, starting immediately.
///
/// Failures are logged and counted; the next tick fires regardless. Cancellation
/// is only observed between cycles, so a running cycle always completes.
pub struct RefreshScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    pub fn start(service: Arc<FeedService>, period: Duration, cancel: CancellationToken) -> Self {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            run(service, period, token).await;
        });
        Self { cancel, handle }
    }

    /// Stop ticking and wait for an in-flight cycle to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "refresh task ended abnormally");
        }
    }
}

async fn run(service: Arc<FeedService>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(period_ms = period.as_millis() as u64, "refresh scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match service.refresh_now().await {
            Ok(ApplyOutcome::Snapshot(rows)) => tracing::info!(rows, "snapshot published"),
            Ok(ApplyOutcome::Delta(changes)) => tracing::debug!(changes, "delta published"),
            Ok(ApplyOutcome::Unchanged) => tracing::trace!("no changes"),
            Err(e) => tracing::warn!(error = %e, provider = service.provider_name(), "odds refresh failed"),
        }
    }

    tracing::info!("refresh scheduler stopped");
}
