//! Background task that cancels claimable donations once their expiry passes.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use annsetu_core::DonationService;

/// Run the sweep every `interval` until `shutdown` fires.
pub async fn run(service: DonationService, interval: Duration, shutdown: CancellationToken) {
    info!("Expiry sweeper starting, interval {}s", interval.as_secs());

    loop {
        sweep_once(&service).await;

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Expiry sweeper stopped");
}

/// Perform a single sweep. Errors are logged and retried next round.
pub async fn sweep_once(service: &DonationService) -> usize {
    match service.expire_overdue(Utc::now()).await {
        Ok(expired) => {
            if !expired.is_empty() {
                info!("Expired {} donation(s): {expired:?}", expired.len());
            }
            expired.len()
        }
        Err(e) => {
            error!("Expiry sweep error: {e}");
            0
        }
    }
}
