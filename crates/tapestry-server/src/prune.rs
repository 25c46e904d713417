use std::time::Duration;

use chrono::Utc;
use tapestry_api::AppState;
use tracing::{info, warn};

/// Background task that drops expired QR login sessions and spent or expired
/// password reset tokens.
pub async fn run_prune_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        let result =
            tokio::task::spawn_blocking(move || db_state.db.prune_expired(Utc::now())).await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Prune: removed {} expired login tokens", count);
                }
            }
            Ok(Err(e)) => warn!("Prune error: {}", e),
            Err(e) => warn!("Prune task panicked: {}", e),
        }
    }
}
