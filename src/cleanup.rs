//! Scheduled cleanup of expired refresh credentials.
//!
//! Lookups already treat expired records as absent, so this only bounds
//! storage size.

use crate::db::Database;
use crate::jwt::now_secs;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of deleted credentials.
pub async fn run_cleanup(db: &Database) -> u64 {
    let now = match now_secs() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Failed to read clock for cleanup");
            return 0;
        }
    };

    match db.credentials().delete_expired(now).await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired refresh credentials", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to clean up expired refresh credentials: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
