use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::limits::COMPACT_CHECK_INTERVAL_SECS;
use crate::observability;
use crate::store::LogStore;

/// Background task that rewrites the record log once enough appends pile up.
pub async fn run_compactor(store: Arc<LogStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(COMPACT_CHECK_INTERVAL_SECS));
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}

/// Returns true when a compaction ran.
pub async fn compact_if_needed(store: &LogStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold.max(1) {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compacted record log after {appends} appends");
            true
        }
        Err(e) => {
            error!("compaction failed: {e}");
            false
        }
    }
}
