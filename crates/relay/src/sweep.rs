use std::time::Duration;

use {
    tokio::time::MissedTickBehavior,
    tracing::{info, warn},
};

use {babelink_common::now_ts, babelink_store::MappingStore};

/// Periodically purge translation mappings older than the retention window.
/// Runs forever; spawn it alongside the event loop. The retention window is
/// deliberately much longer than the edit window, so reply threading keeps
/// working on older messages.
pub async fn retention_sweep(mappings: MappingStore, retention_secs: i64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match mappings.purge_older_than(now_ts() - retention_secs).await {
            Ok(0) => {},
            Ok(purged) => info!(purged, "mapping retention sweep"),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
    }
}
