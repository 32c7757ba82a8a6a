// Server-side telemetry recorder fed by an in-process hub subscription.

use super::hub::BroadcastHub;
use crate::domain::TelemetryHistory;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

pub type SharedHistory = Arc<Mutex<TelemetryHistory>>;

/// Appends every published snapshot to `history`, resubscribing if dropped.
pub async fn record_telemetry(hub: Arc<BroadcastHub>, history: SharedHistory) {
    loop {
        let mut subscription = hub.connect();
        hub.activate(subscription.id());
        info!(subscriber_id = subscription.id(), "telemetry recorder subscribed");

        while let Some(snapshot) = subscription.recv().await {
            history.lock().ingest(snapshot);
        }

        // Only reachable when the hub gave up on us.
        warn!(
            subscriber_id = subscription.id(),
            "telemetry recorder fell behind; resubscribing"
        );
        drop(subscription);
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}
