use crate::interface_adapters::net::frames::SnapshotFrames;
use crate::use_cases::{BroadcastHub, SharedHistory, SimHandle};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    // Requests flowing into the simulation driver.
    pub sim: SimHandle,
    // Snapshot fan-out; each WebSocket owns one subscription.
    pub hub: Arc<BroadcastHub>,
    // Server-side telemetry history for the display routes.
    pub telemetry: SharedHistory,
    // Serialized snapshot shared by every socket on the same tick.
    pub frames: Arc<SnapshotFrames>,
    pub tick_interval: Duration,
}
