// Serialize each snapshot once and share the frame across all sockets.

use crate::domain::Snapshot;
use crate::interface_adapters::protocol::{ServerMessage, SnapshotDto};

use axum::extract::ws::Utf8Bytes;
use parking_lot::Mutex;

/// Most recent serialized snapshot frame, keyed by tick.
///
/// Subscribers on the same tick reuse one `Utf8Bytes`; a subscriber still
/// working through older ticks serializes those itself.
#[derive(Default)]
pub struct SnapshotFrames {
    latest: Mutex<Option<(u64, Utf8Bytes)>>,
}

impl SnapshotFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self, snapshot: &Snapshot) -> Result<Utf8Bytes, serde_json::Error> {
        let mut latest = self.latest.lock();
        if let Some((tick, bytes)) = latest.as_ref() {
            if *tick == snapshot.tick {
                return Ok(bytes.clone());
            }
        }

        let msg = ServerMessage::Snapshot(SnapshotDto::from(snapshot));
        let bytes = Utf8Bytes::from(serde_json::to_string(&msg)?);
        if latest.as_ref().is_none_or(|(tick, _)| *tick < snapshot.tick) {
            *latest = Some((snapshot.tick, bytes.clone()));
        }
        Ok(bytes)
    }
}
