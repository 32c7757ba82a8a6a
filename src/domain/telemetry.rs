//! Bounded, auto-evicting history of delivered snapshots and readings.
//!
//! [`TelemetryBuffer`] never holds more than `capacity` entries. Entries are
//! kept in sequence (tick) order; appending to a full buffer evicts the
//! oldest entry first.

use super::state::Snapshot;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEntry<T> {
    pub seq: u64,
    pub value: T,
}

/// Outcome of [`TelemetryBuffer::append`].
#[derive(Debug, PartialEq)]
pub enum Appended<T> {
    Stored,
    Evicted(TelemetryEntry<T>),
    Duplicate,
    // Older than everything retained in a full buffer.
    TooOld,
}

#[derive(Debug, Clone)]
pub struct TelemetryBuffer<T> {
    entries: VecDeque<TelemetryEntry<T>>,
    capacity: usize,
}

impl<T: Clone> TelemetryBuffer<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "telemetry capacity must be > 0");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, seq: u64, value: T) -> Appended<T> {
        let entry = TelemetryEntry { seq, value };

        // Fast path: in-order arrival.
        let in_order = self.entries.back().is_none_or(|last| last.seq < seq);
        if in_order {
            let evicted = self.evict_if_full();
            self.entries.push_back(entry);
            return evicted.map_or(Appended::Stored, Appended::Evicted);
        }

        let idx = self.entries.partition_point(|e| e.seq < seq);
        if self.entries.get(idx).is_some_and(|e| e.seq == seq) {
            return Appended::Duplicate;
        }
        if idx == 0 && self.entries.len() == self.capacity {
            return Appended::TooOld;
        }

        self.entries.insert(idx, entry);
        if self.entries.len() > self.capacity {
            return self
                .entries
                .pop_front()
                .map_or(Appended::Stored, Appended::Evicted);
        }
        Appended::Stored
    }

    fn evict_if_full(&mut self) -> Option<TelemetryEntry<T>> {
        if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Ordered copy of the retained entries, oldest first.
    pub fn snapshot_history(&self) -> Vec<TelemetryEntry<T>> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&TelemetryEntry<T>> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A scalar reading as stored in a per-sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub value: f64,
}

/// Whole-snapshot history plus one scalar channel per sensor id.
#[derive(Debug)]
pub struct TelemetryHistory {
    capacity: usize,
    snapshots: TelemetryBuffer<Arc<Snapshot>>,
    channels: BTreeMap<String, TelemetryBuffer<Sample>>,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snapshots: TelemetryBuffer::new(capacity),
            channels: BTreeMap::new(),
        }
    }

    pub fn ingest(&mut self, snapshot: Arc<Snapshot>) {
        for reading in &snapshot.readings {
            self.channels
                .entry(reading.sensor_id.clone())
                .or_insert_with(|| TelemetryBuffer::new(self.capacity))
                .append(
                    snapshot.tick,
                    Sample {
                        timestamp_ms: snapshot.timestamp_ms,
                        value: reading.value,
                    },
                );
        }
        self.evict_stale_channels(snapshot.tick);
        self.snapshots.append(snapshot.tick, snapshot);
    }

    // A channel silent for a full window (sensor removed or disabled) is dropped,
    // so the channel count stays bounded by the sensors seen within that window.
    fn evict_stale_channels(&mut self, tick: u64) {
        let window = self.capacity as u64;
        self.channels.retain(|_, buffer| {
            buffer
                .latest()
                .is_some_and(|last| last.seq.saturating_add(window) > tick)
        });
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshots(&self) -> &TelemetryBuffer<Arc<Snapshot>> {
        &self.snapshots
    }

    pub fn channel(&self, name: &str) -> Option<&TelemetryBuffer<Sample>> {
        self.channels.get(name)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}
