// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Ring buffer store
//!
//! One bounded buffer per channel behind a single reader/writer lock. A
//! merge or an import holds the write lock for the whole batch; snapshots
//! hold the read lock while copying, so analytics never see a buffer with a
//! sample half added or evicted.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use telesim::{ChannelKey, DataPoint, Reading};
use tracing::{debug, error};

use crate::error::StoreIntegrityError;
use crate::ring_buffer::RingBuffer;

/// Copy of one channel's buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSnapshot {
    pub key: ChannelKey,
    pub unit: String,
    /// Oldest first
    pub points: Vec<DataPoint>,
}

/// Result of merging one fetch into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Readings newer than the channel's last sample
    pub appended: usize,
    /// Readings already seen (same or older timestamp)
    pub skipped: usize,
    /// Channels observed for the first time
    pub new_channels: usize,
}

#[derive(Debug)]
struct Stream {
    unit: String,
    buffer: RingBuffer<DataPoint>,
}

/// Per-channel bounded history shared by the fetch loop and its readers.
#[derive(Debug)]
pub struct RingBufferStore {
    capacity: NonZeroUsize,
    streams: RwLock<HashMap<ChannelKey, Stream>>,
}

impl RingBufferStore {
    pub fn new(capacity: usize) -> Result<Self, StoreIntegrityError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(StoreIntegrityError::ZeroCapacity)?;
        Ok(Self {
            capacity,
            streams: RwLock::new(HashMap::new()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ChannelKey, Stream>> {
        self.streams.read().unwrap_or_else(|poisoned| {
            error!("Ring buffer store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ChannelKey, Stream>> {
        self.streams.write().unwrap_or_else(|poisoned| {
            error!("Ring buffer store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Append every reading strictly newer than its channel's last sample.
    ///
    /// Buffers are created on the first reading of a channel. Replaying the
    /// same fetch twice appends nothing the second time.
    pub fn merge<I>(&self, readings: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut outcome = MergeOutcome::default();
        let mut streams = self.write();

        for reading in readings {
            let key = reading.key();
            let stream = streams.entry(key).or_insert_with(|| {
                outcome.new_channels += 1;
                Stream {
                    unit: reading.unit.clone(),
                    buffer: RingBuffer::new(self.capacity),
                }
            });

            let newer = stream
                .buffer
                .last()
                .map_or(true, |last| reading.timestamp > last.timestamp);
            if newer {
                stream.unit = reading.unit.clone();
                stream.buffer.push(reading.point());
                outcome.appended += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        debug!(
            appended = outcome.appended,
            skipped = outcome.skipped,
            new_channels = outcome.new_channels,
            "Merged readings"
        );
        outcome
    }

    pub fn snapshot(&self, key: &ChannelKey) -> Option<StreamSnapshot> {
        self.read().get(key).map(|s| StreamSnapshot {
            key: key.clone(),
            unit: s.unit.clone(),
            points: s.buffer.to_vec(),
        })
    }

    /// Copies of every buffer, ordered by key, under one read lock.
    pub fn snapshot_all(&self) -> Vec<StreamSnapshot> {
        let streams = self.read();
        let mut out: Vec<StreamSnapshot> = streams
            .iter()
            .map(|(key, s)| StreamSnapshot {
                key: key.clone(),
                unit: s.unit.clone(),
                points: s.buffer.to_vec(),
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn keys(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Most recent sample of a channel.
    pub fn latest(&self, key: &ChannelKey) -> Option<Reading> {
        let streams = self.read();
        let stream = streams.get(key)?;
        let point = stream.buffer.last()?;
        Some(Reading {
            device_id: key.device_id.clone(),
            data_name: key.data_name.clone(),
            value: point.value.clone(),
            unit: stream.unit.clone(),
            timestamp: point.timestamp,
        })
    }

    /// Most recent sample of every channel, ordered by key.
    pub fn latest_all(&self) -> Vec<Reading> {
        self.keys().iter().filter_map(|k| self.latest(k)).collect()
    }

    pub fn len(&self, key: &ChannelKey) -> usize {
        self.read().get(key).map_or(0, |s| s.buffer.len())
    }

    pub fn total_samples(&self) -> usize {
        self.read().values().map(|s| s.buffer.len()).sum()
    }

    pub fn channel_count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every buffer.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Drop the buffers of one device, returning how many were removed.
    pub fn clear_device(&self, device_id: &str) -> usize {
        let mut streams = self.write();
        let before = streams.len();
        streams.retain(|key, _| key.device_id != device_id);
        before - streams.len()
    }

    pub fn clear_channel(&self, key: &ChannelKey) -> bool {
        self.write().remove(key).is_some()
    }

    /// Replace the addressed buffers with imported contents.
    ///
    /// Every stream must be strictly increasing in time, the same order a
    /// merge produces, and is checked before anything changes;
    /// lists longer than the capacity keep their newest samples.
    pub fn replace<I>(&self, imported: I) -> Result<usize, StoreIntegrityError>
    where
        I: IntoIterator<Item = StreamSnapshot>,
    {
        let imported: Vec<StreamSnapshot> = imported.into_iter().collect();
        for stream in &imported {
            check_order(stream).map_err(|e| {
                error!(channel = %stream.key, error = %e, "Rejected import");
                e
            })?;
        }

        let mut streams = self.write();
        let count = imported.len();
        for snapshot in imported {
            let mut buffer = RingBuffer::new(self.capacity);
            buffer.replace(snapshot.points);
            streams.insert(
                snapshot.key,
                Stream {
                    unit: snapshot.unit,
                    buffer,
                },
            );
        }
        Ok(count)
    }
}

impl Default for RingBufferStore {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::MIN.saturating_add(telesim::DEFAULT_BUFFER_CAPACITY - 1),
            streams: RwLock::new(HashMap::new()),
        }
    }
}

fn check_order(stream: &StreamSnapshot) -> Result<(), StoreIntegrityError> {
    for (index, pair) in stream.points.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(StoreIntegrityError::OutOfOrder {
                key: stream.key.clone(),
                index: index + 1,
                timestamp: pair[1].timestamp,
            });
        }
    }
    Ok(())
}
