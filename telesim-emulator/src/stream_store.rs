// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Server-side stream store
//!
//! Holds the latest reading and a short history per channel. Channel tasks
//! publish into it and the transport reads from it. Each reading is
//! replaced as a whole under the write lock, so readers never observe a
//! timestamp from one tick paired with the value of another.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use telesim::{ChannelKey, Reading};
use tracing::error;

#[derive(Debug)]
struct Slot {
    latest: Reading,
    history: VecDeque<Reading>,
}

/// Latest readings per channel, safe to share between tasks.
#[derive(Debug)]
pub struct StreamStore {
    history_len: usize,
    slots: RwLock<HashMap<ChannelKey, Slot>>,
}

impl StreamStore {
    /// Create a store keeping `history_len` readings per channel (at least one).
    pub fn new(history_len: usize) -> Self {
        Self {
            history_len: history_len.max(1),
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ChannelKey, Slot>> {
        self.slots.read().unwrap_or_else(|poisoned| {
            error!("Stream store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ChannelKey, Slot>> {
        self.slots.write().unwrap_or_else(|poisoned| {
            error!("Stream store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record a new reading for its channel.
    pub fn publish(&self, reading: Reading) {
        let key = reading.key();
        let mut slots = self.write();
        match slots.get_mut(&key) {
            Some(slot) => {
                if slot.history.len() >= self.history_len {
                    slot.history.pop_front();
                }
                slot.history.push_back(reading.clone());
                slot.latest = reading;
            }
            None => {
                let mut history = VecDeque::with_capacity(self.history_len);
                history.push_back(reading.clone());
                slots.insert(
                    key,
                    Slot {
                        latest: reading,
                        history,
                    },
                );
            }
        }
    }

    /// Latest reading of every channel, ordered by key.
    pub fn latest_all(&self) -> Vec<Reading> {
        let slots = self.read();
        let mut readings: Vec<Reading> = slots.values().map(|s| s.latest.clone()).collect();
        readings.sort_by(|a, b| (&a.device_id, &a.data_name).cmp(&(&b.device_id, &b.data_name)));
        readings
    }

    /// Latest readings of one device, ordered by channel name.
    pub fn latest_for_device(&self, device_id: &str) -> Vec<Reading> {
        let slots = self.read();
        let mut readings: Vec<Reading> = slots
            .iter()
            .filter(|(key, _)| key.device_id == device_id)
            .map(|(_, s)| s.latest.clone())
            .collect();
        readings.sort_by(|a, b| a.data_name.cmp(&b.data_name));
        readings
    }

    pub fn latest(&self, key: &ChannelKey) -> Option<Reading> {
        self.read().get(key).map(|s| s.latest.clone())
    }

    /// Recent readings of one channel, oldest first.
    pub fn history(&self, key: &ChannelKey) -> Vec<Reading> {
        self.read()
            .get(key)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.read().len()
    }

    pub fn history_len(&self) -> usize {
        self.history_len
    }
}

impl Default for StreamStore {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use telesim::Value;

    fn reading(device: &str, name: &str, secs: i64, value: f64) -> Reading {
        Reading {
            device_id: device.to_string(),
            data_name: name.to_string(),
            value: Value::Float(value),
            unit: "u".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_latest_replaces_previous() {
        let store = StreamStore::new(4);
        store.publish(reading("a", "t", 0, 1.0));
        store.publish(reading("a", "t", 1, 2.0));

        let key = ChannelKey::new("a", "t");
        assert_eq!(store.latest(&key).unwrap().value, Value::Float(2.0));
        assert_eq!(store.history(&key).len(), 2);
        assert_eq!(store.channel_count(), 1);
    }

    #[test]
    fn test_history_bounded() {
        let store = StreamStore::new(3);
        for i in 0..10 {
            store.publish(reading("a", "t", i, i as f64));
        }
        let history = store.history(&ChannelKey::new("a", "t"));
        let values: Vec<f64> = history.iter().map(|r| r.value.as_f64().unwrap()).collect();
        assert_eq!(values, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_device_filter_and_order() {
        let store = StreamStore::default();
        store.publish(reading("b", "x", 0, 1.0));
        store.publish(reading("a", "z", 0, 1.0));
        store.publish(reading("a", "y", 0, 1.0));

        let all: Vec<String> = store.latest_all().iter().map(|r| r.key().to_string()).collect();
        assert_eq!(all, vec!["a/y", "a/z", "b/x"]);

        let device_a = store.latest_for_device("a");
        assert_eq!(device_a.len(), 2);
        assert!(store.latest_for_device("missing").is_empty());
        assert!(store.latest(&ChannelKey::new("a", "missing")).is_none());
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(StreamStore::new(8));
        let mut handles = Vec::new();
        for w in 0..4 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    store.publish(reading("dev", &format!("ch{}", w), i, i as f64));
                }
            }));
        }
        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    for r in store.latest_all() {
                        let secs = (r.timestamp - Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
                            .num_seconds();
                        // value and timestamp come from the same publish
                        assert_eq!(r.value.as_f64().unwrap(), secs as f64);
                    }
                }
            })
        };
        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(store.channel_count(), 4);
    }
}
