// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel keys, samples and data points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// Identity of one telemetry stream: `(device, data name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub device_id: String,
    pub data_name: String,
}

impl ChannelKey {
    pub fn new(device_id: impl Into<String>, data_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            data_name: data_name.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.data_name)
    }
}

/// A timestamped value without its channel identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// One generated sample. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: ChannelKey,
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl Sample {
    pub fn new(key: ChannelKey, timestamp: DateTime<Utc>, value: Value) -> Self {
        Self {
            key,
            timestamp,
            value,
        }
    }

    pub fn point(&self) -> DataPoint {
        DataPoint {
            timestamp: self.timestamp,
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_channel_key_display_and_order() {
        let a = ChannelKey::new("sensor_001", "humidity");
        let b = ChannelKey::new("sensor_001", "temperature");
        assert_eq!(a.to_string(), "sensor_001/humidity");
        assert!(a < b);
    }

    #[test]
    fn test_sample_point() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        let sample = Sample::new(ChannelKey::new("dev", "temp"), ts, Value::Float(21.5));
        let point = sample.point();
        assert_eq!(point.timestamp, ts);
        assert_eq!(point.value, Value::Float(21.5));
    }
}
