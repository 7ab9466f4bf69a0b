// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! JSON bodies exchanged over the transport.
//!
//! The emulator serves these shapes and the client parses them, so both
//! sides share one definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sample::{ChannelKey, DataPoint, Sample};
use crate::value::Value;

/// Latest value of one channel, with its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub data_name: String,
    pub value: Value,
    #[serde(default)]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn from_sample(sample: &Sample, unit: impl Into<String>) -> Self {
        Self {
            device_id: sample.key.device_id.clone(),
            data_name: sample.key.data_name.clone(),
            value: sample.value.clone(),
            unit: unit.into(),
            timestamp: sample.timestamp,
        }
    }

    pub fn key(&self) -> ChannelKey {
        ChannelKey::new(&self.device_id, &self.data_name)
    }

    pub fn point(&self) -> DataPoint {
        DataPoint {
            timestamp: self.timestamp,
            value: self.value.clone(),
        }
    }

    pub fn body(&self) -> ReadingBody {
        ReadingBody {
            value: self.value.clone(),
            unit: self.unit.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// A reading nested under its device and channel names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingBody {
    pub value: Value,
    #[serde(default)]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl ReadingBody {
    fn into_reading(self, device_id: &str, data_name: &str) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            data_name: data_name.to_string(),
            value: self.value,
            unit: self.unit,
            timestamp: self.timestamp,
        }
    }
}

/// `GET /data`: latest reading of every channel, grouped by device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub data: BTreeMap<String, BTreeMap<String, ReadingBody>>,
    pub timestamp: DateTime<Utc>,
}

impl DataSnapshot {
    pub fn from_readings<I>(readings: I, timestamp: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut data: BTreeMap<String, BTreeMap<String, ReadingBody>> = BTreeMap::new();
        for reading in readings {
            data.entry(reading.device_id.clone())
                .or_default()
                .insert(reading.data_name.clone(), reading.body());
        }
        Self { data, timestamp }
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.data
            .into_iter()
            .flat_map(|(device_id, channels)| {
                channels
                    .into_iter()
                    .map(move |(name, body)| body.into_reading(&device_id, &name))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(BTreeMap::is_empty)
    }
}

/// `GET /data/{device_id}`: latest readings of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub device_id: String,
    pub data: BTreeMap<String, ReadingBody>,
    pub timestamp: DateTime<Utc>,
}

impl DeviceData {
    pub fn into_readings(self) -> Vec<Reading> {
        let device_id = self.device_id;
        self.data
            .into_iter()
            .map(|(name, body)| body.into_reading(&device_id, &name))
            .collect()
    }
}

/// `GET /data/{device_id}/{data_name}`: latest reading of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub device_id: String,
    pub data_type: String,
    pub value: Value,
    #[serde(default)]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl From<Reading> for ChannelData {
    fn from(r: Reading) -> Self {
        Self {
            device_id: r.device_id,
            data_type: r.data_name,
            value: r.value,
            unit: r.unit,
            timestamp: r.timestamp,
        }
    }
}

impl From<ChannelData> for Reading {
    fn from(c: ChannelData) -> Self {
        Self {
            device_id: c.device_id,
            data_name: c.data_type,
            value: c.value,
            unit: c.unit,
            timestamp: c.timestamp,
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(device: &str, name: &str, value: Value) -> Reading {
        Reading {
            device_id: device.to_string(),
            data_name: name.to_string(),
            value,
            unit: "u".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_snapshot_groups_by_device() {
        let now = Utc::now();
        let snapshot = DataSnapshot::from_readings(
            vec![
                reading("a", "temp", Value::Float(1.5)),
                reading("a", "door", Value::Boolean(true)),
                reading("b", "temp", Value::Float(2.5)),
            ],
            now,
        );
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.data["a"].len(), 2);

        let readings = snapshot.into_readings();
        assert_eq!(readings.len(), 3);
        assert!(readings.contains(&reading("b", "temp", Value::Float(2.5))));
    }

    #[test]
    fn test_parse_snapshot_body() {
        let json = r#"{
            "data": {
                "sensor_001": {
                    "temperature": {"value": 21.5, "unit": "°C", "timestamp": "2024-03-01T08:00:00Z"},
                    "status": {"value": "ok", "timestamp": "2024-03-01T08:00:00Z"}
                }
            },
            "timestamp": "2024-03-01T08:00:01Z"
        }"#;
        let snapshot: DataSnapshot = serde_json::from_str(json).unwrap();
        let readings = snapshot.into_readings();
        assert_eq!(readings.len(), 2);
        let status = readings.iter().find(|r| r.data_name == "status").unwrap();
        assert_eq!(status.unit, "");
        assert_eq!(status.key(), ChannelKey::new("sensor_001", "status"));
    }

    #[test]
    fn test_channel_data_names_field_data_type() {
        let body = ChannelData::from(reading("a", "temp", Value::Integer(3)));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data_type"], "temp");
        assert_eq!(Reading::from(body), reading("a", "temp", Value::Integer(3)));
    }

    #[test]
    fn test_reading_from_sample() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let sample = Sample::new(ChannelKey::new("a", "temp"), ts, Value::Float(1.5));
        let published = Reading::from_sample(&sample, "u");
        assert_eq!(published, reading("a", "temp", Value::Float(1.5)));
        assert_eq!(published.point(), sample.point());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = DataSnapshot::from_readings(Vec::new(), Utc::now());
        assert!(snapshot.is_empty());
    }
}
