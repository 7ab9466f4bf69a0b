// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Export and import of buffered history
//!
//! The JSON document maps each device to its channels and each channel to
//! its retained points, oldest first:
//!
//! ```json
//! {
//!   "export_timestamp": "2024-06-01T12:00:00Z",
//!   "streams": {
//!     "sensor_001": {
//!       "temperature": {
//!         "unit": "°C",
//!         "points": [{ "timestamp": "2024-06-01T11:59:55Z", "value": 21.4 }]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Importing a document replaces the buffers of the channels it names.
//! Channels it does not name are left alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use telesim::{ChannelKey, DataPoint};

use crate::error::Result;
use crate::store::StreamSnapshot;

/// Restricts an export to one device or one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilter {
    pub device_id: Option<String>,
    pub data_name: Option<String>,
}

impl ExportFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            data_name: None,
        }
    }

    pub fn channel(key: &ChannelKey) -> Self {
        Self {
            device_id: Some(key.device_id.clone()),
            data_name: Some(key.data_name.clone()),
        }
    }

    pub fn matches(&self, key: &ChannelKey) -> bool {
        self.device_id.as_deref().map_or(true, |d| d == key.device_id)
            && self.data_name.as_deref().map_or(true, |n| n == key.data_name)
    }
}

/// One channel's retained history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedStream {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub points: Vec<DataPoint>,
}

/// Serializable copy of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub streams: BTreeMap<String, BTreeMap<String, ExportedStream>>,
}

impl ExportDocument {
    pub fn from_snapshots<I>(snapshots: I, filter: &ExportFilter, export_timestamp: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = StreamSnapshot>,
    {
        let mut streams: BTreeMap<String, BTreeMap<String, ExportedStream>> = BTreeMap::new();
        for snapshot in snapshots.into_iter().filter(|s| filter.matches(&s.key)) {
            streams.entry(snapshot.key.device_id).or_default().insert(
                snapshot.key.data_name,
                ExportedStream {
                    unit: snapshot.unit,
                    points: snapshot.points,
                },
            );
        }
        Self {
            export_timestamp,
            streams,
        }
    }

    /// Flatten into per-channel snapshots, ordered by key.
    pub fn into_snapshots(self) -> Vec<StreamSnapshot> {
        self.streams
            .into_iter()
            .flat_map(|(device_id, channels)| {
                channels.into_iter().map(move |(data_name, stream)| StreamSnapshot {
                    key: ChannelKey::new(device_id.clone(), data_name),
                    unit: stream.unit,
                    points: stream.points,
                })
            })
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.streams.values().map(BTreeMap::len).sum()
    }

    pub fn sample_count(&self) -> usize {
        self.streams
            .values()
            .flat_map(BTreeMap::values)
            .map(|s| s.points.len())
            .sum()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// One row per point: `device_id,data_name,timestamp,value,unit`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["device_id", "data_name", "timestamp", "value", "unit"])?;
        for (device_id, channels) in &self.streams {
            for (data_name, stream) in channels {
                for point in &stream.points {
                    csv.write_record([
                        device_id.as_str(),
                        data_name.as_str(),
                        &point.timestamp.to_rfc3339(),
                        &point.value.to_string(),
                        stream.unit.as_str(),
                    ])?;
                }
            }
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_csv(BufWriter::new(File::create(path)?))
    }
}
