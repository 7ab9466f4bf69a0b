// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Emulator configuration documents
//!
//! Loading checks the document structure (devices, ids, channel names).
//! Individual channel definitions are validated when their channel starts,
//! so one bad channel does not keep the rest of the fleet from running.
//! [`EmulatorConfig::validate`] runs the strict check over everything.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use telesim::{ChannelConfig, ChannelDefinition, ChannelKey, ConfigError, Value};

fn default_history_len() -> usize {
    32
}

/// Device role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Sensor,
    Actuator,
    Controller,
    Gateway,
}

/// One emulated device and its channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    pub data_configs: Vec<ChannelDefinition>,
    /// Free-form metadata (location, manufacturer, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DeviceDefinition {
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            device_type,
            data_configs: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_channel(mut self, def: ChannelDefinition) -> Self {
        self.data_configs.push(def);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelDefinition> {
        self.data_configs.iter().find(|c| c.name == name)
    }

    pub fn data_names(&self) -> Vec<String> {
        self.data_configs.iter().map(|c| c.name.clone()).collect()
    }
}

/// Full emulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    pub config_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub devices: Vec<DeviceDefinition>,
}

impl EmulatorConfig {
    /// Parse a JSON document and check its structure.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate_structure()?;
        Ok(config)
    }

    /// Parse a YAML document and check its structure.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate_structure()?;
        Ok(config)
    }

    /// Read a document from disk: YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Devices present, ids unique, each device with uniquely named channels.
    pub fn validate_structure(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.device_id.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.device_id.clone()));
            }
            if device.data_configs.is_empty() {
                return Err(ConfigError::NoChannels(device.device_id.clone()));
            }
            let mut names = HashSet::new();
            for channel in &device.data_configs {
                if !names.insert(channel.name.as_str()) {
                    return Err(ConfigError::DuplicateChannel {
                        device: device.device_id.clone(),
                        channel: channel.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Structure plus every channel definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_structure()?;
        for (_, result) in self.channel_configs() {
            result?;
        }
        Ok(())
    }

    /// Every channel with its validation outcome, in document order.
    pub fn channel_configs(&self) -> Vec<(ChannelKey, Result<ChannelConfig, ConfigError>)> {
        self.devices
            .iter()
            .flat_map(|device| {
                device.data_configs.iter().map(move |def| {
                    (
                        ChannelKey::new(&device.device_id, &def.name),
                        ChannelConfig::try_from(def.clone()),
                    )
                })
            })
            .collect()
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceDefinition> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.device_id.clone()).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.devices.iter().map(|d| d.data_configs.len()).sum()
    }

    /// Built-in configuration used when no document is supplied.
    pub fn demo() -> Self {
        let environment = DeviceDefinition::new("sensor_001", "Environmental Sensor", DeviceType::Sensor)
            .with_channel(
                ChannelDefinition::float("temperature", -10.0, 40.0)
                    .with_frequency(1.0)
                    .with_change_step(0.5)
                    .with_noise(0.02)
                    .with_drift(0.001)
                    .with_initial(Value::Float(21.0))
                    .with_unit("°C"),
            )
            .with_channel(
                ChannelDefinition::float("humidity", 20.0, 90.0)
                    .with_frequency(0.5)
                    .with_change_step(1.0)
                    .with_noise(0.01)
                    .with_initial(Value::Float(45.0))
                    .with_unit("%"),
            )
            .with_channel(
                ChannelDefinition::float("pressure", 980.0, 1040.0)
                    .with_frequency(0.2)
                    .with_change_step(0.3)
                    .with_initial(Value::Float(1013.0))
                    .with_unit("hPa"),
            )
            .with_metadata("location", "Building A, Floor 2")
            .with_metadata("manufacturer", "Telesim");

        let door = DeviceDefinition::new("actuator_001", "Door Controller", DeviceType::Actuator)
            .with_channel(
                ChannelDefinition::boolean("door_open")
                    .with_frequency(1.0)
                    .with_change_step(0.05),
            )
            .with_channel(
                ChannelDefinition::string("status")
                    .with_states(["idle", "running", "maintenance", "error"])
                    .with_frequency(0.5)
                    .with_change_step(0.1),
            )
            .with_channel(
                ChannelDefinition::integer("valve_position", 0.0, 100.0)
                    .with_frequency(0.5)
                    .with_change_step(5.0)
                    .with_unit("%"),
            )
            .with_metadata("location", "Building A, Entrance");

        Self {
            config_name: "demo".to_string(),
            description: Some("Built-in demonstration fleet".to_string()),
            devices: vec![environment, door],
        }
    }
}

/// Runtime settings that are not part of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorSettings {
    /// Base seed for reproducible runs; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Readings kept per channel in the stream store
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            seed: None,
            history_len: default_history_len(),
        }
    }
}

impl EmulatorSettings {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }
}
