// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Multi-device emulator
//!
//! Owns the configuration, the stream store and the scheduler. Starting the
//! emulator validates each channel on its own: a rejected definition is
//! logged and recorded, and every other channel still starts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use telesim::{ChannelKey, ConfigError, DataKind};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{DeviceType, EmulatorConfig, EmulatorSettings};
use crate::error::{EmulatorError, Result};
use crate::metrics;
use crate::scheduler::{ChannelStatus, Scheduler, SchedulerEvent};
use crate::stream_store::StreamStore;

/// Channel description served by the device routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub data_type: DataKind,
    pub unit: String,
    pub frequency: f64,
    pub status: ChannelStatus,
}

/// Device description served by the device routes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub data_types: Vec<String>,
    pub channels: Vec<ChannelInfo>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// A channel definition rejected at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedChannel {
    pub key: ChannelKey,
    pub error: ConfigError,
}

pub struct Emulator {
    config: EmulatorConfig,
    store: Arc<StreamStore>,
    scheduler: Scheduler,
    rejected: Vec<RejectedChannel>,
    started_at: Option<DateTime<Utc>>,
}

impl Emulator {
    /// Build an emulator; channel failures arrive on the returned receiver.
    pub fn new(
        config: EmulatorConfig,
        settings: EmulatorSettings,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SchedulerEvent>)> {
        config.validate_structure()?;
        let store = Arc::new(StreamStore::new(settings.history_len));
        let (scheduler, events) = Scheduler::new(Arc::clone(&store), settings.seed);
        let emulator = Self {
            config,
            store,
            scheduler,
            rejected: Vec::new(),
            started_at: None,
        };
        Ok((emulator, events))
    }

    /// Start every valid channel that is not already running.
    ///
    /// Returns the number of channels started.
    pub fn start(&mut self) -> usize {
        let mut started = 0;
        self.rejected.clear();

        for (key, outcome) in self.config.channel_configs() {
            match outcome {
                Ok(channel) => match self.scheduler.start(key.clone(), channel) {
                    Ok(()) => started += 1,
                    Err(EmulatorError::ChannelRunning(_)) => {}
                    Err(e) => warn!(channel = %key, error = %e, "Channel not started"),
                },
                Err(error) => {
                    warn!(channel = %key, error = %error, "Channel configuration rejected");
                    self.rejected.push(RejectedChannel { key, error });
                }
            }
        }

        metrics::REJECTED_CHANNELS.set(self.rejected.len() as i64);
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        info!(
            config = %self.config.config_name,
            started,
            rejected = self.rejected.len(),
            "Emulator started"
        );
        started
    }

    /// Stop all channels.
    pub async fn stop(&mut self) {
        self.scheduler.stop_all().await;
        self.started_at = None;
        info!(config = %self.config.config_name, "Emulator stopped");
    }

    /// Stop one channel and start it again from its initial value.
    pub async fn restart_channel(&mut self, key: &ChannelKey) -> Result<()> {
        let def = self
            .config
            .device(&key.device_id)
            .ok_or_else(|| EmulatorError::DeviceNotFound(key.device_id.clone()))?
            .channel(&key.data_name)
            .ok_or_else(|| EmulatorError::ChannelNotFound(key.clone()))?
            .clone();
        let channel = telesim::ChannelConfig::try_from(def)?;

        if self.scheduler.status(key).is_some() {
            self.scheduler.stop(key).await?;
        }
        self.scheduler.start(key.clone(), channel)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.running_count() > 0
    }

    pub fn running_count(&self) -> usize {
        self.scheduler.running_count()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<StreamStore> {
        Arc::clone(&self.store)
    }

    pub fn rejected(&self) -> &[RejectedChannel] {
        &self.rejected
    }

    pub fn channel_status(&self, key: &ChannelKey) -> Option<ChannelStatus> {
        self.scheduler.status(key)
    }

    pub fn statuses(&self) -> Vec<(ChannelKey, ChannelStatus)> {
        self.scheduler.statuses()
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.config.device(device_id).is_some()
    }

    /// Data names declared for a device.
    pub fn data_names(&self, device_id: &str) -> Option<Vec<String>> {
        self.config.device(device_id).map(|d| d.data_names())
    }

    pub fn device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        let device = self.config.device(device_id)?;
        let channels = device
            .data_configs
            .iter()
            .map(|def| {
                let key = ChannelKey::new(&device.device_id, &def.name);
                let status = self.scheduler.status(&key).unwrap_or(ChannelStatus::Stopped);
                ChannelInfo {
                    name: def.name.clone(),
                    data_type: def.data_type,
                    unit: def.unit.clone(),
                    frequency: def.frequency,
                    status,
                }
            })
            .collect();

        Some(DeviceInfo {
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            device_type: device.device_type,
            data_types: device.data_names(),
            channels,
            metadata: device.metadata.clone(),
        })
    }

    /// Info for every device, keyed by id.
    pub fn devices_info(&self) -> BTreeMap<String, DeviceInfo> {
        self.config
            .devices
            .iter()
            .filter_map(|d| self.device_info(&d.device_id).map(|info| (d.device_id.clone(), info)))
            .collect()
    }
}
