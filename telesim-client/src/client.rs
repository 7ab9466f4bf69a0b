// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Client façade
//!
//! Owns the store and the transport, runs the fetch loop on demand and
//! answers analytics and export requests from any calling context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use telesim::{ChannelKey, Reading, DEFAULT_BUFFER_CAPACITY, DEFAULT_FETCH_INTERVAL_MS};
use tokio::sync::broadcast;
use tracing::info;

use crate::analytics::{analyze, analyze_all, AnalyticsConfig, AnalyticsSnapshot};
use crate::error::{ClientError, Result, TransportError};
use crate::export::{ExportDocument, ExportFilter};
use crate::fetch::{fetch_once, FetchEvent, FetchLoop};
use crate::store::{MergeOutcome, RingBufferStore};
use crate::transport::{HttpTransport, Transport};

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_fetch_interval_ms() -> u64 {
    DEFAULT_FETCH_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    2000
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

const EVENT_CAPACITY: usize = 64;

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Samples retained per channel
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fetch_interval_ms: default_fetch_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Collects readings from one emulator and analyzes them.
pub struct TelemetryClient {
    config: ClientConfig,
    store: Arc<RingBufferStore>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<FetchEvent>,
    fetch: Option<FetchLoop>,
}

impl TelemetryClient {
    /// Client talking HTTP to `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout_ms)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Client over any transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let store = Arc::new(RingBufferStore::new(config.buffer_capacity)?);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            store,
            transport,
            events,
            fetch: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<RingBufferStore> {
        Arc::clone(&self.store)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Observe fetch outcomes. Events sent before subscribing are not seen.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.events.subscribe()
    }

    /// Start periodic fetching. Fails if already fetching.
    pub fn start_fetching(&mut self) -> Result<()> {
        if self.is_fetching() {
            return Err(ClientError::AlreadyRunning);
        }
        info!(
            base_url = %self.config.base_url,
            interval_ms = self.config.fetch_interval_ms,
            "Starting fetch loop"
        );
        self.fetch = Some(FetchLoop::spawn(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            self.config.fetch_interval(),
            self.config.request_timeout(),
            self.events.clone(),
        ));
        Ok(())
    }

    /// Stop fetching and wait for an in-flight fetch. Idempotent.
    pub async fn stop_fetching(&mut self) {
        if let Some(mut fetch) = self.fetch.take() {
            fetch.shutdown().await;
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.fetch.as_ref().is_some_and(FetchLoop::is_running)
    }

    /// Fetch once now, outside the schedule.
    pub async fn fetch_now(&self) -> std::result::Result<MergeOutcome, TransportError> {
        fetch_once(self.transport.as_ref(), &self.store, self.config.request_timeout()).await
    }

    /// Latest readings of one device straight from the transport.
    pub async fn fetch_device(&self, device_id: &str) -> std::result::Result<Vec<Reading>, TransportError> {
        self.transport.fetch_device(device_id).await
    }

    /// Latest reading of one channel straight from the transport.
    pub async fn fetch_channel(&self, key: &ChannelKey) -> std::result::Result<Option<Reading>, TransportError> {
        self.transport.fetch_channel(key).await
    }

    pub fn analytics(&self, key: &ChannelKey, now: DateTime<Utc>) -> Option<AnalyticsSnapshot> {
        self.store
            .snapshot(key)
            .map(|s| analyze(&s, now, &self.config.analytics))
    }

    pub fn analytics_all(&self, now: DateTime<Utc>) -> Vec<AnalyticsSnapshot> {
        analyze_all(&self.store.snapshot_all(), now, &self.config.analytics)
    }

    pub fn export(&self, filter: &ExportFilter) -> ExportDocument {
        ExportDocument::from_snapshots(self.store.snapshot_all(), filter, Utc::now())
    }

    /// Replace the buffers named in `document`, returning how many.
    pub fn import(&self, document: ExportDocument) -> Result<usize> {
        let count = self.store.replace(document.into_snapshots())?;
        info!(channels = count, "Imported history");
        Ok(count)
    }

    pub fn export_to_file(&self, filter: &ExportFilter, path: impl AsRef<Path>) -> Result<()> {
        self.export(filter).write_json(path)
    }

    pub fn import_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        self.import(ExportDocument::read_json(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.fetch_interval_ms, 5000);
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.analytics.window_secs, 300);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ClientConfig {
            buffer_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(TelemetryClient::new(config), Err(ClientError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_rejected_and_stop_idempotent() {
        let mut client = TelemetryClient::new(ClientConfig::default()).unwrap();
        client.start_fetching().unwrap();
        assert!(client.is_fetching());
        assert!(matches!(client.start_fetching(), Err(ClientError::AlreadyRunning)));

        client.stop_fetching().await;
        client.stop_fetching().await;
        assert!(!client.is_fetching());
        client.start_fetching().unwrap();
        client.stop_fetching().await;
    }
}
