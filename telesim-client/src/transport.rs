// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Client side of the transport boundary
//!
//! A channel missing from a response means "no new data". Every request is
//! bounded by the configured timeout.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use telesim::{ChannelData, ChannelKey, DataSnapshot, DeviceData, ErrorBody, Reading};
use tracing::debug;

use crate::error::TransportError;

/// Source of the latest readings.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Latest reading of every active channel.
    async fn fetch_all(&self) -> Result<Vec<Reading>, TransportError>;

    /// Latest readings of one device.
    async fn fetch_device(&self, device_id: &str) -> Result<Vec<Reading>, TransportError>;

    /// Latest reading of one channel, `None` if it has not produced one.
    async fn fetch_channel(&self, key: &ChannelKey) -> Result<Option<Reading>, TransportError>;
}

/// REST transport against a running emulator.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| TransportError::Connection(format!("Invalid base URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::Connection(format!("Invalid base URL {}", base_url)));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            base,
            timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Base URL extended by `segments`, each percent-encoded as one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET the route made of `segments`, returning `None` on 404.
    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Option<T>, TransportError> {
        let url = self.url(segments);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url = %url, "Not found");
            return Ok(None);
        }
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout_ms))?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_all(&self) -> Result<Vec<Reading>, TransportError> {
        let snapshot: Option<DataSnapshot> = self.get_json(&["data"]).await?;
        snapshot
            .map(DataSnapshot::into_readings)
            .ok_or_else(|| TransportError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: "Data endpoint not found".to_string(),
            })
    }

    async fn fetch_device(&self, device_id: &str) -> Result<Vec<Reading>, TransportError> {
        let data: Option<DeviceData> = self.get_json(&["data", device_id]).await?;
        data.map(DeviceData::into_readings)
            .ok_or_else(|| TransportError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("Device {} not found", device_id),
            })
    }

    async fn fetch_channel(&self, key: &ChannelKey) -> Result<Option<Reading>, TransportError> {
        let data: Option<ChannelData> = self
            .get_json(&["data", key.device_id.as_str(), key.data_name.as_str()])
            .await?;
        Ok(data.map(Reading::from))
    }
}
