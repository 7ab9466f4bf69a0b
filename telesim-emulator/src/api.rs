// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! REST transport
//!
//! Data routes read straight from the stream store and never wait on the
//! emulator. Device routes take a read lock on the emulator for
//! configuration and channel status.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use telesim::{ChannelData, ChannelKey, DataSnapshot, DeviceData, ErrorBody, Reading};
use tokio::sync::RwLock;
use tracing::debug;

use crate::emulator::{DeviceInfo, Emulator};
use crate::metrics::encode_metrics;
use crate::stream_store::StreamStore;

/// State shared across handlers.
pub struct AppState {
    pub emulator: Arc<RwLock<Emulator>>,
    pub store: Arc<StreamStore>,
    pub config_name: String,
}

impl AppState {
    pub fn new(emulator: Arc<RwLock<Emulator>>, store: Arc<StreamStore>, config_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            emulator,
            store,
            config_name: config_name.into(),
        })
    }
}

/// Errors returned by handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                debug!(error = %message, "Not found");
                (StatusCode::NOT_FOUND, Json(ErrorBody::new(message))).into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub emulator: String,
    pub running_channels: usize,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: BTreeMap<String, DeviceInfo>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub device: DeviceInfo,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub device_id: String,
    pub data_type: String,
    pub readings: Vec<Reading>,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/devices/:device_id", get(get_device))
        .route("/data", get(all_data))
        .route("/data/:device_id", get(device_data))
        .route("/data/:device_id/:data_name", get(channel_data))
        .route("/data/:device_id/:data_name/history", get(channel_history))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let running_channels = state.emulator.read().await.running_count();
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        emulator: state.config_name.clone(),
        running_channels,
    })
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<DevicesResponse> {
    let devices = state.emulator.read().await.devices_info();
    Json(DevicesResponse {
        count: devices.len(),
        devices,
        timestamp: Utc::now(),
    })
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceResponse>, ApiError> {
    let device = state
        .emulator
        .read()
        .await
        .device_info(&device_id)
        .ok_or_else(|| ApiError::NotFound(format!("Device {} not found", device_id)))?;
    Ok(Json(DeviceResponse {
        device,
        timestamp: Utc::now(),
    }))
}

pub async fn all_data(State(state): State<Arc<AppState>>) -> Json<DataSnapshot> {
    Json(DataSnapshot::from_readings(state.store.latest_all(), Utc::now()))
}

pub async fn device_data(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceData>, ApiError> {
    if !state.emulator.read().await.has_device(&device_id) {
        return Err(ApiError::NotFound(format!("Device {} not found", device_id)));
    }
    let data = state
        .store
        .latest_for_device(&device_id)
        .into_iter()
        .map(|r| (r.data_name.clone(), r.body()))
        .collect();
    Ok(Json(DeviceData {
        device_id,
        data,
        timestamp: Utc::now(),
    }))
}

pub async fn channel_data(
    State(state): State<Arc<AppState>>,
    Path((device_id, data_name)): Path<(String, String)>,
) -> Result<Json<ChannelData>, ApiError> {
    let key = ChannelKey::new(&device_id, &data_name);
    state
        .store
        .latest(&key)
        .map(|r| Json(ChannelData::from(r)))
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Data type {} not found for device {}",
                data_name, device_id
            ))
        })
}

pub async fn channel_history(
    State(state): State<Arc<AppState>>,
    Path((device_id, data_name)): Path<(String, String)>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let readings = state.store.history(&ChannelKey::new(&device_id, &data_name));
    if readings.is_empty() {
        return Err(ApiError::NotFound(format!(
            "Data type {} not found for device {}",
            data_name, device_id
        )));
    }
    Ok(Json(HistoryResponse {
        device_id,
        data_type: data_name,
        readings,
    }))
}

/// Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        encode_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmulatorConfig, EmulatorSettings};
    use telesim::Value;

    fn reading(device: &str, name: &str, value: Value) -> Reading {
        Reading {
            device_id: device.to_string(),
            data_name: name.to_string(),
            value,
            unit: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn state() -> Arc<AppState> {
        let (emulator, _events) = Emulator::new(EmulatorConfig::demo(), EmulatorSettings::default()).unwrap();
        let store = emulator.store();
        store.publish(reading("sensor_001", "temperature", Value::Float(21.0)));
        store.publish(reading("sensor_001", "humidity", Value::Float(40.0)));
        store.publish(reading("actuator_001", "door_open", Value::Boolean(false)));
        AppState::new(Arc::new(RwLock::new(emulator)), store, "demo")
    }

    #[tokio::test]
    async fn test_all_data_groups_devices() {
        let Json(snapshot) = all_data(State(state())).await;
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.data["sensor_001"].len(), 2);
    }

    #[tokio::test]
    async fn test_device_data_and_unknown_device() {
        let state = state();
        let Json(body) = device_data(State(Arc::clone(&state)), Path("sensor_001".to_string()))
            .await
            .unwrap();
        assert_eq!(body.data["temperature"].value, Value::Float(21.0));

        let err = device_data(State(state), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Device ghost not found".to_string()));
    }

    #[tokio::test]
    async fn test_channel_data() {
        let state = state();
        let Json(body) = channel_data(
            State(Arc::clone(&state)),
            Path(("actuator_001".to_string(), "door_open".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(body.data_type, "door_open");
        assert_eq!(body.value, Value::Boolean(false));

        let missing = channel_data(State(state), Path(("actuator_001".to_string(), "status".to_string()))).await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_devices_and_health() {
        let state = state();
        let Json(devices) = list_devices(State(Arc::clone(&state))).await;
        assert_eq!(devices.count, 2);

        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.emulator, "demo");
        assert_eq!(health.running_channels, 0);
    }

    #[tokio::test]
    async fn test_not_found_response_status() {
        let response = ApiError::NotFound("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
