// Telesim Emulator - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the emulator.
//!
//! Channel tasks update these as they tick; the `/metrics` route encodes
//! the default registry in text format.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};
use telesim::ChannelKey;

lazy_static! {
    /// Samples published per channel.
    pub static ref SAMPLES_GENERATED: IntCounterVec = register_int_counter_vec!(
        "telesim_samples_generated_total",
        "Samples generated and published per channel",
        &["device", "channel"]
    ).unwrap();

    /// Generation faults per channel.
    pub static ref CHANNEL_FAULTS: IntCounterVec = register_int_counter_vec!(
        "telesim_channel_faults_total",
        "Generation faults that paused a channel",
        &["device", "channel"]
    ).unwrap();

    /// Channel tasks currently generating.
    pub static ref RUNNING_CHANNELS: IntGauge = register_int_gauge!(
        "telesim_running_channels",
        "Number of channel tasks currently generating"
    ).unwrap();

    /// Channel definitions rejected at startup.
    pub static ref REJECTED_CHANNELS: IntGauge = register_int_gauge!(
        "telesim_rejected_channels",
        "Channel definitions rejected by validation at startup"
    ).unwrap();
}

pub fn record_sample(key: &ChannelKey) {
    SAMPLES_GENERATED
        .with_label_values(&[&key.device_id, &key.data_name])
        .inc();
}

pub fn record_fault(key: &ChannelKey) {
    CHANNEL_FAULTS
        .with_label_values(&[&key.device_id, &key.data_name])
        .inc();
}

/// Encode all registered metrics in Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
