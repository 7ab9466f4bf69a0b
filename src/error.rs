// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for Telesim
//!
//! Configuration problems are reported when a channel is built, never while
//! it is generating. Generation faults are per-channel and never abort other
//! channels.

use thiserror::Error;

use crate::value::DataKind;

/// Result type alias for Telesim operations
pub type Result<T> = std::result::Result<T, TelesimError>;

/// Main error type for Telesim operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelesimError {
    /// Invalid channel or device configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Arithmetic fault while advancing a channel
    #[error("Generation fault: {0}")]
    Generation(#[from] GenerationFault),
}

/// Errors raised while validating configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Channel has no name
    #[error("Channel name must not be empty")]
    EmptyName,

    /// Numeric channel without bounds
    #[error("Channel '{channel}': min_value and max_value are required for {kind} channels")]
    MissingBounds { channel: String, kind: DataKind },

    /// Bounds are inverted or not finite
    #[error("Channel '{channel}': invalid range [{min}, {max}]")]
    InvalidRange { channel: String, min: f64, max: f64 },

    /// Integer channel with fractional bounds
    #[error("Channel '{channel}': integer bounds must be whole numbers, got [{min}, {max}]")]
    NonIntegralBounds { channel: String, min: f64, max: f64 },

    /// Frequency must be strictly positive
    #[error("Channel '{channel}': frequency must be > 0 Hz, got {frequency}")]
    InvalidFrequency { channel: String, frequency: f64 },

    /// Change step must be non-negative
    #[error("Channel '{channel}': change_step must be >= 0, got {step}")]
    InvalidChangeStep { channel: String, step: f64 },

    /// Noise level outside [0, 1]
    #[error("Channel '{channel}': noise_level must be within [0, 1], got {level}")]
    InvalidNoiseLevel { channel: String, level: f64 },

    /// Drift rate is not finite
    #[error("Channel '{channel}': drift_rate must be finite, got {rate}")]
    InvalidDriftRate { channel: String, rate: f64 },

    /// Initial value does not match the channel kind
    #[error("Channel '{channel}': initial value is not a valid {kind}")]
    InitialValueKind { channel: String, kind: DataKind },

    /// Initial value outside the configured range
    #[error("Channel '{channel}': initial value {value} outside [{min}, {max}]")]
    InitialValueOutOfRange {
        channel: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// `possible_states` supplied but empty
    #[error("Channel '{channel}': possible_states must not be empty")]
    EmptyStates { channel: String },

    /// Initial string is not one of the declared states
    #[error("Channel '{channel}': initial state '{state}' is not a declared state")]
    InitialStateUnknown { channel: String, state: String },

    /// Token alphabet or length unusable
    #[error("Channel '{channel}': string_chars must not be empty and string_length must be > 0")]
    InvalidTokenSpec { channel: String },

    /// Two channels with the same name on one device
    #[error("Device '{device}': duplicate channel '{channel}'")]
    DuplicateChannel { device: String, channel: String },

    /// Two devices with the same identifier
    #[error("Duplicate device id: {0}")]
    DuplicateDevice(String),

    /// Device without channels
    #[error("Device '{0}' has no data configurations")]
    NoChannels(String),

    /// Configuration without devices
    #[error("Configuration declares no devices")]
    NoDevices,

    /// Document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Document could not be read
    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

/// Faults raised while advancing a channel by one tick
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationFault {
    /// An intermediate term was NaN or infinite
    #[error("Channel '{channel}': non-finite {stage}")]
    NonFinite {
        channel: String,
        stage: &'static str,
    },

    /// Elapsed time handed to the generator was not a number
    #[error("Channel '{channel}': invalid elapsed time {dt_seconds}")]
    InvalidElapsed { channel: String, dt_seconds: f64 },
}

impl GenerationFault {
    /// Name of the channel that faulted.
    pub fn channel(&self) -> &str {
        match self {
            GenerationFault::NonFinite { channel, .. } => channel,
            GenerationFault::InvalidElapsed { channel, .. } => channel,
        }
    }
}
