// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the emulator

use telesim::{ChannelKey, ConfigError};
use thiserror::Error;

/// Main error type for emulator operations
#[derive(Error, Debug)]
pub enum EmulatorError {
    /// Invalid emulator or channel configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel is already generating
    #[error("Channel already running: {0}")]
    ChannelRunning(ChannelKey),

    /// Channel was never started
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelKey),

    /// Device not declared in the configuration
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Socket or file error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
