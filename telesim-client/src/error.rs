// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the client
//!
//! Transport failures are recovered by the fetch loop and only surface as
//! events. Store integrity errors indicate misuse and are logged loudly.

use chrono::{DateTime, Utc};
use telesim::ChannelKey;
use thiserror::Error;

/// A failed request to the emulator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No response within the request timeout
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Connection refused, reset or unresolvable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success HTTP status
    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// Body could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Classify a `reqwest` error.
    pub fn from_reqwest(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(timeout_ms)
        } else if e.is_decode() {
            TransportError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            TransportError::Connection(e.to_string())
        }
    }
}

/// Violation of the ring buffer store invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreIntegrityError {
    /// A store cannot hold zero samples per channel
    #[error("Buffer capacity must be at least 1")]
    ZeroCapacity,

    /// Imported samples are not strictly increasing in time
    #[error("Channel {key}: sample at index {index} ({timestamp}) is not newer than its predecessor")]
    OutOfOrder {
        key: ChannelKey,
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store integrity error: {0}")]
    Store(#[from] StoreIntegrityError),

    /// Export document could not be encoded or decoded
    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fetch loop already running
    #[error("Fetch loop already running")]
    AlreadyRunning,
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
