// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Telesim
//!
//! Core building blocks for simulating telemetry from virtual devices.
//!
//! Each *channel* is one `(device, data name)` stream. A channel is described
//! by a validated [`ChannelConfig`] and advanced tick by tick by the
//! [`generator`], which threads an explicit [`ChannelState`] through every
//! call. Nothing in this crate owns a clock or a thread: the emulator crate
//! schedules channels, the client crate collects and analyzes them.
//!
//! ## Quick Start
//!
//! ```rust
//! use telesim::{generate, ChannelConfig, ChannelDefinition, ChannelState, RngNoise, Value};
//!
//! let config = ChannelConfig::try_from(
//!     ChannelDefinition::float("temperature", -40.0, 85.0)
//!         .with_change_step(0.5)
//!         .with_initial(Value::Float(20.0))
//!         .with_unit("°C"),
//! )
//! .unwrap();
//!
//! let mut noise = RngNoise::seeded(42);
//! let state = ChannelState::initial(&config);
//! let (value, next) = generate(&config, &state, 1.0, &mut noise).unwrap();
//!
//! let v = value.as_f64().unwrap();
//! assert!((19.5..=20.5).contains(&v));
//! assert_eq!(next.current, value);
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Channel definitions and their validation
//! - [`generator`]: Per-kind value generation and noise sources
//! - [`value`]: Data kinds and generated values
//! - [`sample`]: Channel keys, samples and data points
//! - [`wire`]: JSON shapes exchanged between emulator and client
//! - [`error`]: Configuration errors and generation faults

pub mod config;
pub mod error;
pub mod generator;
pub mod sample;
pub mod value;
pub mod wire;

// Re-exports for convenient access
pub use config::{ChannelConfig, ChannelDefinition, CustomParams};
pub use error::{ConfigError, GenerationFault, Result, TelesimError};
pub use generator::{generate, ChannelState, NoiseSource, RngNoise};
pub use sample::{ChannelKey, DataPoint, Sample};
pub use value::{DataKind, Value};
pub use wire::{ChannelData, DataSnapshot, DeviceData, ErrorBody, Reading, ReadingBody};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default ring buffer capacity on the client side.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default client fetch interval in milliseconds.
pub const DEFAULT_FETCH_INTERVAL_MS: u64 = 5000;
