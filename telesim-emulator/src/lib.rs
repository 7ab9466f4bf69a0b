// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Telesim Emulator
//!
//! Runs a fleet of virtual devices. Each channel is scheduled on its own at
//! its configured frequency and publishes into a shared [`StreamStore`],
//! which the REST transport in [`api`] serves.
//!
//! ## Example
//!
//! ```rust,no_run
//! use telesim_emulator::{Emulator, EmulatorConfig, EmulatorSettings};
//!
//! # async fn run() -> telesim_emulator::Result<()> {
//! let (mut emulator, mut events) = Emulator::new(EmulatorConfig::demo(), EmulatorSettings::seeded(42))?;
//! emulator.start();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//!
//! let latest = emulator.store().latest_all();
//! println!("{} channels reporting", latest.len());
//! emulator.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod emulator;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod stream_store;

pub use api::{router, AppState};
pub use config::{DeviceDefinition, DeviceType, EmulatorConfig, EmulatorSettings};
pub use emulator::{ChannelInfo, DeviceInfo, Emulator, RejectedChannel};
pub use error::{EmulatorError, Result};
pub use scheduler::{ChannelStatus, Scheduler, SchedulerEvent};
pub use stream_store::StreamStore;
