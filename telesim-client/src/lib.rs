// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Telesim Client
//!
//! Pulls the latest readings from an emulator at a fixed interval, keeps a
//! bounded history per channel in a [`RingBufferStore`] and computes
//! [`analytics`] over it on demand.
//!
//! ## Example
//!
//! ```rust,no_run
//! use telesim::ChannelKey;
//! use telesim_client::{ClientConfig, FetchEvent, TelemetryClient};
//!
//! # async fn run() -> telesim_client::Result<()> {
//! let mut client = TelemetryClient::new(ClientConfig {
//!     base_url: "http://127.0.0.1:8080".to_string(),
//!     ..ClientConfig::default()
//! })?;
//!
//! let mut events = client.subscribe();
//! client.start_fetching()?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let FetchEvent::Completed { .. } = event {
//!         let key = ChannelKey::new("sensor_001", "temperature");
//!         if let Some(stats) = client.analytics(&key, chrono::Utc::now()) {
//!             println!("{:?}", stats.recent.average);
//!         }
//!         break;
//!     }
//! }
//!
//! client.stop_fetching().await;
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod client;
pub mod error;
pub mod export;
pub mod fetch;
pub mod ring_buffer;
pub mod store;
pub mod transport;

pub use analytics::{analyze, analyze_all, AnalyticsConfig, AnalyticsSnapshot, WindowStats};
pub use client::{ClientConfig, TelemetryClient};
pub use error::{ClientError, Result, StoreIntegrityError, TransportError};
pub use export::{ExportDocument, ExportFilter, ExportedStream};
pub use fetch::{fetch_once, FetchEvent, FetchLoop};
pub use ring_buffer::RingBuffer;
pub use store::{MergeOutcome, RingBufferStore, StreamSnapshot};
pub use transport::{HttpTransport, Transport};
