// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Telesim Client binary
//!
//! ```bash
//! # Poll a local emulator every 5 s and log analytics
//! telesim-client --url http://127.0.0.1:8080
//!
//! # Resume from a previous export and write history on exit
//! telesim-client --import history.json --export history.json --csv history.csv
//! ```

use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use telesim_client::{
    AnalyticsConfig, ClientConfig, ClientError, ExportFilter, FetchEvent, TelemetryClient,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Telesim telemetry client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emulator base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Fetch interval in milliseconds
    #[arg(short, long, default_value = "5000")]
    interval_ms: u64,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Samples kept per channel
    #[arg(long, default_value = "1000")]
    capacity: usize,

    /// Trailing analytics window in seconds
    #[arg(long, default_value = "300")]
    window_secs: u64,

    /// Anomaly threshold in standard deviations
    #[arg(long, default_value = "3.0")]
    z_threshold: f64,

    /// Load history from a JSON export before fetching
    #[arg(long)]
    import: Option<String>,

    /// Write history as JSON on exit
    #[arg(long)]
    export: Option<String>,

    /// Write history as CSV on exit
    #[arg(long)]
    csv: Option<String>,

    /// Only export this device
    #[arg(long)]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Telesim Client v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Client failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let config = ClientConfig {
        base_url: args.url.clone(),
        fetch_interval_ms: args.interval_ms,
        request_timeout_ms: args.timeout_ms,
        buffer_capacity: args.capacity,
        analytics: AnalyticsConfig {
            window_secs: args.window_secs,
            z_threshold: args.z_threshold,
        },
    };
    let mut client = TelemetryClient::new(config)?;

    if let Some(path) = &args.import {
        let channels = client.import_from_file(path)?;
        info!(path = %path, channels, "Loaded history");
    }

    let mut events = client.subscribe();
    client.start_fetching()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Ok(FetchEvent::Completed { appended, new_channels, .. }) => {
                    if new_channels > 0 {
                        info!(new_channels, "New channels discovered");
                    }
                    if appended > 0 {
                        report(&client);
                    }
                }
                Ok(FetchEvent::Failed { error }) => {
                    warn!(error = %error, "Emulator unreachable");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Dropped fetch events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    client.stop_fetching().await;

    let filter = match &args.device {
        Some(device) => ExportFilter::device(device.clone()),
        None => ExportFilter::all(),
    };
    if args.export.is_some() || args.csv.is_some() {
        let document = client.export(&filter);
        if let Some(path) = &args.export {
            document.write_json(path)?;
            info!(path = %path, channels = document.channel_count(), "Exported history");
        }
        if let Some(path) = &args.csv {
            document.write_csv_file(path)?;
            info!(path = %path, samples = document.sample_count(), "Exported CSV");
        }
    }
    Ok(())
}

fn report(client: &TelemetryClient) {
    for stats in client.analytics_all(Utc::now()) {
        let recent = &stats.recent;
        if recent.count == 0 {
            continue;
        }
        info!(
            channel = %stats.key,
            unit = %stats.unit,
            count = recent.count,
            average = ?recent.average,
            std_dev = ?recent.std_dev,
            trend = ?recent.trend_slope,
            "Window statistics"
        );
        if !recent.anomaly_indices.is_empty() {
            warn!(
                channel = %stats.key,
                anomalies = recent.anomaly_indices.len(),
                "Anomalies in window"
            );
        }
    }
}
