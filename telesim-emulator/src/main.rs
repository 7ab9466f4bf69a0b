// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Telesim Emulator binary
//!
//! ```bash
//! # Built-in demo fleet on the default port
//! telesim-emulator
//!
//! # Configuration document, reproducible run
//! telesim-emulator --config devices.json --seed 42 --port 8080
//!
//! # Validate a document without running it
//! telesim-emulator --config devices.json --check
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use telesim_emulator::{
    router, AppState, Emulator, EmulatorConfig, EmulatorError, EmulatorSettings, SchedulerEvent,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Telesim device emulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON or YAML configuration document (built-in demo fleet when absent)
    #[arg(short, long)]
    config: Option<String>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Seed for reproducible runs
    #[arg(short, long)]
    seed: Option<u64>,

    /// Readings kept per channel
    #[arg(long, default_value = "32")]
    history_len: usize,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

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

    info!("Telesim Emulator v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Emulator failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), EmulatorError> {
    let config = match &args.config {
        Some(path) => {
            info!(path = %path, "Loading configuration");
            EmulatorConfig::from_file(path)?
        }
        None => {
            info!("No configuration supplied, using the demo fleet");
            EmulatorConfig::demo()
        }
    };

    if args.check {
        config.validate()?;
        info!(
            devices = config.devices.len(),
            channels = config.channel_count(),
            "Configuration is valid"
        );
        return Ok(());
    }

    let settings = EmulatorSettings {
        seed: args.seed,
        history_len: args.history_len,
    };
    let config_name = config.config_name.clone();
    let (mut emulator, mut events) = Emulator::new(config, settings)?;
    let started = emulator.start();
    if started == 0 {
        warn!("No channel could be started");
    }

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::Faulted { key, fault, ticks } => {
                    error!(channel = %key, error = %fault, ticks, "Channel paused after fault");
                }
                SchedulerEvent::Stopped { key, ticks } => {
                    info!(channel = %key, ticks, "Channel stopped");
                }
            }
        }
    });

    let store = emulator.store();
    let emulator = Arc::new(RwLock::new(emulator));
    let state = AppState::new(Arc::clone(&emulator), store, config_name);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await?;

    emulator.write().await.stop().await;
    Ok(())
}
