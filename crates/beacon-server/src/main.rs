//! # beacon-server
//!
//! beacon-relay daemon.
//!
//! This binary provides:
//! - BLE advertisement scanning with Eddystone/iBeacon classification
//! - Periodic upload of the latest observation per beacon
//! - A read-only status API
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, without BlueZ
//! cargo run --package beacon-server --features mock-bluetooth
//!
//! # Production
//! BEACON_ENV=production ./beacon-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::Path;
use std::sync::Arc;

use beacon_core::{
    AdvertisementFeed, BeaconListener, Config, HttpSink, RelayError, Result, ScannerConfig,
};
use beacon_server::api;
use beacon_server::logging;
use beacon_server::state::{spawn_recent_feed, AppState};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::LogMode::from_env())?;

    if let Err(e) = run().await {
        error!(
            error_code = e.error_code(),
            error = %e,
            hint = startup_hint(&e),
            "beacon-server failed"
        );
        return Err(e.into());
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config_path = Config::config_path();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting beacon-server"
    );

    let config = load_config(&config_path)?;

    let sink = HttpSink::from_config(&config.upload)?;
    info!(
        sink = config.upload.sink.kind(),
        endpoint = %sink.endpoint(),
        interval_secs = config.upload.interval_secs,
        "Upload sink ready"
    );

    let feed = open_feed(&config.scanner).await?;
    let listener = BeaconListener::start(feed, sink, &config.upload);

    let state = AppState::new(
        listener.handle(),
        config.server.recent_capacity,
        config.upload.sink.kind(),
    )
    .shared();
    let recent_feed = spawn_recent_feed(Arc::clone(&state), listener.subscribe());

    let served = serve(&config, api::create_router(state)).await;

    recent_feed.abort();
    let stats = listener.shutdown().await;
    info!(
        received = stats.received,
        eddystone = stats.eddystone,
        ibeacon = stats.ibeacon,
        delivered = stats.upload.delivered,
        failed = stats.upload.failed,
        "beacon-server stopped"
    );

    served
}

/// Load configuration, which is validated on load. A missing file falls back
/// to defaults plus environment overrides.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults and environment");
    }
    Ok(Config::load_or_default(path)?)
}

/// Operator hint for a startup failure, by error category.
const fn startup_hint(err: &RelayError) -> Option<&'static str> {
    if err.is_config_error() {
        Some("check the config file and BEACON__* environment overrides")
    } else if err.is_bluetooth_error() {
        Some("check that bluetoothd is running, or build with --features mock-bluetooth")
    } else if err.is_upload_error() {
        Some("check the [upload.sink] section of the config file")
    } else {
        None
    }
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
async fn open_feed(config: &ScannerConfig) -> Result<AdvertisementFeed> {
    Ok(beacon_core::BluetoothScanner::start(config).await?)
}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[allow(clippy::unused_async)]
async fn open_feed(config: &ScannerConfig) -> Result<AdvertisementFeed> {
    warn!("Using mock advertisement source");
    Ok(beacon_core::MockScanner::start(config))
}

async fn serve(config: &Config, app: axum::Router) -> Result<()> {
    let tcp = TcpListener::bind(config.server.bind_address).await?;
    info!(address = %config.server.bind_address, "Status API listening");

    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(RelayError::from)
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C off Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Could not install signal handlers, using Ctrl+C");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
