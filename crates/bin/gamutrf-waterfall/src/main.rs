//! Waterfall plotter entry point.
//!
//! Subscribes to scanners (or replays a recording), keeps a rolling waterfall,
//! saves detections and snapshots, and optionally serves the live image.

mod config;
mod runner;

use std::net::SocketAddr;

use gamutrf_core::SCAN_FRES;
use gamutrf_receiver::{ReplayReceiver, ScanSource, TcpScanReceiver};
use gamutrf_web::{WaterfallServer, WaterfallServerConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::WaterfallSettings;
use crate::runner::{Waterfall, prepare_save_dirs, run};

const LIVE_IMAGE_NAME: &str = "waterfall.png";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = WaterfallSettings::from_args()?;
    init_tracing(&settings.log_level);

    if let Some(save_path) = &settings.save_path {
        prepare_save_dirs(save_path, settings.peak_finder.is_some())?;
    }

    let tempdir = tempfile::tempdir()?;
    let live_image = settings.port.map(|_| tempdir.path().join(LIVE_IMAGE_NAME));
    let _server = settings.port.zip(live_image.clone()).map(|(port, image_path)| {
        let config =
            WaterfallServerConfig::new(SocketAddr::from(([0, 0, 0, 0], port)), image_path)
                .with_refresh_secs(settings.refresh_secs);
        WaterfallServer::new(config).spawn()
    });

    let mut source: Box<dyn ScanSource> = match &settings.replay {
        Some(path) => Box::new(ReplayReceiver::open(path, SCAN_FRES)?),
        None => Box::new(TcpScanReceiver::spawn(settings.scanners.clone(), SCAN_FRES)?),
    };

    let mut waterfall = Waterfall::new(&settings, live_image);
    info!(
        "plotting {} to {} MHz",
        settings.min_freq / 1e6,
        settings.max_freq / 1e6
    );
    run(&mut waterfall, source.as_mut(), shutdown_signal()).await;
    source.stop();
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
