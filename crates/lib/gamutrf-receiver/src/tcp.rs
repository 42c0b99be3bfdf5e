use std::time::Duration;

use gamutrf_core::scan::{ScanFrame, ScannerEndpoint};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ReceiverError, ScanSource, ScannerSweep, SweepAggregator, parse_sweep};

/// Combined frames held for the consumer before the oldest are dropped.
pub const FRAME_BUFFER: usize = 64;
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Subscribes to one or more scanners publishing JSON lines over TCP.
pub struct TcpScanReceiver {
    frames: broadcast::Receiver<ScanFrame>,
    readers: Vec<JoinHandle<()>>,
    aggregator: JoinHandle<()>,
    stopped: bool,
}

impl TcpScanReceiver {
    /// Starts one reader task per endpoint plus an aggregating task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `ReceiverError::NoScanners` when `endpoints` is empty.
    pub fn spawn(endpoints: Vec<ScannerEndpoint>, scan_fres: f64) -> Result<Self, ReceiverError> {
        if endpoints.is_empty() {
            return Err(ReceiverError::NoScanners);
        }
        let (sweep_tx, sweep_rx) = mpsc::channel(FRAME_BUFFER);
        let (frame_tx, frame_rx) = broadcast::channel(FRAME_BUFFER);

        let aggregator = tokio::spawn(aggregate(
            SweepAggregator::new(endpoints.len()),
            sweep_rx,
            frame_tx,
        ));
        let readers = endpoints
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| {
                tokio::spawn(read_scanner(index, endpoint, scan_fres, sweep_tx.clone()))
            })
            .collect();

        Ok(Self {
            frames: frame_rx,
            readers,
            aggregator,
            stopped: false,
        })
    }
}

impl ScanSource for TcpScanReceiver {
    fn read_buff(&mut self) -> Option<ScanFrame> {
        next_frame(&mut self.frames)
    }

    fn healthy(&self) -> bool {
        !self.stopped && !self.aggregator.is_finished()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for reader in &self.readers {
            reader.abort();
        }
        self.aggregator.abort();
        info!("scan receiver stopped");
    }
}

impl Drop for TcpScanReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_frame(frames: &mut broadcast::Receiver<ScanFrame>) -> Option<ScanFrame> {
    loop {
        match frames.try_recv() {
            Ok(frame) => return Some(frame),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "scan buffer full; dropped oldest frames");
            }
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                return None;
            }
        }
    }
}

async fn aggregate(
    mut aggregator: SweepAggregator,
    mut sweeps: mpsc::Receiver<(usize, ScannerSweep)>,
    frames: broadcast::Sender<ScanFrame>,
) {
    while let Some((scanner, sweep)) = sweeps.recv().await {
        if let Some(frame) = aggregator.push(scanner, sweep) {
            if frames.send(frame).is_err() {
                debug!("frame consumer gone; aggregator exiting");
                return;
            }
        }
    }
}

async fn read_scanner(
    index: usize,
    endpoint: ScannerEndpoint,
    scan_fres: f64,
    sweeps: mpsc::Sender<(usize, ScannerSweep)>,
) {
    loop {
        match TcpStream::connect(endpoint.address()).await {
            Ok(stream) => {
                info!("connected to scanner {endpoint}");
                let mut lines = BufReader::new(stream).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => match parse_sweep(&line, scan_fres) {
                            Ok(Some(sweep)) => {
                                if sweeps.send((index, sweep)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(err) => warn!("skipping record from {endpoint}: {err}"),
                        },
                        Ok(None) => {
                            warn!("scanner {endpoint} closed the connection");
                            break;
                        }
                        Err(err) => {
                            warn!("read from scanner {endpoint} failed: {err}");
                            break;
                        }
                    }
                }
            }
            Err(err) => warn!("cannot connect to scanner {endpoint}: {err}"),
        }
        if sweeps.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}
