//! Scan sources for the waterfall.
//!
//! A source yields combined [`ScanFrame`]s without blocking the caller. Live
//! scanners are read over TCP by [`TcpScanReceiver`]; recorded sweeps are read
//! back from disk by [`ReplayReceiver`].

mod aggregator;
mod replay;
mod tcp;

use std::{error::Error, fmt, io};

use gamutrf_core::scan::{ScanFrame, ScanParseError, ScanRecord};

pub use aggregator::{ScannerSweep, SweepAggregator};
pub use replay::ReplayReceiver;
pub use tcp::{FRAME_BUFFER, RECONNECT_BACKOFF, TcpScanReceiver};

/// A non-blocking supplier of combined sweeps.
pub trait ScanSource {
    /// Returns the next pending frame, or `None` if nothing is ready.
    fn read_buff(&mut self) -> Option<ScanFrame>;

    /// Whether the source can still produce frames.
    fn healthy(&self) -> bool;

    fn stop(&mut self);
}

#[derive(Debug)]
pub enum ReceiverError {
    NoScanners,
    Io(io::Error),
    Parse(ScanParseError),
}

impl fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoScanners => write!(f, "no scanners configured"),
            Self::Io(err) => write!(f, "receiver io error: {err}"),
            Self::Parse(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReceiverError {}

impl From<io::Error> for ReceiverError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ScanParseError> for ReceiverError {
    fn from(err: ScanParseError) -> Self {
        Self::Parse(err)
    }
}

/// Parses one wire line into a sweep. Blank lines yield `None`.
fn parse_sweep(line: &str, scan_fres: f64) -> Result<Option<ScannerSweep>, ReceiverError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let record = ScanRecord::from_json_line(line)?;
    Ok(Some(ScannerSweep::from_record(&record, scan_fres)?))
}
