use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use gamutrf_core::scan::ScanFrame;
use tracing::{info, warn};

use crate::{ReceiverError, ScanSource, SweepAggregator, parse_sweep};

/// Replays recorded scanner output, one JSON record per line.
pub struct ReplayReceiver {
    lines: Option<Lines<BufReader<File>>>,
    aggregator: SweepAggregator,
    scan_fres: f64,
    line_no: usize,
}

impl ReplayReceiver {
    /// # Errors
    /// Returns `ReceiverError::Io` if the file cannot be opened.
    pub fn open(path: &Path, scan_fres: f64) -> Result<Self, ReceiverError> {
        let file = File::open(path)?;
        info!("replaying scans from {}", path.display());
        Ok(Self {
            lines: Some(BufReader::new(file).lines()),
            aggregator: SweepAggregator::new(1),
            scan_fres,
            line_no: 0,
        })
    }
}

impl ScanSource for ReplayReceiver {
    fn read_buff(&mut self) -> Option<ScanFrame> {
        let lines = self.lines.as_mut()?;
        loop {
            let Some(line) = lines.next() else {
                info!("replay finished after {} lines", self.line_no);
                self.lines = None;
                return None;
            };
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("replay read failed at line {}: {err}", self.line_no);
                    self.lines = None;
                    return None;
                }
            };
            match parse_sweep(&line, self.scan_fres) {
                Ok(Some(sweep)) => {
                    if let Some(frame) = self.aggregator.push(0, sweep) {
                        return Some(frame);
                    }
                }
                Ok(None) => {}
                Err(err) => warn!("skipping replay line {}: {err}", self.line_no),
            }
        }
    }

    fn healthy(&self) -> bool {
        self.lines.is_some()
    }

    fn stop(&mut self) {
        self.lines = None;
    }
}
