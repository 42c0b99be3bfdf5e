use gamutrf_core::scan::{ScanFrame, ScanParseError, ScanPoint, ScanRecord};
use serde_json::Value;
use tracing::warn;

/// One scanner's contribution to a combined frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerSweep {
    pub config: Value,
    pub points: Vec<ScanPoint>,
}

impl ScannerSweep {
    /// # Errors
    /// Returns `ScanParseError` when a bucket key is not a frequency.
    pub fn from_record(record: &ScanRecord, scan_fres: f64) -> Result<Self, ScanParseError> {
        Ok(Self {
            config: record.config.clone(),
            points: record.to_points(scan_fres)?,
        })
    }
}

/// Combines sweeps so that each emitted frame covers every scanner once.
///
/// A newer sweep from a scanner replaces its un-emitted predecessor.
#[derive(Debug)]
pub struct SweepAggregator {
    pending: Vec<Option<ScannerSweep>>,
}

impl SweepAggregator {
    #[must_use]
    pub fn new(scanners: usize) -> Self {
        Self {
            pending: vec![None; scanners],
        }
    }

    #[must_use]
    pub fn scanners(&self) -> usize {
        self.pending.len()
    }

    /// Records a sweep; returns a frame once every scanner has reported.
    pub fn push(&mut self, scanner: usize, sweep: ScannerSweep) -> Option<ScanFrame> {
        let Some(slot) = self.pending.get_mut(scanner) else {
            warn!("ignoring sweep from unknown scanner {scanner}");
            return None;
        };
        *slot = Some(sweep);
        if self.pending.iter().any(Option::is_none) {
            return None;
        }

        let mut configs = Vec::with_capacity(self.pending.len());
        let mut points = Vec::new();
        for sweep in self.pending.iter_mut().filter_map(Option::take) {
            configs.push(sweep.config);
            points.extend(sweep.points);
        }
        points.sort_by(|a, b| a.freq.total_cmp(&b.freq).then(b.db.total_cmp(&a.db)));
        points.dedup_by(|later, kept| later.freq == kept.freq);
        Some(ScanFrame::new(configs, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sweep(id: u64, points: &[(f64, f64)]) -> ScannerSweep {
        ScannerSweep {
            config: json!({ "id": id }),
            points: points
                .iter()
                .map(|&(freq, db)| ScanPoint { ts: id as f64, freq, db })
                .collect(),
        }
    }

    #[test]
    fn single_scanner_emits_every_sweep() {
        let mut aggregator = SweepAggregator::new(1);
        let frame = aggregator.push(0, sweep(1, &[(100.0, -50.0)])).unwrap();
        assert_eq!(frame.configs, vec![json!({ "id": 1 })]);
        assert!(aggregator.push(0, sweep(2, &[(100.0, -40.0)])).is_some());
    }

    #[test]
    fn waits_for_every_scanner() {
        let mut aggregator = SweepAggregator::new(2);
        assert!(aggregator.push(1, sweep(1, &[(200.0, -60.0)])).is_none());
        assert!(aggregator.push(1, sweep(2, &[(201.0, -61.0)])).is_none());

        let frame = aggregator.push(0, sweep(3, &[(100.0, -50.0)])).unwrap();
        assert_eq!(frame.configs, vec![json!({ "id": 3 }), json!({ "id": 2 })]);
        let freqs: Vec<f64> = frame.points.iter().map(|point| point.freq).collect();
        assert_eq!(freqs, vec![100.0, 201.0]);

        assert!(aggregator.push(0, sweep(4, &[(100.0, -50.0)])).is_none());
    }

    #[test]
    fn overlapping_frequencies_keep_the_stronger_reading() {
        let mut aggregator = SweepAggregator::new(2);
        aggregator.push(0, sweep(1, &[(100.0, -70.0), (100.01, -65.0)]));
        let frame = aggregator.push(1, sweep(2, &[(100.0, -55.0)])).unwrap();

        assert_eq!(frame.points.len(), 2);
        assert_eq!(frame.points[0].db, -55.0);
        assert_eq!(frame.points[1].freq, 100.01);
    }

    #[test]
    fn unknown_scanner_is_ignored() {
        let mut aggregator = SweepAggregator::new(1);
        assert!(aggregator.push(3, sweep(1, &[(1.0, -1.0)])).is_none());
        assert_eq!(aggregator.scanners(), 1);
    }
}
