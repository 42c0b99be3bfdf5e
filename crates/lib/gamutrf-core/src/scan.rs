//! Scan data model and scanner wire format.
//!
//! Scanners publish newline-delimited JSON records, one per sweep:
//!
//! ```json
//! {"ts": 1700000000.5, "config": {"freq_start": 2.2e9}, "buckets": {"2200000000": -181.2}}
//! ```
//!
//! Bucket keys are frequencies in Hz, values are power in dB.

use std::collections::BTreeMap;
use std::{error::Error, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One power measurement within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub ts: f64,
    /// Frequency in MHz.
    pub freq: f64,
    pub db: f64,
}

/// A combined sweep across every configured scanner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanFrame {
    pub configs: Vec<Value>,
    pub points: Vec<ScanPoint>,
}

impl ScanFrame {
    #[must_use]
    pub const fn new(configs: Vec<Value>, points: Vec<ScanPoint>) -> Self {
        Self { configs, points }
    }

    /// Timestamp of the frame, taken from its last point.
    #[must_use]
    pub fn scan_time(&self) -> Option<f64> {
        self.points.last().map(|point| point.ts)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A single scanner sweep as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ts: f64,
    #[serde(default)]
    pub config: Value,
    pub buckets: BTreeMap<String, f64>,
}

impl ScanRecord {
    /// Parses one JSON line.
    ///
    /// # Errors
    /// Returns `ScanParseError` when the line is not a valid record.
    pub fn from_json_line(line: &str) -> Result<Self, ScanParseError> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Converts buckets into points on a `scan_fres` Hz grid, sorted by frequency.
    ///
    /// Buckets that round onto the same grid frequency keep the higher reading.
    ///
    /// # Errors
    /// Returns `ScanParseError` when a bucket key is not a frequency.
    pub fn to_points(&self, scan_fres: f64) -> Result<Vec<ScanPoint>, ScanParseError> {
        let mut merged: BTreeMap<i64, f64> = BTreeMap::new();
        for (key, db) in &self.buckets {
            let freq_hz: f64 = key
                .trim()
                .parse()
                .map_err(|_| ScanParseError::new(format!("invalid bucket frequency: {key}")))?;
            let slot = (freq_hz / scan_fres).round() as i64;
            merged
                .entry(slot)
                .and_modify(|existing| *existing = existing.max(*db))
                .or_insert(*db);
        }

        Ok(merged
            .into_iter()
            .map(|(slot, db)| ScanPoint {
                ts: self.ts,
                freq: slot as f64 * scan_fres / 1e6,
                db,
            })
            .collect())
    }
}

/// Address of a scanner publishing sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScannerEndpoint {
    pub host: String,
    pub port: u16,
}

impl ScannerEndpoint {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ScannerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses a comma separated `host:port` list.
///
/// # Errors
/// Returns `ScanParseError` when an entry has no valid port or the list is empty.
pub fn parse_scanners(scanners: &str) -> Result<Vec<ScannerEndpoint>, ScanParseError> {
    let mut endpoints = Vec::new();
    for entry in scanners.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (host, port) = entry
            .rsplit_once(':')
            .ok_or_else(|| ScanParseError::new(format!("scanner missing port: {entry}")))?;
        if host.is_empty() {
            return Err(ScanParseError::new(format!("scanner missing host: {entry}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ScanParseError::new(format!("invalid scanner port: {entry}")))?;
        endpoints.push(ScannerEndpoint {
            host: host.to_string(),
            port,
        });
    }

    if endpoints.is_empty() {
        return Err(ScanParseError::new("no scanners configured"));
    }
    Ok(endpoints)
}

/// Error type for malformed scan input.
#[derive(Debug)]
pub struct ScanParseError {
    message: String,
}

impl ScanParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan parse error: {}", self.message)
    }
}

impl Error for ScanParseError {}

impl From<serde_json::Error> for ScanParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scanner_list() {
        let scanners = parse_scanners("127.0.0.1:8001, scanner2:9000,").unwrap();
        assert_eq!(scanners.len(), 2);
        assert_eq!(scanners[0].address(), "127.0.0.1:8001");
        assert_eq!(scanners[1].host, "scanner2");
        assert_eq!(scanners[1].port, 9000);
    }

    #[test]
    fn rejects_bad_scanner_entries() {
        assert!(parse_scanners("").is_err());
        assert!(parse_scanners("localhost").is_err());
        assert!(parse_scanners("localhost:http").is_err());
        assert!(parse_scanners(":8001").is_err());
    }

    #[test]
    fn record_points_are_rounded_and_sorted() {
        let record = ScanRecord::from_json_line(
            r#"{"ts": 10.5, "config": {"id": 1}, "buckets": {"2400020000": -150.0, "2400000004": -160.0, "2400000000": -170.0}}"#,
        )
        .unwrap();
        let points = record.to_points(1e4).unwrap();

        assert_eq!(points.len(), 2);
        assert!((points[0].freq - 2400.0).abs() < 1e-9);
        assert!((points[0].db + 160.0).abs() < 1e-9);
        assert!((points[1].freq - 2400.02).abs() < 1e-9);
        assert!(points.iter().all(|point| (point.ts - 10.5).abs() < f64::EPSILON));
    }

    #[test]
    fn record_rejects_non_numeric_bucket() {
        let record =
            ScanRecord::from_json_line(r#"{"ts": 1.0, "buckets": {"abc": -150.0}}"#).unwrap();
        assert!(record.to_points(1e4).is_err());
        assert_eq!(record.config, Value::Null);
    }

    #[test]
    fn frame_scan_time_uses_last_point() {
        let frame = ScanFrame::new(
            Vec::new(),
            vec![
                ScanPoint { ts: 1.0, freq: 1.0, db: -1.0 },
                ScanPoint { ts: 2.0, freq: 2.0, db: -1.0 },
            ],
        );
        assert_eq!(frame.scan_time(), Some(2.0));
        assert_eq!(ScanFrame::default().scan_time(), None);
    }
}
