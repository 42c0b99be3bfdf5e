//! Core types and services for gamutRF waterfall plotting.
//!
//! This crate owns the scan data model, the NaN-aware numeric kernels the
//! waterfall relies on, peak detection, the rolling waterfall state, rasterised
//! rendering, and the on-disk output formats for snapshots and detections.

pub mod numeric;
pub mod output;
pub mod peaks;
pub mod render;
pub mod scan;
pub mod waterfall;

/// Default scanner sampling rate, Hz.
pub const SAMP_RATE: f64 = 8.192e6;
/// Default lower edge of the plotted band, Hz.
pub const MIN_FREQ: f64 = 2.2e9;
/// Default upper edge of the plotted band, Hz.
pub const MAX_FREQ: f64 = 2.6e9;
/// Frequency resolution scanner buckets are rounded to, Hz.
pub const SCAN_FRES: f64 = 1e4;
