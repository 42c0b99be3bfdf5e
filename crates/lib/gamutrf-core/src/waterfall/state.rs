use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::info;

use crate::numeric::{
    Grid2,
    gaussian_filter,
    histogram2d,
    linspace,
    nan_max,
    nan_mean,
    nan_min,
    nan_var,
};
use crate::scan::ScanFrame;
use crate::waterfall::WaterfallConfig;

const INITIAL_DB_MIN: f64 = -220.0;
const INITIAL_DB_MAX: f64 = -150.0;
const HEATMAP_SIGMA: f64 = 2.0;
const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A retained scan and, when saving, the scanner configs that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub ts: f64,
    pub configs: Option<Vec<Value>>,
}

/// A time label on the waterfall axis. Row 1 is the oldest, `waterfall_height` the newest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YTick {
    pub row: usize,
    pub label: String,
}

/// Waterfall history: one row per scan, one column per frequency bin.
#[derive(Debug, Clone)]
pub struct WaterfallState {
    config: WaterfallConfig,
    freq_bins: Vec<f64>,
    db_data: Grid2,
    freq_data: Grid2,
    db_min: f64,
    db_max: f64,
    scans: VecDeque<ScanEntry>,
    y_ticks: Vec<YTick>,
    counter: u64,
}

impl WaterfallState {
    #[must_use]
    pub fn new(config: WaterfallConfig) -> Self {
        let freq_bins = config.freq_bins();
        let (rows, cols) = (config.waterfall_height, freq_bins.len());
        Self {
            config,
            freq_bins,
            db_data: Grid2::nan(rows, cols),
            freq_data: Grid2::nan(rows, cols),
            db_min: INITIAL_DB_MIN,
            db_max: INITIAL_DB_MAX,
            scans: VecDeque::new(),
            y_ticks: Vec::new(),
            counter: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &WaterfallConfig {
        &self.config
    }

    /// Column frequencies, MHz. Also the PSD x edges.
    #[must_use]
    pub fn freq_bins(&self) -> &[f64] {
        &self.freq_bins
    }

    #[must_use]
    pub const fn db_data(&self) -> &Grid2 {
        &self.db_data
    }

    #[must_use]
    pub const fn db_range(&self) -> (f64, f64) {
        (self.db_min, self.db_max)
    }

    /// Power readings of the newest row.
    #[must_use]
    pub fn latest_row(&self) -> &[f64] {
        self.db_data.last_row()
    }

    #[must_use]
    pub fn y_ticks(&self) -> &[YTick] {
        &self.y_ticks
    }

    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    pub fn scans(&self) -> impl Iterator<Item = &ScanEntry> {
        self.scans.iter()
    }

    /// Oldest and newest retained scans.
    #[must_use]
    pub fn scan_window(&self) -> Option<(&ScanEntry, &ScanEntry)> {
        Some((self.scans.front()?, self.scans.back()?))
    }

    /// Appends a frame as the newest row and returns its scan time.
    ///
    /// Points outside the configured band are dropped; a frame with nothing
    /// left in band leaves the state untouched and returns `None`.
    pub fn push_frame(&mut self, frame: &ScanFrame, keep_history: bool) -> Option<f64> {
        let (min_freq, max_freq) = (self.config.min_freq, self.config.max_freq);
        let in_band: Vec<_> = frame
            .points
            .iter()
            .filter(|point| point.freq >= min_freq && point.freq <= max_freq)
            .collect();
        let Some(last) = in_band.last() else {
            info!("Scan is outside specified frequency range ({min_freq} to {max_freq}).");
            return None;
        };
        let scan_time = last.ts;

        self.freq_data.roll_up();
        self.db_data.roll_up();
        let row = self.config.waterfall_height - 1;
        for point in &in_band {
            if let Some(col) = self.config.column_for(point.freq) {
                self.freq_data.set(row, col, self.config.snap(point.freq));
                self.db_data.set(row, col, point.db);
            }
        }

        self.scans.push_back(ScanEntry {
            ts: scan_time,
            configs: keep_history.then(|| frame.configs.clone()),
        });
        while self.scans.len() > self.config.waterfall_height {
            self.scans.pop_front();
        }

        self.push_tick(scan_time);
        self.counter += 1;

        if let (Some(db_min), Some(db_max)) =
            (nan_min(self.db_data.values()), nan_max(self.db_data.values()))
        {
            self.db_min = db_min;
            self.db_max = db_max;
        }
        Some(scan_time)
    }

    fn push_tick(&mut self, scan_time: f64) {
        let label = if self.counter % self.config.y_label_skip.max(1) == 0 {
            format_scan_time(scan_time)
        } else {
            String::new()
        };
        for tick in &mut self.y_ticks {
            tick.row = tick.row.saturating_sub(1);
        }
        self.y_ticks.retain(|tick| tick.row >= 1);
        self.y_ticks.push(YTick {
            row: self.config.waterfall_height,
            label,
        });
    }

    /// PSD y edges spanning the observed power range.
    #[must_use]
    pub fn psd_y_edges(&self) -> Vec<f64> {
        let (mut low, mut high) = (self.db_min, self.db_max);
        if high <= low {
            low -= 0.5;
            high += 0.5;
        }
        linspace(low, high, self.config.psd_db_resolution)
    }

    /// Smoothed (frequency, power) occupancy, normalised to a peak of 1.
    ///
    /// Rows are frequency bins, columns are power bins.
    #[must_use]
    pub fn psd_heatmap(&self) -> Grid2 {
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .freq_data
            .values()
            .iter()
            .zip(self.db_data.values())
            .filter(|(freq, db)| !freq.is_nan() && !db.is_nan())
            .map(|(freq, db)| (*freq, *db))
            .unzip();
        let counts = histogram2d(&xs, &ys, &self.freq_bins, &self.psd_y_edges());
        let mut heatmap = gaussian_filter(&counts, HEATMAP_SIGMA);
        if let Some(peak) = nan_max(heatmap.values()).filter(|peak| *peak > 0.0) {
            heatmap.map_in_place(|value| value / peak);
        }
        heatmap
    }

    #[must_use]
    pub fn column_min(&self) -> Vec<f64> {
        self.db_data.reduce_columns(|column| nan_min(column))
    }

    #[must_use]
    pub fn column_max(&self) -> Vec<f64> {
        self.db_data.reduce_columns(|column| nan_max(column))
    }

    #[must_use]
    pub fn column_mean(&self) -> Vec<f64> {
        self.db_data.reduce_columns(|column| nan_mean(column))
    }

    /// Frequencies of the `n` columns whose power varies most over time.
    ///
    /// Empty columns rank below every populated one.
    #[must_use]
    pub fn top_n_bins(&self, n: usize) -> Vec<f64> {
        let variance = self.db_data.reduce_columns(|column| nan_var(column));
        let mut order: Vec<usize> = (0..variance.len()).collect();
        order.sort_by(|&a, &b| {
            let (va, vb) = (variance[a], variance[b]);
            match (va.is_nan(), vb.is_nan()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => vb.total_cmp(&va),
            }
        });
        order
            .into_iter()
            .take(n)
            .map(|col| self.freq_bins[col])
            .collect()
    }

    /// The waterfall scaled to `[0, 1]` for colour mapping; NaN stays NaN.
    #[must_use]
    pub fn normalized(&self) -> Grid2 {
        let mut normalized = self.db_data.clone();
        if self.config.plot_snr {
            let floors = self.column_min();
            let span = non_zero(self.config.snr_max - self.config.snr_min);
            let snr_min = self.config.snr_min;
            for row in 0..normalized.rows() {
                for (value, floor) in normalized.row_mut(row).iter_mut().zip(&floors) {
                    *value = ((*value - floor) - snr_min) / span;
                }
            }
        } else {
            let (db_min, span) = (self.db_min, non_zero(self.db_max - self.db_min));
            normalized.map_in_place(|value| (value - db_min) / span);
        }
        normalized
    }

    /// Value range represented by the colour bar.
    #[must_use]
    pub const fn colorbar_limits(&self) -> (f64, f64) {
        if self.config.plot_snr {
            (self.config.snr_min, self.config.snr_max)
        } else {
            (self.db_min, self.db_max)
        }
    }
}

fn non_zero(span: f64) -> f64 {
    if span > 0.0 { span } else { 1.0 }
}

/// Formats a scan timestamp as local wall-clock time.
#[must_use]
pub fn format_scan_time(scan_time: f64) -> String {
    let secs = scan_time.floor();
    let nanos = ((scan_time - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos).map_or_else(
        || scan_time.to_string(),
        |time| time.with_timezone(&Local).format(LABEL_FORMAT).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanPoint;
    use serde_json::json;

    fn small_config() -> WaterfallConfig {
        WaterfallConfig::new(1e6, 10, 100e6, 101e6).with_waterfall_height(4)
    }

    fn frame(ts: f64, readings: &[(f64, f64)]) -> ScanFrame {
        ScanFrame::new(
            vec![json!({ "ts": ts })],
            readings
                .iter()
                .map(|&(freq, db)| ScanPoint { ts, freq, db })
                .collect(),
        )
    }

    #[test]
    fn out_of_band_frames_are_ignored() {
        let mut state = WaterfallState::new(small_config());
        assert_eq!(state.push_frame(&frame(1.0, &[(50.0, -100.0), (200.0, -90.0)]), true), None);
        assert_eq!(state.counter(), 0);
        assert!(state.scan_window().is_none());
        assert_eq!(state.db_range(), (INITIAL_DB_MIN, INITIAL_DB_MAX));
    }

    #[test]
    fn pushes_rows_and_rolls_history() {
        let mut state = WaterfallState::new(small_config());
        for i in 0..5 {
            let ts = f64::from(i);
            let scan_time = state.push_frame(&frame(ts, &[(100.0, -200.0 + ts), (100.5, -180.0)]), true);
            assert_eq!(scan_time, Some(ts));
        }

        assert_eq!(state.scans().count(), 4);
        let (first, last) = state.scan_window().unwrap();
        assert!((first.ts - 1.0).abs() < f64::EPSILON);
        assert!((last.ts - 4.0).abs() < f64::EPSILON);
        assert_eq!(last.configs, Some(vec![json!({ "ts": 4.0 })]));

        let latest = state.latest_row();
        assert!((latest[0] + 196.0).abs() < 1e-9);
        assert!((latest[5] + 180.0).abs() < 1e-9);
        assert!(latest[1].is_nan());

        assert_eq!(state.db_range(), (-199.0, -180.0));
        assert!((state.db_data().get(0, 0) + 199.0).abs() < 1e-9);
    }

    #[test]
    fn history_configs_only_kept_when_saving() {
        let mut state = WaterfallState::new(small_config());
        state.push_frame(&frame(1.0, &[(100.0, -150.0)]), false);
        assert_eq!(state.scan_window().unwrap().0.configs, None);
    }

    #[test]
    fn flat_power_range_stays_finite() {
        let mut state = WaterfallState::new(small_config());
        let readings: Vec<(f64, f64)> = (0..=10).map(|i| (100.0 + 0.1 * f64::from(i), -150.0)).collect();
        state.push_frame(&frame(1.0, &readings), false);
        assert_eq!(state.db_range(), (-150.0, -150.0));

        let edges = state.psd_y_edges();
        assert!((edges[0] + 150.5).abs() < 1e-9);
        assert!((edges[edges.len() - 1] + 149.5).abs() < 1e-9);

        let heatmap = state.psd_heatmap();
        assert!(heatmap.values().iter().all(|value| value.is_finite()));
        assert!((nan_max(heatmap.values()).unwrap() - 1.0).abs() < 1e-9);

        let populated: Vec<f64> = state
            .normalized()
            .last_row()
            .iter()
            .copied()
            .filter(|value| !value.is_nan())
            .collect();
        assert!(!populated.is_empty());
        assert!(populated.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn ticks_decrement_and_expire() {
        let mut state = WaterfallState::new(small_config());
        for i in 0..6 {
            state.push_frame(&frame(1_700_000_000.0 + f64::from(i), &[(100.0, -150.0)]), false);
        }

        let rows: Vec<usize> = state.y_ticks().iter().map(|tick| tick.row).collect();
        assert_eq!(rows, vec![1, 2, 3, 4]);
        let labelled: Vec<bool> = state.y_ticks().iter().map(|tick| !tick.label.is_empty()).collect();
        assert_eq!(labelled, vec![false, true, false, false]);
    }

    #[test]
    fn top_bins_prefer_varying_columns() {
        let mut state = WaterfallState::new(small_config());
        state.push_frame(&frame(1.0, &[(100.0, -150.0), (100.3, -150.0)]), false);
        state.push_frame(&frame(2.0, &[(100.0, -150.0), (100.3, -120.0)]), false);

        let bins = state.top_n_bins(2);
        assert_eq!(bins.len(), 2);
        assert!((bins[0] - 100.3).abs() < 1e-9);
        assert!((bins[1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn normalizes_power_and_snr() {
        let mut state = WaterfallState::new(small_config());
        state.push_frame(&frame(1.0, &[(100.0, -150.0)]), false);
        state.push_frame(&frame(2.0, &[(100.0, -100.0)]), false);

        let normalized = state.normalized();
        assert!((normalized.get(3, 0) - 1.0).abs() < 1e-9);
        assert!(normalized.get(2, 0).abs() < 1e-9);
        assert!(normalized.get(0, 0).is_nan());

        let mut snr = WaterfallState::new(small_config().with_plot_snr(true));
        snr.push_frame(&frame(1.0, &[(100.0, -150.0)]), false);
        snr.push_frame(&frame(2.0, &[(100.0, -125.0)]), false);
        assert!((snr.normalized().get(3, 0) - 0.5).abs() < 1e-9);
        assert_eq!(snr.colorbar_limits(), (0.0, 50.0));
    }

    #[test]
    fn heatmap_is_normalised() {
        let mut state = WaterfallState::new(small_config());
        assert!(state.psd_heatmap().values().iter().all(|value| *value == 0.0));

        state.push_frame(&frame(1.0, &[(100.0, -150.0), (100.5, -140.0)]), false);
        let heatmap = state.psd_heatmap();
        assert_eq!(heatmap.rows(), 10);
        assert_eq!(heatmap.cols(), 89);
        let peak = nan_max(heatmap.values()).unwrap();
        assert!((peak - 1.0).abs() < 1e-9);
    }
}
