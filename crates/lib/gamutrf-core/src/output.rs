//! On-disk outputs: live image, periodic snapshots, and detection logs.
//!
//! Layout under a save path:
//!
//! ```text
//! <save_path>/detections/detections_<ts>.csv
//! <save_path>/detections/detections_scan_config_<ts>.json
//! <save_path>/waterfall/waterfall_<ts>.png
//! <save_path>/waterfall/config_<ts>.json
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::{error::Error, fmt};

use chrono::{DateTime, TimeDelta, Utc};
use image::RgbImage;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::peaks::Peak;
use crate::render::encode_png;
use crate::waterfall::WaterfallState;

pub const DETECTIONS_DIR: &str = "detections";
pub const WATERFALL_DIR: &str = "waterfall";

#[derive(Debug)]
pub enum OutputError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    Image(image::ImageError),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "output io error: {err}"),
            Self::Csv(err) => write!(f, "detection csv error: {err}"),
            Self::Json(err) => write!(f, "output json error: {err}"),
            Self::Image(err) => write!(f, "image encode error: {err}"),
        }
    }
}

impl Error for OutputError {}

impl From<std::io::Error> for OutputError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for OutputError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<image::ImageError> for OutputError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err)
    }
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Writes `image` as PNG via a hidden sibling file and an atomic rename.
///
/// # Errors
/// Returns `OutputError` if encoding or any filesystem step fails.
pub fn save_png_atomic(path: &Path, image: &RgbImage) -> OutputResult<()> {
    let bytes = encode_png(image)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{file_name}"));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Resolves the save directory for the current rotation period, creating it.
///
/// With `rotate_secs == 0` the base path is used unchanged.
///
/// # Errors
/// Returns `OutputError` if the directory cannot be created.
pub fn rotated_save_path(base: &Path, rotate_secs: u64, now_secs: u64) -> OutputResult<PathBuf> {
    if rotate_secs == 0 {
        return Ok(base.to_path_buf());
    }
    let path = base.join((now_secs / rotate_secs * rotate_secs).to_string());
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Timestamp as used in output file names; whole seconds keep a `.0` suffix.
#[must_use]
pub fn timestamp_label(ts: f64) -> String {
    if ts.is_finite() && ts.fract() == 0.0 {
        format!("{ts:.1}")
    } else {
        format!("{ts}")
    }
}

fn write_pretty_json(path: &Path, value: &Value) -> OutputResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut serializer)?;
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct DetectionRow<'a> {
    timestamp: f64,
    start_freq: f64,
    end_freq: f64,
    #[serde(rename = "dB")]
    db: f64,
    #[serde(rename = "type")]
    kind: &'a str,
}

/// One scan's worth of detections to persist.
#[derive(Debug, Clone, Copy)]
pub struct DetectionBatch<'a> {
    pub scan_time: f64,
    pub scan_configs: &'a [Value],
    pub peaks: &'a [Peak],
    /// Frequency, MHz, of each PSD column.
    pub x_edges: &'a [f64],
    pub kind: &'a str,
    pub min_freq: f64,
    pub max_freq: f64,
}

/// Appends detections to per-scan CSV files and records scanner configs on change.
#[derive(Debug, Default)]
pub struct DetectionWriter {
    previous_configs: Option<Vec<Value>>,
}

impl DetectionWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            previous_configs: None,
        }
    }

    /// Persists one batch under `save_path/detections`.
    ///
    /// # Errors
    /// Returns `OutputError` if any file cannot be written.
    pub fn save(&mut self, save_path: &Path, batch: &DetectionBatch<'_>) -> OutputResult<()> {
        let dir = save_path.join(DETECTIONS_DIR);
        fs::create_dir_all(&dir)?;
        let scan_time = batch.scan_time;

        if self.previous_configs.as_deref() != Some(batch.scan_configs) {
            self.previous_configs = Some(batch.scan_configs.to_vec());
            write_pretty_json(
                &dir.join(format!("detections_scan_config_{}.json", timestamp_label(scan_time))),
                &json!({
                    "timestamp": scan_time,
                    "min_freq": batch.min_freq,
                    "max_freq": batch.max_freq,
                    "scan_configs": batch.scan_configs,
                }),
            )?;
        }

        let csv_path = dir.join(format!("detections_{}.csv", timestamp_label(scan_time)));
        let is_new = !csv_path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["timestamp", "start_freq", "end_freq", "dB", "type"])?;
        }

        let edge = |ips: f64| {
            batch
                .x_edges
                .get(ips as usize)
                .or_else(|| batch.x_edges.last())
                .copied()
                .unwrap_or(f64::NAN)
        };
        for peak in batch.peaks {
            writer.serialize(DetectionRow {
                timestamp: scan_time,
                start_freq: edge(peak.left_ips),
                end_freq: edge(peak.right_ips),
                db: peak.peak_height,
                kind: batch.kind,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Saves a waterfall snapshot every `save_time` minutes.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    last_save: Option<DateTime<Utc>>,
}

impl SnapshotWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_save: None }
    }

    /// Whether a call at `now` would write a snapshot.
    #[must_use]
    pub fn is_due(&self, save_time_minutes: u64, now: DateTime<Utc>) -> bool {
        let period = TimeDelta::minutes(i64::try_from(save_time_minutes).unwrap_or(i64::MAX));
        self.last_save.is_some_and(|last| now - last > period)
    }

    /// Writes `waterfall_<ts>.png` and `config_<ts>.json` when a period has elapsed.
    ///
    /// The first call only starts the clock. `render` is invoked only when a
    /// snapshot is written. Returns whether one was.
    ///
    /// # Errors
    /// Returns `OutputError` if any file cannot be written.
    pub fn maybe_save(
        &mut self,
        save_path: &Path,
        save_time_minutes: u64,
        scan_time: f64,
        now: DateTime<Utc>,
        state: &WaterfallState,
        render: impl FnOnce() -> RgbImage,
    ) -> OutputResult<bool> {
        if self.last_save.is_none() {
            self.last_save = Some(now);
        }
        if !self.is_due(save_time_minutes, now) {
            return Ok(false);
        }

        let dir = save_path.join(WATERFALL_DIR);
        fs::create_dir_all(&dir)?;
        let image_path = dir.join(format!("waterfall_{}.png", timestamp_label(scan_time)));
        save_png_atomic(&image_path, &render())?;

        let configs = |configs: &Option<Vec<Value>>| configs.as_ref().map_or(Value::Null, |c| json!(c));
        let summary = state.scan_window().map_or(Value::Null, |(start, end)| {
            json!({
                "start_scan_timestamp": start.ts,
                "start_scan_config": configs(&start.configs),
                "end_scan_timestamp": end.ts,
                "end_scan_config": configs(&end.configs),
            })
        });
        write_pretty_json(&dir.join(format!("config_{}.json", timestamp_label(scan_time))), &summary)?;

        self.last_save = Some(now);
        info!("Saving {}", image_path.display());
        Ok(true)
    }
}
