use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gamutrf_core::output::{
    DetectionBatch,
    DetectionWriter,
    OutputResult,
    SnapshotWriter,
    rotated_save_path,
    save_png_atomic,
};
use gamutrf_core::peaks::{Peak, PeakFinder, filter_nested_peaks};
use gamutrf_core::render::Renderer;
use gamutrf_core::scan::ScanFrame;
use gamutrf_core::waterfall::{WaterfallConfig, WaterfallState, format_scan_time};
use gamutrf_receiver::ScanSource;
use tracing::{error, info};

use crate::config::WaterfallSettings;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct SavedOutputs {
    base: PathBuf,
    rotate_secs: u64,
    save_time_minutes: u64,
    detections: DetectionWriter,
    snapshots: SnapshotWriter,
}

/// Waterfall engine: owns the history and every output derived from it.
pub struct Waterfall {
    state: WaterfallState,
    renderer: Renderer,
    peak_finder: Option<PeakFinder>,
    outputs: Option<SavedOutputs>,
    live_image: Option<PathBuf>,
    peaks: Vec<Peak>,
}

impl Waterfall {
    #[must_use]
    pub fn new(settings: &WaterfallSettings, live_image: Option<PathBuf>) -> Self {
        let config = WaterfallConfig::new(
            settings.sampling_rate,
            settings.nfft,
            settings.min_freq,
            settings.max_freq,
        )
        .with_plot_snr(settings.plot_snr)
        .with_top_n(settings.n_detect);

        Self {
            state: WaterfallState::new(config),
            renderer: Renderer::default(),
            peak_finder: settings.peak_finder,
            outputs: settings.save_path.as_ref().map(|base| SavedOutputs {
                base: base.clone(),
                rotate_secs: settings.rotate_secs,
                save_time_minutes: settings.save_time_minutes,
                detections: DetectionWriter::new(),
                snapshots: SnapshotWriter::new(),
            }),
            live_image,
            peaks: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &WaterfallState {
        &self.state
    }

    #[must_use]
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Applies one poll cycle of frames and refreshes every output.
    ///
    /// Peaks are found and saved for every frame; images are refreshed once.
    /// Returns the newest scan time, or `None` if no frame landed in band.
    /// Output failures are logged and do not stop later outputs.
    pub fn update(&mut self, frames: &[ScanFrame], now: DateTime<Utc>) -> Option<f64> {
        let save_path = self.outputs.as_ref().and_then(|outputs| {
            let now_secs = u64::try_from(now.timestamp()).unwrap_or_default();
            rotated_save_path(&outputs.base, outputs.rotate_secs, now_secs)
                .map_err(|err| error!("cannot prepare save path: {err}"))
                .ok()
        });

        let keep_history = self.outputs.is_some();
        let mut latest = None;
        for frame in frames {
            let Some(scan_time) = self.state.push_frame(frame, keep_history) else {
                continue;
            };
            latest = Some(scan_time);
            let Some(finder) = self.peak_finder else {
                continue;
            };
            self.peaks = filter_nested_peaks(finder.find_peaks(self.state.latest_row()));

            if let (Some(outputs), Some(path)) = (self.outputs.as_mut(), save_path.as_deref()) {
                let config = self.state.config();
                let batch = DetectionBatch {
                    scan_time,
                    scan_configs: &frame.configs,
                    peaks: &self.peaks,
                    x_edges: self.state.freq_bins(),
                    kind: finder.name(),
                    min_freq: config.min_freq,
                    max_freq: config.max_freq,
                };
                report("save detections", outputs.detections.save(path, &batch));
            }
        }
        let scan_time = latest?;

        let mut image = None;
        if let Some(live_image) = &self.live_image {
            let rendered = self.renderer.render(&self.state, &self.peaks);
            report("write live image", save_png_atomic(live_image, &rendered));
            image = Some(rendered);
        }
        info!("Plotting {}", format_scan_time(scan_time));

        if let (Some(outputs), Some(path)) = (self.outputs.as_mut(), save_path.as_deref()) {
            let (renderer, state, peaks) = (&self.renderer, &self.state, &self.peaks);
            report(
                "save snapshot",
                outputs.snapshots.maybe_save(
                    path,
                    outputs.save_time_minutes,
                    scan_time,
                    now,
                    state,
                    || image.unwrap_or_else(|| renderer.render(state, peaks)),
                ),
            );
        }
        Some(scan_time)
    }
}

fn report<T>(what: &str, result: OutputResult<T>) {
    if let Err(err) = result {
        error!("failed to {what}: {err}");
    }
}

/// Drains every pending frame from `source`.
pub fn drain(source: &mut dyn ScanSource) -> Vec<ScanFrame> {
    std::iter::from_fn(|| source.read_buff()).collect()
}

/// Polls `source` until it fails or `shutdown` completes.
pub async fn run(
    waterfall: &mut Waterfall,
    source: &mut dyn ScanSource,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while source.healthy() {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }
        let frames = drain(source);
        if frames.is_empty() {
            continue;
        }
        tokio::task::block_in_place(|| waterfall.update(&frames, Utc::now()));
    }
}

/// Creates the output directories used under `save_path`.
///
/// # Errors
/// Returns any filesystem error.
pub fn prepare_save_dirs(save_path: &Path, detections: bool) -> std::io::Result<()> {
    std::fs::create_dir_all(save_path.join(gamutrf_core::output::WATERFALL_DIR))?;
    if detections {
        std::fs::create_dir_all(save_path.join(gamutrf_core::output::DETECTIONS_DIR))?;
    }
    Ok(())
}
