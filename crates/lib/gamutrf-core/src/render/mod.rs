//! Raster rendering of the waterfall figure.
//!
//! The figure has a PSD panel on top (one third of the plot height) and the
//! spectrogram below it, with a colour bar on the right. Both panels share the
//! frequency axis. Text is not rasterised.

mod canvas;
mod colormap;

use std::io::Cursor;

use image::{ImageFormat, ImageResult, Rgb, RgbImage};

pub use canvas::{Canvas, Stroke};
pub use colormap::{turbo, viridis};

use crate::peaks::Peak;
use crate::waterfall::WaterfallState;

const FIGURE_BACKGROUND: Rgb<u8> = Rgb([0x2A, 0x34, 0x59]);
const AXES_FACE: Rgb<u8> = Rgb([0xd2, 0xd5, 0xdd]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const PINK: Rgb<u8> = Rgb([255, 192, 203]);
const CYAN: Rgb<u8> = Rgb([0, 255, 255]);
const BROWN: Rgb<u8> = Rgb([165, 42, 42]);
const DETECTION_FILL: Rgb<u8> = Rgb([0x1f, 0x77, 0xb4]);
const DETECTION_ALPHA: f64 = 0.7;
const TOP_N_ALPHA: f64 = 0.75;

/// Pixel rectangle, inclusive of `left`/`top`, exclusive of `right`/`bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl Panel {
    #[must_use]
    pub const fn width(&self) -> i64 {
        self.right - self.left
    }

    #[must_use]
    pub const fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// Figure geometry, derived from the output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub psd: Panel,
    pub spectrogram: Panel,
    pub colorbar: Panel,
}

impl Layout {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (i64::from(width), i64::from(height));
        let left = w * 4 / 100;
        let right = w * 90 / 100;
        let top = h * 6 / 100;
        let bottom = h * 92 / 100;
        let gap = h * 6 / 100;
        let psd_bottom = top + (bottom - top - gap) / 3;
        let spectrogram_top = psd_bottom + gap;
        Self {
            width,
            height,
            psd: Panel {
                left,
                top,
                right,
                bottom: psd_bottom,
            },
            spectrogram: Panel {
                left,
                top: spectrogram_top,
                right,
                bottom,
            },
            colorbar: Panel {
                left: w * 92 / 100,
                top: spectrogram_top,
                right: w * 95 / 100,
                bottom,
            },
        }
    }
}

/// Renders waterfall figures at a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderer {
    layout: Layout,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(2800, 1000)
    }
}

struct Axes<'a> {
    state: &'a WaterfallState,
    layout: Layout,
    db_min: f64,
    db_max: f64,
}

impl Axes<'_> {
    fn freq_x(&self, freq: f64) -> i64 {
        let config = self.state.config();
        let span = (config.max_freq - config.min_freq).max(f64::EPSILON);
        let panel = self.layout.psd;
        panel.left + ((freq - config.min_freq) / span * (panel.width() - 1) as f64).round() as i64
    }

    fn db_y(&self, db: f64) -> i64 {
        let span = (self.db_max - self.db_min).max(f64::EPSILON);
        let panel = self.layout.psd;
        let fraction = ((db - self.db_min) / span).clamp(0.0, 1.0);
        panel.bottom - 1 - (fraction * (panel.height() - 1) as f64).round() as i64
    }

    /// Pixel row of the centre of a 1-based waterfall row.
    fn row_y(&self, row: usize) -> i64 {
        let height = self.state.config().waterfall_height.max(1) as f64;
        let panel = self.layout.spectrogram;
        let from_top = (height - row as f64 + 0.5) / height;
        panel.top + (from_top * panel.height() as f64) as i64
    }
}

impl Renderer {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layout: Layout::new(width, height),
        }
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Draws the full figure for the current state and detected peaks.
    #[must_use]
    pub fn render(&self, state: &WaterfallState, peaks: &[Peak]) -> RgbImage {
        let (db_min, db_max) = state.db_range();
        let axes = Axes {
            state,
            layout: self.layout,
            db_min,
            db_max,
        };
        let mut canvas = Canvas::new(self.layout.width, self.layout.height, FIGURE_BACKGROUND);

        self.draw_psd_heatmap(&mut canvas, state);
        draw_psd_lines(&mut canvas, &axes);
        draw_peaks(&mut canvas, &axes, peaks);
        self.draw_spectrogram(&mut canvas, state);
        draw_top_n(&mut canvas, &axes);
        draw_ticks(&mut canvas, &axes);
        self.draw_colorbar(&mut canvas);

        canvas.into_image()
    }

    fn draw_psd_heatmap(&self, canvas: &mut Canvas, state: &WaterfallState) {
        let heatmap = state.psd_heatmap();
        let panel = self.layout.psd;
        if heatmap.rows() == 0 || heatmap.cols() == 0 {
            canvas.fill_rect(panel.left, panel.top, panel.right - 1, panel.bottom - 1, AXES_FACE);
            return;
        }
        for py in panel.top..panel.bottom {
            let up = (panel.bottom - 1 - py) as f64 / panel.height() as f64;
            let db_bin = ((up * heatmap.cols() as f64) as usize).min(heatmap.cols() - 1);
            for px in panel.left..panel.right {
                let across = (px - panel.left) as f64 / panel.width() as f64;
                let freq_bin = ((across * heatmap.rows() as f64) as usize).min(heatmap.rows() - 1);
                canvas.put(px, py, turbo(heatmap.get(freq_bin, db_bin)));
            }
        }
    }

    fn draw_spectrogram(&self, canvas: &mut Canvas, state: &WaterfallState) {
        let normalized = state.normalized();
        let panel = self.layout.spectrogram;
        let (rows, cols) = (normalized.rows(), normalized.cols());
        if rows == 0 || cols == 0 {
            canvas.fill_rect(panel.left, panel.top, panel.right - 1, panel.bottom - 1, AXES_FACE);
            return;
        }
        for py in panel.top..panel.bottom {
            let down = (py - panel.top) as f64 / panel.height() as f64;
            let row = rows - 1 - ((down * rows as f64) as usize).min(rows - 1);
            for px in panel.left..panel.right {
                let across = (px - panel.left) as f64 / panel.width() as f64;
                let col = ((across * cols as f64) as usize).min(cols - 1);
                let value = normalized.get(row, col);
                let color = if value.is_nan() { AXES_FACE } else { viridis(value) };
                canvas.put(px, py, color);
            }
        }
    }

    fn draw_colorbar(&self, canvas: &mut Canvas) {
        let panel = self.layout.colorbar;
        for py in panel.top..panel.bottom {
            let up = (panel.bottom - 1 - py) as f64 / (panel.height() - 1).max(1) as f64;
            canvas.fill_rect(panel.left, py, panel.right - 1, py, viridis(up));
        }
    }
}

fn column_series(axes: &Axes<'_>, values: &[f64]) -> Vec<Option<(i64, i64)>> {
    axes.state
        .freq_bins()
        .iter()
        .zip(values)
        .map(|(freq, db)| (!db.is_nan()).then(|| (axes.freq_x(*freq), axes.db_y(*db))))
        .collect()
}

fn draw_psd_lines(canvas: &mut Canvas, axes: &Axes<'_>) {
    let state = axes.state;
    canvas.polyline(&column_series(axes, &state.column_max()), RED, Stroke::Dotted);
    canvas.polyline(&column_series(axes, &state.column_min()), PINK, Stroke::Dotted);
    canvas.polyline(&column_series(axes, &state.column_mean()), CYAN, Stroke::Dotted);
    canvas.polyline(&column_series(axes, state.latest_row()), RED, Stroke::Solid);
}

fn draw_peaks(canvas: &mut Canvas, axes: &Axes<'_>, peaks: &[Peak]) {
    let bins = axes.state.freq_bins();
    let edge = |ips: f64| bins[(ips as usize).min(bins.len() - 1)];
    let floor_y = axes.db_y(axes.db_min);

    for peak in peaks {
        let left = axes.freq_x(edge(peak.left_ips));
        let right = axes.freq_x(edge(peak.right_ips));
        let top = axes.db_y(peak.peak_height);
        canvas.blend_rect(left, top, right, floor_y, DETECTION_FILL, DETECTION_ALPHA);
        canvas.vline(left, floor_y, top, WHITE, Stroke::Solid);
        canvas.vline(right, floor_y, top, WHITE, Stroke::Solid);
        canvas.hline(left, right, axes.db_y(peak.width_height), WHITE, Stroke::Solid);

        let center = axes.freq_x(bins[peak.index.min(bins.len() - 1)]);
        canvas.vline(
            center,
            axes.db_y(peak.peak_height - peak.prominence),
            top,
            WHITE,
            Stroke::Solid,
        );
        canvas.triangle(center, axes.db_y(peak.width_height), 12, WHITE);
    }
}

fn draw_top_n(canvas: &mut Canvas, axes: &Axes<'_>) {
    let panel = axes.layout.spectrogram;
    for freq in axes.state.top_n_bins(axes.state.config().top_n) {
        let x = axes.freq_x(freq);
        for y in panel.top..panel.bottom {
            if Stroke::Dotted.draws((y - panel.top) as usize) {
                canvas.blend(x, y, BROWN, TOP_N_ALPHA);
            }
        }
    }
}

fn draw_ticks(canvas: &mut Canvas, axes: &Axes<'_>) {
    let config = axes.state.config();
    let separator = config.major_tick_separator();
    let mut freq = (config.min_freq / separator).ceil() * separator;
    while freq <= config.max_freq {
        let x = axes.freq_x(freq);
        for panel in [axes.layout.psd, axes.layout.spectrogram] {
            canvas.vline(x, panel.bottom, panel.bottom + 8, WHITE, Stroke::Solid);
        }
        freq += separator;
    }

    let left = axes.layout.spectrogram.left;
    for tick in axes.state.y_ticks() {
        let length = if tick.label.is_empty() { 4 } else { 8 };
        canvas.hline(left - length, left - 1, axes.row_y(tick.row), WHITE, Stroke::Solid);
    }
}

/// Encodes an image as PNG.
///
/// # Errors
/// Returns the encoder error if the image cannot be written.
pub fn encode_png(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peaks::PeakFinder;
    use crate::scan::{ScanFrame, ScanPoint};
    use crate::waterfall::WaterfallConfig;

    fn populated_state() -> WaterfallState {
        let config = WaterfallConfig::new(1e6, 10, 100e6, 110e6)
            .with_waterfall_height(10)
            .with_top_n(2);
        let mut state = WaterfallState::new(config);
        for ts in 0..3 {
            let points = (0..=100)
                .map(|i| {
                    let freq = 100.0 + f64::from(i) * 0.1;
                    let db = if (48..=52).contains(&i) { -150.0 } else { -200.0 + f64::from(ts) };
                    ScanPoint { ts: f64::from(ts), freq, db }
                })
                .collect();
            state.push_frame(&ScanFrame::new(Vec::new(), points), false);
        }
        state
    }

    #[test]
    fn layout_stacks_panels() {
        let layout = Layout::new(2800, 1000);
        assert!(layout.psd.bottom < layout.spectrogram.top);
        assert_eq!(layout.psd.left, layout.spectrogram.left);
        assert!(layout.spectrogram.height() > layout.psd.height());
        assert!(layout.colorbar.left > layout.spectrogram.right);
    }

    #[test]
    fn renders_empty_rows_in_face_colour() {
        let renderer = Renderer::new(400, 200);
        let state = populated_state();
        let image = renderer.render(&state, &[]);
        let layout = renderer.layout();

        assert_eq!((image.width(), image.height()), (400, 200));
        assert_eq!(*image.get_pixel(0, 0), FIGURE_BACKGROUND);
        let panel = layout.spectrogram;
        let newest = image.get_pixel(panel.left as u32 + 1, panel.top as u32 + 1);
        assert_eq!(*newest, viridis(state.normalized().get(9, 0)));
        assert_eq!(*image.get_pixel(panel.left as u32 + 1, panel.bottom as u32 - 1), AXES_FACE);
    }

    #[test]
    fn colorbar_runs_low_to_high() {
        let renderer = Renderer::new(400, 200);
        let image = renderer.render(&populated_state(), &[]);
        let bar = renderer.layout().colorbar;
        let x = bar.left as u32;
        assert_eq!(*image.get_pixel(x, bar.bottom as u32 - 1), viridis(0.0));
        assert_eq!(*image.get_pixel(x, bar.top as u32), viridis(1.0));
    }

    #[test]
    fn renders_detections_and_encodes_png() {
        let state = populated_state();
        let peaks = PeakFinder::Narrowband.find_peaks(state.latest_row());
        assert_eq!(peaks.len(), 1);
        let image = Renderer::new(600, 300).render(&state, &peaks);
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
