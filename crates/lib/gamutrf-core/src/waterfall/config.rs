use crate::numeric::linspace;

const MHZ: f64 = 1e6;
const TICK_BASE: f64 = 20.0;

/// Plot geometry and scaling, fixed for the lifetime of a waterfall.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallConfig {
    /// Lower plotted frequency, MHz.
    pub min_freq: f64,
    /// Upper plotted frequency, MHz.
    pub max_freq: f64,
    /// Width of one frequency column, MHz.
    pub freq_resolution: f64,
    pub waterfall_height: usize,
    pub psd_db_resolution: usize,
    pub snr_min: f64,
    pub snr_max: f64,
    pub y_label_skip: u64,
    pub plot_snr: bool,
    pub top_n: usize,
}

impl WaterfallConfig {
    /// Builds a config from scanner parameters given in Hz.
    #[must_use]
    pub fn new(sampling_rate: f64, fft_len: usize, min_freq: f64, max_freq: f64) -> Self {
        Self {
            min_freq: min_freq / MHZ,
            max_freq: max_freq / MHZ,
            freq_resolution: sampling_rate / fft_len as f64 / MHZ,
            waterfall_height: 100,
            psd_db_resolution: 90,
            snr_min: 0.0,
            snr_max: 50.0,
            y_label_skip: 3,
            plot_snr: false,
            top_n: 0,
        }
    }

    #[must_use]
    pub const fn with_plot_snr(mut self, plot_snr: bool) -> Self {
        self.plot_snr = plot_snr;
        self
    }

    #[must_use]
    pub const fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    #[must_use]
    pub const fn with_waterfall_height(mut self, waterfall_height: usize) -> Self {
        self.waterfall_height = waterfall_height;
        self
    }

    /// Number of frequency columns spanning `[min_freq, max_freq]`.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        ((self.max_freq - self.min_freq) / self.freq_resolution + 1.0 + 1e-9).max(1.0) as usize
    }

    /// Column centre frequencies, MHz. These double as the PSD x edges.
    #[must_use]
    pub fn freq_bins(&self) -> Vec<f64> {
        linspace(self.min_freq, self.max_freq, self.bin_count())
    }

    /// Column index for a frequency in MHz, if it lands on the grid.
    #[must_use]
    pub fn column_for(&self, freq: f64) -> Option<usize> {
        let index = ((freq - self.min_freq) / self.freq_resolution).round();
        (index >= 0.0 && (index as usize) < self.bin_count()).then_some(index as usize)
    }

    /// Frequency snapped to the column resolution.
    #[must_use]
    pub fn snap(&self, freq: f64) -> f64 {
        (freq / self.freq_resolution).round() * self.freq_resolution
    }

    /// Spacing between major frequency ticks, MHz.
    #[must_use]
    pub fn major_tick_separator(&self) -> f64 {
        let span = self.max_freq - self.min_freq;
        let n_ticks = (span / 100.0 * 5.0).min(20.0);
        if n_ticks <= 0.0 {
            return TICK_BASE;
        }
        (TICK_BASE * (span / n_ticks / TICK_BASE).round()).max(TICK_BASE)
    }
}
