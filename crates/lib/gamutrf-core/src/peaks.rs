//! Peak detection over a single PSD row.
//!
//! The search mirrors the classic local-maxima / prominence / width pipeline:
//! candidates are found first, then filtered by height, prominence, and width
//! in that order. Widths are measured at `rel_height` of each peak's prominence
//! with linearly interpolated crossing positions.

use std::str::FromStr;
use std::{error::Error, fmt};

use crate::numeric::{nan_mean, nan_min};

/// Inclusive bounds, either side optional.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    #[must_use]
    pub const fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    #[must_use]
    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindPeaksOptions {
    pub height: Bounds,
    pub prominence: Bounds,
    pub width: Bounds,
    pub rel_height: f64,
    /// Window, in samples, used when searching for each peak's bases.
    pub wlen: Option<usize>,
}

impl Default for FindPeaksOptions {
    fn default() -> Self {
        Self {
            height: Bounds::default(),
            prominence: Bounds::default(),
            width: Bounds::default(),
            rel_height: 0.5,
            wlen: None,
        }
    }
}

/// A detected peak and its measured properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub peak_height: f64,
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
    pub width_height: f64,
    pub left_ips: f64,
    pub right_ips: f64,
    pub width: f64,
}

/// Indices of local maxima; flat tops resolve to their (floored) midpoint.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if x.len() < 3 {
        return maxima;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

fn prominence(x: &[f64], peak: usize, wlen: Option<usize>) -> (f64, usize, usize) {
    let (mut i_min, mut i_max) = (0, x.len() - 1);
    if let Some(wlen) = wlen.filter(|wlen| *wlen >= 2) {
        let half = wlen / 2;
        i_min = peak.saturating_sub(half);
        i_max = (peak + half).min(i_max);
    }

    let height = x[peak];
    let mut left_base = peak;
    let mut left_min = height;
    let mut i = peak as isize;
    while i >= i_min as isize && x[i as usize] <= height {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_base = peak;
    let mut right_min = height;
    let mut i = peak;
    while i <= i_max && x[i] <= height {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    (height - left_min.max(right_min), left_base, right_base)
}

fn width_at(
    x: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
    rel_height: f64,
) -> (f64, f64, f64) {
    let height = x[peak] - prominence * rel_height;

    let mut i = peak;
    while left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left_ips = i as f64;
    if x[i] < height {
        left_ips += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < right_base && height < x[i] {
        i += 1;
    }
    let mut right_ips = i as f64;
    if x[i] < height {
        right_ips -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    (height, left_ips, right_ips)
}

/// Finds peaks in `x`. The input must not contain NaN.
#[must_use]
pub fn find_peaks(x: &[f64], options: &FindPeaksOptions) -> Vec<Peak> {
    local_maxima(x)
        .into_iter()
        .filter(|&index| options.height.contains(x[index]))
        .filter_map(|index| {
            let (prominence, left_base, right_base) = prominence(x, index, options.wlen);
            if !options.prominence.contains(prominence) {
                return None;
            }
            let (width_height, left_ips, right_ips) =
                width_at(x, index, prominence, left_base, right_base, options.rel_height);
            let width = right_ips - left_ips;
            options.width.contains(width).then_some(Peak {
                index,
                peak_height: x[index],
                prominence,
                left_base,
                right_base,
                width_height,
                left_ips,
                right_ips,
                width,
            })
        })
        .collect()
}

/// Drops peaks whose extent sits strictly inside another peak's extent.
#[must_use]
pub fn filter_nested_peaks(mut peaks: Vec<Peak>) -> Vec<Peak> {
    for i in (0..peaks.len()).rev() {
        let nested = peaks.iter().enumerate().any(|(j, other)| {
            i != j && peaks[i].left_ips > other.left_ips && peaks[i].right_ips < other.right_ips
        });
        if nested {
            peaks.remove(i);
        }
    }
    peaks
}

/// Detection profiles selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakFinder {
    Narrowband,
    Wideband,
}

impl PeakFinder {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Narrowband => "narrowband",
            Self::Wideband => "wideband",
        }
    }

    fn options(self, height: f64) -> FindPeaksOptions {
        match self {
            Self::Narrowband => FindPeaksOptions {
                height: Bounds::at_least(height),
                prominence: Bounds::at_least(10.0),
                width: Bounds::between(1.0, 10.0),
                rel_height: 0.7,
                wlen: Some(120),
            },
            Self::Wideband => FindPeaksOptions {
                height: Bounds::at_least(height),
                prominence: Bounds::at_least(5.0),
                width: Bounds::at_least(10.0),
                rel_height: 0.7,
                wlen: None,
            },
        }
    }

    /// Finds peaks in a PSD row that may contain NaN gaps.
    ///
    /// Gaps are filled with the row minimum. An all-NaN row yields no peaks.
    #[must_use]
    pub fn find_peaks(self, row: &[f64]) -> Vec<Peak> {
        let (Some(floor), Some(mean)) = (nan_min(row), nan_mean(row)) else {
            return Vec::new();
        };
        let filled: Vec<f64> = row
            .iter()
            .map(|value| if value.is_nan() { floor } else { *value })
            .collect();
        find_peaks(&filled, &self.options(mean))
    }
}

impl fmt::Display for PeakFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PeakFinder {
    type Err = PeakFinderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "narrowband" => Ok(Self::Narrowband),
            "wideband" => Ok(Self::Wideband),
            other => Err(PeakFinderError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeakFinderError {
    UnknownType(String),
}

impl fmt::Display for PeakFinderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(name) => write!(f, "unknown detection type: {name}"),
        }
    }
}

impl Error for PeakFinderError {}
