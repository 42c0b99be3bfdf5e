//! NaN-aware numeric kernels used by the waterfall.
//!
//! Empty waterfall cells are stored as NaN, so every reduction here skips NaN
//! and reports `None` when nothing is left.

/// Returns `n` evenly spaced samples over `[start, stop]`.
#[must_use]
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

fn finite_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> impl Iterator<Item = f64> {
    values.into_iter().copied().filter(|value| !value.is_nan())
}

#[must_use]
pub fn nan_min<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    finite_values(values).reduce(f64::min)
}

#[must_use]
pub fn nan_max<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    finite_values(values).reduce(f64::max)
}

#[must_use]
pub fn nan_mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = finite_values(values).fold((0.0, 0usize), |(sum, count), value| {
        (sum + value, count + 1)
    });
    (count > 0).then(|| sum / count as f64)
}

/// Population variance, skipping NaN.
#[must_use]
pub fn nan_var<'a>(values: impl IntoIterator<Item = &'a f64> + Clone) -> Option<f64> {
    let mean = nan_mean(values.clone())?;
    let (sum, count) = finite_values(values).fold((0.0, 0usize), |(sum, count), value| {
        (sum + (value - mean) * (value - mean), count + 1)
    });
    Some(sum / count as f64)
}

#[must_use]
pub fn nan_std<'a>(values: impl IntoIterator<Item = &'a f64> + Clone) -> Option<f64> {
    nan_var(values).map(f64::sqrt)
}

/// Row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2 {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid2 {
    #[must_use]
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    #[must_use]
    pub fn nan(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, f64::NAN)
    }

    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// The most recently written row.
    #[must_use]
    pub fn last_row(&self) -> &[f64] {
        self.row(self.rows.saturating_sub(1))
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &f64> + Clone + '_ {
        self.data.iter().skip(col).step_by(self.cols.max(1))
    }

    /// Shifts every row up by one and clears the last row to NaN.
    pub fn roll_up(&mut self) {
        if self.rows == 0 {
            return;
        }
        self.data.rotate_left(self.cols);
        let last = self.rows - 1;
        self.row_mut(last).fill(f64::NAN);
    }

    /// Applies `reduce` to every column, storing NaN where it yields `None`.
    pub fn reduce_columns(&self, reduce: impl Fn(&[f64]) -> Option<f64>) -> Vec<f64> {
        (0..self.cols)
            .map(|col| {
                let column: Vec<f64> = self.column(col).copied().collect();
                reduce(&column).unwrap_or(f64::NAN)
            })
            .collect()
    }

    pub fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for value in &mut self.data {
            *value = f(*value);
        }
    }
}

fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if edges.len() < 2 || value.is_nan() || value < first || value > last {
        return None;
    }
    if value == last {
        return Some(edges.len() - 2);
    }
    Some(edges.partition_point(|edge| *edge <= value) - 1)
}

/// Two dimensional histogram over explicit bin edges.
///
/// Bins are half open except the last along each axis, which is closed.
/// The result has one row per x bin and one column per y bin.
#[must_use]
pub fn histogram2d(xs: &[f64], ys: &[f64], x_edges: &[f64], y_edges: &[f64]) -> Grid2 {
    let mut counts = Grid2::zeros(x_edges.len().saturating_sub(1), y_edges.len().saturating_sub(1));
    for (&x, &y) in xs.iter().zip(ys) {
        if let (Some(xi), Some(yi)) = (bin_index(x_edges, x), bin_index(y_edges, y)) {
            let current = counts.get(xi, yi);
            counts.set(xi, yi, current + 1.0);
        }
    }
    counts
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|offset| (-0.5 * (offset * offset) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|weight| weight / total).collect()
}

/// Half-sample symmetric reflection, `d c b a | a b c d | d c b a`.
fn reflect(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let folded = index.rem_euclid(period);
    if folded >= len as isize {
        (period - folded - 1) as usize
    } else {
        folded as usize
    }
}

fn convolve_line(line: &[f64], kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as isize;
    (0..line.len() as isize)
        .map(|center| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * line[reflect(center + k as isize - radius, line.len())])
                .sum()
        })
        .collect()
}

/// Separable Gaussian blur with `truncate = 4.0` and reflect boundaries.
#[must_use]
pub fn gaussian_filter(grid: &Grid2, sigma: f64) -> Grid2 {
    if grid.rows == 0 || grid.cols == 0 || sigma <= 0.0 {
        return grid.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let mut out = grid.clone();

    for row in 0..out.rows {
        let filtered = convolve_line(out.row(row), &kernel);
        out.row_mut(row).copy_from_slice(&filtered);
    }
    for col in 0..out.cols {
        let line: Vec<f64> = out.column(col).copied().collect();
        for (row, value) in convolve_line(&line, &kernel).into_iter().enumerate() {
            out.set(row, col, value);
        }
    }
    out
}
