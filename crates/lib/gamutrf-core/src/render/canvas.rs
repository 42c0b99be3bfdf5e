use image::{Rgb, RgbImage};

/// Line dash style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Solid,
    Dotted,
}

impl Stroke {
    /// Whether the `step`-th pixel along a line is inked.
    #[must_use]
    pub const fn draws(self, step: usize) -> bool {
        match self {
            Self::Solid => true,
            Self::Dotted => step % 6 < 3,
        }
    }
}

/// Clipped drawing primitives over an RGB image.
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    #[must_use]
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, background),
        }
    }

    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.image.width()) && y < i64::from(self.image.height())
    }

    pub fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if self.in_bounds(x, y) {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Alpha-blends `color` over the existing pixel.
    pub fn blend(&mut self, x: i64, y: i64, color: Rgb<u8>, alpha: f64) {
        if !self.in_bounds(x, y) {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in pixel.0.iter_mut().zip(color.0) {
            *dst = (f64::from(src) * alpha + f64::from(*dst) * (1.0 - alpha)).round() as u8;
        }
    }

    /// Fills the inclusive rectangle spanned by the two corners.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.put(x, y, color);
            }
        }
    }

    pub fn blend_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>, alpha: f64) {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.blend(x, y, color, alpha);
            }
        }
    }

    /// Bresenham line between two points.
    pub fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, stroke: Stroke) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0;
        loop {
            if stroke.draws(step) {
                self.put(x, y, color);
            }
            if (x, y) == to {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                x += sx;
            }
            if doubled <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }

    pub fn vline(&mut self, x: i64, y0: i64, y1: i64, color: Rgb<u8>, stroke: Stroke) {
        self.line((x, y0), (x, y1), color, stroke);
    }

    pub fn hline(&mut self, x0: i64, x1: i64, y: i64, color: Rgb<u8>, stroke: Stroke) {
        self.line((x0, y), (x1, y), color, stroke);
    }

    /// Connects consecutive points, breaking the line at `None` gaps.
    pub fn polyline(&mut self, points: &[Option<(i64, i64)>], color: Rgb<u8>, stroke: Stroke) {
        for pair in points.windows(2) {
            match (pair[0], pair[1]) {
                (Some(from), Some(to)) => self.line(from, to, color, stroke),
                (Some(point), None) | (None, Some(point)) => self.put(point.0, point.1, color),
                (None, None) => {}
            }
        }
    }

    /// Upward pointing filled triangle centred on `(x, y)`.
    pub fn triangle(&mut self, x: i64, y: i64, size: i64, color: Rgb<u8>) {
        for row in 0..=size {
            let half = row / 2;
            self.hline(x - half, x + half, y - size / 2 + row, color, Stroke::Solid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn draws_clipped_lines() {
        let mut canvas = Canvas::new(10, 10, BLACK);
        canvas.line((-5, 5), (20, 5), WHITE, Stroke::Solid);
        let image = canvas.into_image();
        assert!((0..10).all(|x| *image.get_pixel(x, 5) == WHITE));
        assert_eq!(*image.get_pixel(0, 4), BLACK);
    }

    #[test]
    fn dotted_lines_leave_gaps() {
        let mut canvas = Canvas::new(12, 1, BLACK);
        canvas.hline(0, 11, 0, WHITE, Stroke::Dotted);
        let image = canvas.into_image();
        let lit = (0..12).filter(|x| *image.get_pixel(*x, 0) == WHITE).count();
        assert_eq!(lit, 6);
    }

    #[test]
    fn blends_toward_color() {
        let mut canvas = Canvas::new(1, 1, BLACK);
        canvas.blend_rect(0, 0, 0, 0, WHITE, 0.5);
        assert_eq!(*canvas.into_image().get_pixel(0, 0), Rgb([128, 128, 128]));
    }

    #[test]
    fn polyline_breaks_on_gaps() {
        let mut canvas = Canvas::new(10, 1, BLACK);
        canvas.polyline(&[Some((0, 0)), Some((3, 0)), None, Some((7, 0)), Some((9, 0))], WHITE, Stroke::Solid);
        let image = canvas.into_image();
        assert_eq!(*image.get_pixel(2, 0), WHITE);
        assert_eq!(*image.get_pixel(5, 0), BLACK);
        assert_eq!(*image.get_pixel(8, 0), WHITE);
    }
}
