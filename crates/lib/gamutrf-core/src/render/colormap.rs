//! Polynomial fits of the viridis and turbo colour maps.

use image::Rgb;

const VIRIDIS: [[f64; 3]; 7] = [
    [0.277_727_327_223_417_7, 0.005_407_344_544_966_578, 0.334_099_805_335_306_1],
    [0.105_093_043_108_577_4, 1.404_613_529_898_575, 1.384_590_162_594_685],
    [-0.330_861_828_725_556_3, 0.214_847_559_468_213, 0.095_095_163_028_236_59],
    [-4.634_230_498_983_486, -5.799_100_973_351_585, -19.332_440_956_279_87],
    [6.228_269_936_347_081, 14.179_933_366_805_09, 56.690_556_627_384_88],
    [4.776_384_997_670_288, -13.745_145_377_746_01, -65.353_032_633_372_34],
    [-5.435_455_855_934_631, 4.645_852_612_178_535, 26.312_435_249_583_2],
];

const TURBO: [[f64; 3]; 6] = [
    [0.135_721_38, 0.091_402_61, 0.106_673_30],
    [4.615_392_60, 2.194_188_39, 12.641_946_08],
    [-42.660_322_58, 4.842_966_58, -60.582_048_36],
    [132.131_082_34, -14.185_033_33, 110.362_767_71],
    [-152.942_393_96, 4.277_298_57, -89.903_109_12],
    [59.286_379_43, 2.829_566_04, 27.348_249_73],
];

fn horner(coefficients: &[[f64; 3]], t: f64) -> Rgb<u8> {
    let mut rgb = [0.0; 3];
    for (channel, value) in rgb.iter_mut().enumerate() {
        *value = coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, coefficient| acc * t + coefficient[channel]);
    }
    Rgb(rgb.map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8))
}

/// Perceptually uniform map used for the waterfall.
#[must_use]
pub fn viridis(t: f64) -> Rgb<u8> {
    horner(&VIRIDIS, t.clamp(0.0, 1.0))
}

/// High contrast map used for the PSD heatmap.
#[must_use]
pub fn turbo(t: f64) -> Rgb<u8> {
    horner(&TURBO, t.clamp(0.0, 1.0))
}
