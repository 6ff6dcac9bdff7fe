// THEORY:
// The color sampler turns a located pattern back into dot values.
//
// Algorithm steps:
// 1.  **Projection**: every layout dot (and every anchor) is pushed through the
//     transform to find where it should appear in the capture.
// 2.  **Neighborhood Averaging**: the pixels within a small disc around each expected
//     position are averaged. The disc radius scales with the transform, so a distant
//     pattern is sampled with a proportionally smaller footprint. The mean of a disc is
//     robust to sensor noise and to a slightly misplaced grid.
// 3.  **White Balance**: the three anchors are known to be pure white. Their averaged
//     reading yields a per-channel gain (255 / measured), capped so that a slightly
//     tinted capture is corrected but a dim, untrustworthy one is never amplified.
// 4.  **Classification**: a corrected sample with real color in it is matched to the
//     nearest palette hue, which is stable under exposure changes. Dark or washed-out
//     samples have no meaningful hue and fall back to the nearest palette RGB.
//
// Dots are independent of each other, so sampling can be spread across threads. Each
// worker reads the shared capture and writes only its own slice of the output.

use crate::config::{Config, DecoderConfig};
use crate::core_modules::capture::PixelView;
use crate::core_modules::geometry::Layout;
use crate::core_modules::palette::PALETTE;
use crate::core_modules::pixel::pixel::{ColorSample, hue_distance};
use crate::core_modules::transform::Transform;

/// Per-channel gain derived from the anchors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalance {
    pub gain: [f32; 3],
    /// Mean anchor reading, if any anchor landed on the image.
    pub measured: Option<ColorSample>,
    /// False when the anchors were too dim to trust and unit gain was used.
    pub calibrated: bool,
}

impl WhiteBalance {
    pub const IDENTITY: WhiteBalance = WhiteBalance {
        gain: [1.0, 1.0, 1.0],
        measured: None,
        calibrated: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// Nearest palette hue.
    #[default]
    Hue,
    /// Nearest palette color in RGB space.
    Rgb,
}

/// What was read at one dot position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DotSample {
    /// Expected pixel position.
    pub x: f64,
    pub y: f64,
    pub raw: ColorSample,
    pub corrected: ColorSample,
    pub value: u8,
    pub matched_by: MatchMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    /// One palette index per layout dot, in wire order.
    pub dot_values: Vec<u8>,
    pub samples: Vec<DotSample>,
    pub white_balance: WhiteBalance,
}

#[derive(Debug, Clone)]
pub struct ColorSampler {
    /// Palette entries usable for the configured bits per dot.
    palette: Vec<ColorSample>,
    palette_hues: Vec<f32>,
    radius_factor: f64,
    white_balance_min_brightness: f32,
    white_balance_max_gain: f32,
    hue_min_saturation: f32,
    hue_min_value: f32,
    parallel: bool,
}

impl ColorSampler {
    pub fn new(config: &Config, decoder: &DecoderConfig) -> Self {
        let usable = config.symbol_count().min(PALETTE.len());
        let palette: Vec<ColorSample> = PALETTE[..usable]
            .iter()
            .map(|c| ColorSample::new(c.r as f32, c.g as f32, c.b as f32))
            .collect();
        let palette_hues = palette.iter().map(ColorSample::hue).collect();

        Self {
            palette,
            palette_hues,
            radius_factor: decoder.sample_radius_factor,
            white_balance_min_brightness: decoder.white_balance_min_brightness,
            white_balance_max_gain: decoder.white_balance_max_gain,
            hue_min_saturation: decoder.hue_min_saturation,
            hue_min_value: decoder.hue_min_value,
            parallel: decoder.parallel_sampling,
        }
    }

    /// Sampling disc radius in pixels for a transform.
    pub fn sample_radius(&self, transform: &Transform) -> f64 {
        self.radius_factor * transform.scale
    }

    /// Samples and classifies every layout dot.
    pub fn sample(
        &self,
        view: &PixelView<'_>,
        transform: &Transform,
        layout: &Layout,
    ) -> SampleResult {
        let white_balance = self.white_balance(view, transform, layout);
        let radius = self.sample_radius(transform);
        let positions: Vec<(f64, f64)> = layout
            .positions()
            .map(|p| transform.project(p.x, p.y))
            .collect();

        let mut samples = vec![DotSample::default(); positions.len()];
        let workers = num_cpus::get().max(1);
        if self.parallel && workers > 1 && positions.len() > workers {
            let chunk_len = positions.len().div_ceil(workers);
            std::thread::scope(|scope| {
                for (out, inputs) in samples
                    .chunks_mut(chunk_len)
                    .zip(positions.chunks(chunk_len))
                {
                    scope.spawn(move || {
                        for (slot, &position) in out.iter_mut().zip(inputs) {
                            *slot = self.sample_dot(view, position, radius, &white_balance);
                        }
                    });
                }
            });
        } else {
            for (slot, &position) in samples.iter_mut().zip(&positions) {
                *slot = self.sample_dot(view, position, radius, &white_balance);
            }
        }

        SampleResult {
            dot_values: samples.iter().map(|s| s.value).collect(),
            samples,
            white_balance,
        }
    }

    fn sample_dot(
        &self,
        view: &PixelView<'_>,
        (x, y): (f64, f64),
        radius: f64,
        white_balance: &WhiteBalance,
    ) -> DotSample {
        // A dot projected off the image reads as background black.
        let raw = view.average_disc(x, y, radius).unwrap_or_default();
        let corrected = raw.scaled(white_balance.gain);
        let (value, matched_by) = self.classify(&corrected);
        DotSample {
            x,
            y,
            raw,
            corrected,
            value,
            matched_by,
        }
    }

    /// Derives the white-balance gain from the three anchors.
    pub fn white_balance(
        &self,
        view: &PixelView<'_>,
        transform: &Transform,
        layout: &Layout,
    ) -> WhiteBalance {
        let radius = self.sample_radius(transform);
        let readings: Vec<ColorSample> = layout
            .anchors()
            .iter()
            .filter_map(|anchor| {
                let (x, y) = transform.project(anchor.x, anchor.y);
                view.average_disc(x, y, radius)
            })
            .collect();
        if readings.is_empty() {
            return WhiteBalance::IDENTITY;
        }

        let n = readings.len() as f32;
        let measured = ColorSample::new(
            readings.iter().map(|s| s.red).sum::<f32>() / n,
            readings.iter().map(|s| s.green).sum::<f32>() / n,
            readings.iter().map(|s| s.blue).sum::<f32>() / n,
        );

        if measured.brightness() < self.white_balance_min_brightness {
            tracing::warn!(
                "anchors too dim for white balance (brightness {:.0}); using unit gain",
                measured.brightness()
            );
            return WhiteBalance {
                measured: Some(measured),
                ..WhiteBalance::IDENTITY
            };
        }

        let gain_for = |channel: f32| {
            if channel <= 0.0 {
                self.white_balance_max_gain
            } else {
                (255.0 / channel).min(self.white_balance_max_gain)
            }
        };
        WhiteBalance {
            gain: [
                gain_for(measured.red),
                gain_for(measured.green),
                gain_for(measured.blue),
            ],
            measured: Some(measured),
            calibrated: true,
        }
    }

    /// Maps a (white-balanced) sample to a palette index.
    pub fn classify(&self, sample: &ColorSample) -> (u8, MatchMethod) {
        let chromatic = sample.saturation_hsv() > self.hue_min_saturation
            && sample.value_hsv() > self.hue_min_value;

        if chromatic {
            let hue = sample.hue();
            (nearest(&self.palette_hues, |&h| hue_distance(hue, h)), MatchMethod::Hue)
        } else {
            (nearest(&self.palette, |p| sample.distance(p)), MatchMethod::Rgb)
        }
    }
}

/// Index of the entry with the smallest distance. The first wins ties.
fn nearest<T>(entries: &[T], distance: impl Fn(&T) -> f32) -> u8 {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, entry) in entries.iter().enumerate() {
        let d = distance(entry);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best as u8
}
