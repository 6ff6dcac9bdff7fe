// THEORY:
// The transform is the bridge between normalized pattern space and the camera's pixel
// grid. It has four degrees of freedom: center (x, y), uniform scale and in-plane
// rotation. Perspective and lens distortion are not modeled.
//
// Estimation works on a single capture:
// 1.  **Triple Search**: every combination of three among the K largest blobs is a
//     candidate anchor triangle. It must be roughly equilateral (each side within a
//     relative tolerance of the mean side) and its blobs of comparable size; a glare
//     patch next to two real anchors fails the size check.
// 2.  **Dark Center**: the pattern is drawn on a dark background, so a triangle whose
//     centroid is bright is most likely UI chrome, not the pattern.
// 3.  **Recovery**: center is the centroid, scale is the mean vertex distance over the
//     anchor radius, and rotation is how far the lowest vertex (the bottom anchor) has
//     turned from straight down.
//
// Stabilization adds memory across captures. One transform is cached. A fresh estimate
// only replaces it when it agrees within the drift bounds; otherwise the cache wins.
// A single bad capture (hand shake, a reflection forming a fake triangle) can never
// yank the sampling grid away from a pattern that was tracked correctly a moment ago.

use crate::config::DecoderConfig;
use crate::core_modules::blob::Blob;
use crate::core_modules::capture::PixelView;
use crate::core_modules::geometry::ANCHOR_RADIUS;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Pattern-space to pixel-space mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub center_x: f64,
    pub center_y: f64,
    /// Pixels per normalized unit. Always positive.
    pub scale: f64,
    /// Radians in (-pi, pi].
    pub rotation: f64,
}

impl Transform {
    pub fn new(center_x: f64, center_y: f64, scale: f64, rotation: f64) -> Self {
        Self {
            center_x,
            center_y,
            scale,
            rotation: normalize_angle(rotation),
        }
    }

    /// Maps a normalized pattern point to pixel coordinates.
    pub fn project(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center_x + self.scale * (x * cos - y * sin),
            self.center_y + self.scale * (x * sin + y * cos),
        )
    }
}

/// Wraps an angle into (-pi, pi].
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Derives a transform from the blobs of one capture, or `None` when no candidate
/// triple qualifies. `blobs` must be sorted descending by size. When `view` is given
/// and the dark-center check is enabled, triples centered on bright pixels are skipped.
pub fn derive_transform(
    blobs: &[Blob],
    view: Option<&PixelView<'_>>,
    config: &DecoderConfig,
) -> Option<Transform> {
    let candidates = &blobs[..blobs.len().min(config.candidate_blobs)];
    let n = candidates.len();

    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let triple = [&candidates[i], &candidates[j], &candidates[k]];
                if !is_anchor_triangle(triple, config) {
                    continue;
                }
                let transform = triangle_transform(triple);
                if let (Some(view), Some(threshold)) = (view, config.dark_center_threshold) {
                    let brightness = view
                        .average_disc(
                            transform.center_x,
                            transform.center_y,
                            config.anchor_probe_radius as f64,
                        )
                        .map_or(0.0, |sample| sample.brightness());
                    if brightness > threshold as f32 {
                        tracing::trace!(
                            "triple centered at ({:.1}, {:.1}) rejected: bright center {:.0}",
                            transform.center_x,
                            transform.center_y,
                            brightness
                        );
                        continue;
                    }
                }
                return Some(transform);
            }
        }
    }
    None
}

fn is_anchor_triangle(triple: [&Blob; 3], config: &DecoderConfig) -> bool {
    let sides = [
        triple[0].distance_to(triple[1]),
        triple[1].distance_to(triple[2]),
        triple[2].distance_to(triple[0]),
    ];
    let mean_side = sides.iter().sum::<f64>() / 3.0;
    if mean_side <= 0.0 {
        return false;
    }
    if sides
        .iter()
        .any(|side| (side - mean_side).abs() / mean_side > config.triple_side_tolerance)
    {
        return false;
    }

    let sizes = triple.map(|blob| blob.size_in_cells);
    let largest = sizes.iter().copied().max().unwrap_or(0) as f64;
    let smallest = sizes.iter().copied().min().unwrap_or(0) as f64;
    smallest > 0.0 && largest <= smallest * config.max_blob_size_ratio
}

fn triangle_transform(triple: [&Blob; 3]) -> Transform {
    let center_x = triple.iter().map(|blob| blob.centroid.0).sum::<f64>() / 3.0;
    let center_y = triple.iter().map(|blob| blob.centroid.1).sum::<f64>() / 3.0;
    let mean_radius = triple
        .iter()
        .map(|blob| (blob.centroid.0 - center_x).hypot(blob.centroid.1 - center_y))
        .sum::<f64>()
        / 3.0;

    // The bottom anchor is the vertex lowest on screen (largest y).
    let mut bottom = triple[0];
    for &blob in &triple[1..] {
        if blob.centroid.1 > bottom.centroid.1 {
            bottom = blob;
        }
    }
    let observed = (bottom.centroid.1 - center_y).atan2(bottom.centroid.0 - center_x);

    Transform::new(
        center_x,
        center_y,
        mean_radius / ANCHOR_RADIUS,
        observed - FRAC_PI_2,
    )
}

/// Where the transform used for a capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSource {
    /// The fresh estimate was adopted as the new cache.
    Fresh,
    /// The fresh estimate drifted too far from the cache and was discarded.
    CachedAfterDrift,
    /// No anchor triple this capture; the cache stood in.
    CachedNoDetection,
    /// Nothing detected and nothing cached.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizedTransform {
    pub transform: Option<Transform>,
    pub source: TransformSource,
}

/// Holds the single cached transform of a scan session.
#[derive(Debug, Clone)]
pub struct TransformStabilizer {
    cached: Option<Transform>,
    max_center_drift: f64,
    max_scale_drift: f64,
    max_rotation_drift: f64,
}

impl TransformStabilizer {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            cached: None,
            max_center_drift: config.max_center_drift,
            max_scale_drift: config.max_scale_drift,
            max_rotation_drift: config.max_rotation_drift_deg.to_radians(),
        }
    }

    pub fn cached(&self) -> Option<&Transform> {
        self.cached.as_ref()
    }

    /// Offers this capture's estimate (if any) and returns the transform to sample with.
    pub fn offer(&mut self, fresh: Option<Transform>) -> StabilizedTransform {
        match (fresh, self.cached) {
            (Some(fresh), None) => {
                tracing::debug!(
                    "transform acquired: center ({:.1}, {:.1}), scale {:.1}, rotation {:.1} deg",
                    fresh.center_x,
                    fresh.center_y,
                    fresh.scale,
                    fresh.rotation.to_degrees()
                );
                self.cached = Some(fresh);
                StabilizedTransform {
                    transform: Some(fresh),
                    source: TransformSource::Fresh,
                }
            }
            (Some(fresh), Some(cached)) => {
                if self.within_drift(&cached, &fresh) {
                    self.cached = Some(fresh);
                    StabilizedTransform {
                        transform: Some(fresh),
                        source: TransformSource::Fresh,
                    }
                } else {
                    tracing::debug!(
                        "transform drift rejected: center ({:.1}, {:.1}) -> ({:.1}, {:.1}), scale {:.1} -> {:.1}",
                        cached.center_x,
                        cached.center_y,
                        fresh.center_x,
                        fresh.center_y,
                        cached.scale,
                        fresh.scale
                    );
                    StabilizedTransform {
                        transform: Some(cached),
                        source: TransformSource::CachedAfterDrift,
                    }
                }
            }
            (None, Some(cached)) => StabilizedTransform {
                transform: Some(cached),
                source: TransformSource::CachedNoDetection,
            },
            (None, None) => StabilizedTransform {
                transform: None,
                source: TransformSource::Missing,
            },
        }
    }

    fn within_drift(&self, cached: &Transform, fresh: &Transform) -> bool {
        let center_drift =
            (fresh.center_x - cached.center_x).hypot(fresh.center_y - cached.center_y);
        let scale_drift = (fresh.scale - cached.scale).abs();
        let rotation_drift = normalize_angle(fresh.rotation - cached.rotation).abs();

        center_drift < self.max_center_drift * cached.scale
            && scale_drift < self.max_scale_drift * cached.scale
            && rotation_drift < self.max_rotation_drift
    }

    pub fn reset(&mut self) {
        self.cached = None;
    }
}
