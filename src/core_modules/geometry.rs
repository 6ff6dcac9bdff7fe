// THEORY:
// Geometry is the shared coordinate system of sender and receiver. Everything is in
// normalized pattern space: the pattern center is the origin, the unit circle is the
// drawable area, angle 0 points right, positive angles turn counter-clockwise, and Y
// is negated so that +Y points down the screen like pixel rows do.
//
// The layout is a pure function of the protocol `Config`: three white anchors on an
// equilateral triangle at radius 0.82, then `rings` concentric data rings where ring n
// holds 6n evenly spaced dots starting at angle 0. The order of `Layout::dots()` is the
// wire order of the frame codec (ring 1 first, increasing index within each ring).

use crate::config::Config;

pub const ANCHOR_RADIUS: f64 = 0.82;
/// Anchor angles in degrees: bottom, right, left (screen view).
pub const ANCHOR_ANGLES_DEG: [f64; 3] = [270.0, 30.0, 150.0];

pub const INNER_RING_RADIUS: f64 = 0.22;
pub const OUTER_RING_RADIUS: f64 = 0.70;

/// Fraction of the half-canvas used by the pattern (5% margin).
pub const CANVAS_FILL: f64 = 0.95;

/// A point in normalized pattern space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    /// Polar angle in degrees this point was generated from.
    pub angle_deg: f64,
}

/// One encoded symbol slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    /// Ring number, 1-indexed.
    pub ring: usize,
    /// Position within the ring, 0-indexed.
    pub index: usize,
    /// Encoded value, `0..2^bits_per_dot`.
    pub value: u8,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RingLayout {
    /// Ring number, 1-indexed.
    pub ring: usize,
    pub radius: f64,
    pub positions: Vec<Position>,
}

impl RingLayout {
    pub fn dot_count(&self) -> usize {
        self.positions.len()
    }
}

/// Precomputed anchor and dot positions for a protocol configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    config: Config,
    anchors: [Position; 3],
    rings: Vec<RingLayout>,
}

impl Layout {
    pub fn new(config: &Config) -> Self {
        let anchors = ANCHOR_ANGLES_DEG.map(|angle| angle_to_point(angle, ANCHOR_RADIUS));

        let rings = (1..=config.rings())
            .map(|ring| {
                let dot_count = ring * 6;
                let radius = ring_radius(ring, config.rings());
                let positions = (0..dot_count)
                    .map(|j| angle_to_point(j as f64 * 360.0 / dot_count as f64, radius))
                    .collect();
                RingLayout {
                    ring,
                    radius,
                    positions,
                }
            })
            .collect();

        Self {
            config: *config,
            anchors,
            rings,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn anchors(&self) -> &[Position; 3] {
        &self.anchors
    }

    pub fn rings(&self) -> &[RingLayout] {
        &self.rings
    }

    pub fn total_dots(&self) -> usize {
        self.rings.iter().map(RingLayout::dot_count).sum()
    }

    /// All dot positions in wire order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.rings.iter().flat_map(|ring| ring.positions.iter())
    }

    /// Pairs dot values (wire order) with their slots. Extra values are ignored.
    pub fn dots(&self, values: &[u8]) -> Vec<Dot> {
        self.rings
            .iter()
            .flat_map(|ring| {
                ring.positions
                    .iter()
                    .enumerate()
                    .map(move |(index, p)| (ring.ring, index, p))
            })
            .zip(values)
            .map(|((ring, index, p), &value)| Dot {
                ring,
                index,
                value,
                x: p.x,
                y: p.y,
            })
            .collect()
    }
}

/// Normalized radius of ring `ring` (1-indexed) out of `total_rings`.
/// Rings are spread evenly between the inner and outer radius; a single ring sits
/// at the midpoint.
pub fn ring_radius(ring: usize, total_rings: usize) -> f64 {
    if total_rings <= 1 {
        return (INNER_RING_RADIUS + OUTER_RING_RADIUS) / 2.0;
    }
    INNER_RING_RADIUS
        + (OUTER_RING_RADIUS - INNER_RING_RADIUS) * (ring - 1) as f64 / (total_rings - 1) as f64
}

/// Polar (degrees, radius) to screen-oriented Cartesian.
pub fn angle_to_point(angle_deg: f64, radius: f64) -> Position {
    let rad = angle_deg.to_radians();
    Position {
        x: radius * rad.cos(),
        y: -radius * rad.sin(),
        angle_deg,
    }
}

/// Pixel scale of the unit circle on a `width` x `height` canvas.
pub fn canvas_scale(width: f64, height: f64) -> f64 {
    (width / 2.0).min(height / 2.0) * CANVAS_FILL
}

/// Maps normalized coordinates to canvas pixels, centered with a 5% margin.
pub fn scale_to_canvas(nx: f64, ny: f64, width: f64, height: f64) -> (f64, f64) {
    let scale = canvas_scale(width, height);
    (width / 2.0 + nx * scale, height / 2.0 + ny * scale)
}
