//! Synthetic captures of a dotbeam pattern, drawn the way the sender draws it:
//! anchors and dots as flat discs on a dark navy background.
#![allow(dead_code)]

use dotbeam::core_modules::geometry::{Layout, canvas_scale};
use dotbeam::core_modules::palette::{ANCHOR_COLOR, PALETTE};
use dotbeam::core_modules::transform::Transform;
use dotbeam::{Capture, Config, Encoder};
use image::{Rgba, RgbaImage};

pub const BACKGROUND: Rgba<u8> = Rgba([0x0a, 0x0a, 0x1a, 0xff]);
pub const DOT_RADIUS: f64 = 0.06;
pub const ANCHOR_DOT_RADIUS: f64 = 0.065;

/// Where the pattern sits in the capture.
#[derive(Debug, Clone, Copy)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub transform: Transform,
}

impl Scene {
    /// The pattern filling the canvas, as the sender renders it.
    pub fn centered(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            width,
            height,
            transform: Transform::new(w / 2.0, h / 2.0, canvas_scale(w, h), 0.0),
        }
    }

    /// Shifts, shrinks and turns the pattern, as a hand-held camera would see it.
    pub fn moved(mut self, dx: f64, dy: f64, zoom: f64, rotation: f64) -> Self {
        let t = self.transform;
        self.transform = Transform::new(
            t.center_x + dx,
            t.center_y + dy,
            t.scale * zoom,
            t.rotation + rotation,
        );
        self
    }
}

fn disc(image: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let min_x = (cx - radius).floor().max(0.0) as u32;
    let min_y = (cy - radius).floor().max(0.0) as u32;
    let max_x = ((cx + radius).ceil() as u32).min(image.width().saturating_sub(1));
    let max_y = ((cy + radius).ceil() as u32).min(image.height().saturating_sub(1));
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= radius * radius {
                image.put_pixel(x, y, color);
            }
        }
    }
}

/// Draws one frame's dot values into a fresh capture.
pub fn render(layout: &Layout, values: &[u8], scene: &Scene) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(scene.width, scene.height, BACKGROUND);
    let t = &scene.transform;

    for anchor in layout.anchors() {
        let (x, y) = t.project(anchor.x, anchor.y);
        let c = ANCHOR_COLOR;
        disc(&mut image, x, y, ANCHOR_DOT_RADIUS * t.scale, Rgba([c.r, c.g, c.b, 0xff]));
    }
    for (position, &value) in layout.positions().zip(values) {
        let (x, y) = t.project(position.x, position.y);
        let c = PALETTE[value as usize % PALETTE.len()];
        disc(&mut image, x, y, DOT_RADIUS * t.scale, Rgba([c.r, c.g, c.b, 0xff]));
    }
    image
}

/// Renders every frame of `data` with the default protocol.
pub fn render_transfer(data: &[u8], scene: &Scene) -> Vec<RgbaImage> {
    let config = Config::default();
    let encoder = Encoder::new(config);
    encoder
        .encode(data)
        .iter()
        .map(|frame| render(encoder.layout(), &frame.dot_values(), scene))
        .collect()
}

pub fn capture(image: &RgbaImage) -> Capture {
    Capture::from(image.clone())
}

/// Deterministic sample payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 37 + 11) as u8).collect()
}
