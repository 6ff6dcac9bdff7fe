//! Borrowed view over one RGBA capture buffer.

use crate::core_modules::pixel::pixel::{CHANNELS, ColorSample, Pixel};
use crate::error::BufferError;
use image::RgbaImage;

/// A read-only, row-major RGBA8 image.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> PixelView<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, BufferError> {
        if width == 0 || height == 0 {
            return Err(BufferError::EmptyImage { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(BufferError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn from_rgba_image(image: &'a RgbaImage) -> Self {
        Self {
            data: image.as_raw(),
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel at (x, y). Callers keep coordinates in bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Pixel::new(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3])
    }

    /// Mean color over the pixels whose centers lie within `radius` of (cx, cy),
    /// clipped to the image. `None` when the disc misses the image entirely.
    pub fn average_disc(&self, cx: f64, cy: f64, radius: f64) -> Option<ColorSample> {
        let radius = radius.max(0.5);
        let r2 = radius * radius;
        let min_x = (cx - radius).floor().max(0.0) as i64;
        let max_x = ((cx + radius).ceil() as i64).min(self.width as i64 - 1);
        let min_y = (cy - radius).floor().max(0.0) as i64;
        let max_y = ((cy + radius).ceil() as i64).min(self.height as i64 - 1);

        let (mut sum_r, mut sum_g, mut sum_b) = (0u64, 0u64, 0u64);
        let mut count = 0u64;
        for y in min_y..=max_y {
            let dy = y as f64 + 0.5 - cy;
            for x in min_x..=max_x {
                let dx = x as f64 + 0.5 - cx;
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let p = self.pixel(x as u32, y as u32);
                sum_r += p.red as u64;
                sum_g += p.green as u64;
                sum_b += p.blue as u64;
                count += 1;
            }
        }

        if count == 0 {
            return None;
        }
        let n = count as f32;
        Some(ColorSample::new(
            sum_r as f32 / n,
            sum_g as f32 / n,
            sum_b as f32 / n,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffers() {
        assert_eq!(
            PixelView::new(&[0; 15], 2, 2).unwrap_err(),
            BufferError::SizeMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 15
            }
        );
        assert!(matches!(
            PixelView::new(&[], 0, 4),
            Err(BufferError::EmptyImage { .. })
        ));
    }

    #[test]
    fn disc_average_is_clipped_to_image() {
        let mut data = vec![0u8; 4 * 4 * 4];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&[100, 50, 25, 255]);
        }
        let view = PixelView::new(&data, 4, 4).unwrap();
        let s = view.average_disc(0.0, 0.0, 2.0).unwrap();
        assert_eq!(s, ColorSample::new(100.0, 50.0, 25.0));
        assert!(view.average_disc(-50.0, -50.0, 2.0).is_none());
    }

    #[test]
    fn reads_from_rgba_image() {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let view = PixelView::from_rgba_image(&image);
        assert_eq!((view.width(), view.height()), (3, 2));
        assert_eq!(view.pixel(2, 1), Pixel::new(1, 2, 3, 4));
    }
}
