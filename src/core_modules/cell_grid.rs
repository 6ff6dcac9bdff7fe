// THEORY:
// The `CellGrid` is the spatial pooling step of anchor detection. Instead of reasoning
// about hundreds of thousands of pixels, the capture is quantized into fixed-size square
// cells and each cell is reduced to one bit: "bright" or not.
//
// A cell is bright when a sparse probe (every 2nd pixel on every 2nd row) finds more
// than half of its probed pixels with every color channel above the brightness
// threshold. Requiring *all* channels of a pixel rejects the saturated data dots, each
// of which has at least one weak channel, so only the near-white anchors (and glare)
// survive. The majority vote over probes lets a small anchor that straddles cell
// borders still light the cells it mostly covers, while a cell that merely touches an
// anchor edge stays dark.
//
// Partial cells past the last full column or row are ignored.

use crate::core_modules::capture::PixelView;

/// Probe stride inside a cell, in pixels.
const PROBE_STRIDE: usize = 2;

/// Bright/dark classification of every cell of one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    /// Width of the grid in cells (image width / cell size).
    grid_width: u32,
    /// Height of the grid in cells (image height / cell size).
    grid_height: u32,
    /// Edge length of one cell in pixels.
    cell_size: u32,
    bright: Vec<bool>,
}

impl CellGrid {
    pub fn from_view(view: &PixelView<'_>, cell_size: u32, threshold: u8) -> Self {
        let cell_size = cell_size.max(1);
        let grid_width = view.width() / cell_size;
        let grid_height = view.height() / cell_size;

        let mut bright = Vec::with_capacity((grid_width * grid_height) as usize);
        for cell_y in 0..grid_height {
            for cell_x in 0..grid_width {
                bright.push(Self::cell_is_bright(
                    view,
                    cell_x * cell_size,
                    cell_y * cell_size,
                    cell_size,
                    threshold,
                ));
            }
        }

        Self {
            grid_width,
            grid_height,
            cell_size,
            bright,
        }
    }

    fn cell_is_bright(
        view: &PixelView<'_>,
        start_x: u32,
        start_y: u32,
        cell_size: u32,
        threshold: u8,
    ) -> bool {
        let mut probed = 0usize;
        let mut passed = 0usize;
        for dy in (0..cell_size).step_by(PROBE_STRIDE) {
            for dx in (0..cell_size).step_by(PROBE_STRIDE) {
                probed += 1;
                if view.pixel(start_x + dx, start_y + dy).all_channels_above(threshold) {
                    passed += 1;
                }
            }
        }
        2 * passed > probed
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    pub fn grid_height(&self) -> u32 {
        self.grid_height
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    #[inline]
    pub fn is_bright(&self, cell_x: u32, cell_y: u32) -> bool {
        self.bright[(cell_y * self.grid_width + cell_x) as usize]
    }

    pub fn bright_cells(&self) -> usize {
        self.bright.iter().filter(|&&b| b).count()
    }

    /// Pixel coordinates of a cell's center.
    pub fn cell_center(&self, cell_x: u32, cell_y: u32) -> (f64, f64) {
        let half = self.cell_size as f64 / 2.0;
        (
            (cell_x * self.cell_size) as f64 + half,
            (cell_y * self.cell_size) as f64 + half,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(width: u32, height: u32, fill: [u8; 4]) -> Vec<u8> {
        fill.iter().copied().cycle().take((width * height * 4) as usize).collect()
    }

    fn paint(data: &mut [u8], width: u32, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 4]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let i = ((y * width + x) * 4) as usize;
                data[i..i + 4].copy_from_slice(&color);
            }
        }
    }

    #[test]
    fn quantizes_and_ignores_partial_cells() {
        let data = canvas(20, 17, [0, 0, 0, 255]);
        let view = PixelView::new(&data, 20, 17).unwrap();
        let grid = CellGrid::from_view(&view, 8, 190);
        assert_eq!((grid.grid_width(), grid.grid_height()), (2, 2));
        assert_eq!(grid.bright_cells(), 0);
    }

    #[test]
    fn white_cells_are_bright_colored_cells_are_not() {
        let mut data = canvas(32, 16, [10, 10, 26, 255]);
        paint(&mut data, 32, 0, 0, 8, 8, [255, 255, 255, 255]);
        paint(&mut data, 32, 8, 0, 8, 8, [255, 215, 0, 255]);
        paint(&mut data, 32, 16, 0, 8, 8, [255, 68, 255, 255]);
        let view = PixelView::new(&data, 32, 16).unwrap();
        let grid = CellGrid::from_view(&view, 8, 190);
        assert!(grid.is_bright(0, 0));
        assert!(!grid.is_bright(1, 0));
        assert!(!grid.is_bright(2, 0));
        assert_eq!(grid.bright_cells(), 1);
    }

    #[test]
    fn partially_covered_cell_is_dark() {
        let mut data = canvas(16, 16, [0, 0, 0, 255]);
        // Exactly half of the probes land on white.
        paint(&mut data, 16, 0, 0, 8, 4, [255, 255, 255, 255]);
        let view = PixelView::new(&data, 16, 16).unwrap();
        let grid = CellGrid::from_view(&view, 8, 190);
        assert!(!grid.is_bright(0, 0));
        assert_eq!(grid.cell_center(1, 1), (12.0, 12.0));
    }

    #[test]
    fn mostly_covered_cell_is_bright() {
        let mut data = canvas(16, 16, [0, 0, 0, 255]);
        // A disc edge: the top three probe rows are white, the last one is not.
        paint(&mut data, 16, 0, 0, 8, 6, [255, 255, 255, 255]);
        paint(&mut data, 16, 8, 8, 8, 8, [255, 255, 255, 255]);
        paint(&mut data, 16, 8, 8, 2, 2, [0, 0, 0, 255]);
        let view = PixelView::new(&data, 16, 16).unwrap();
        let grid = CellGrid::from_view(&view, 8, 190);
        assert!(grid.is_bright(0, 0));
        assert!(grid.is_bright(1, 1));
        assert!(!grid.is_bright(1, 0));
        assert_eq!(grid.bright_cells(), 2);
    }
}
