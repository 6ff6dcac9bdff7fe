// THEORY:
// The blob detector finds anchor candidates: bright, white, compact regions.
//
// Algorithm steps:
// 1.  **Quantization**: the capture is reduced to a `CellGrid` of bright/dark cells.
// 2.  **Region Growing**: every unvisited bright cell seeds a flood fill over its
//     4-connected bright neighbors (no diagonals), so two anchors that nearly touch
//     diagonally stay apart.
// 3.  **Size Filtering**: components below the minimum cell count are noise or text;
//     components above the maximum are screen glare.
// 4.  **Centroid**: the mean of the bright pixels around the component, not of its
//     cell centers, so a small anchor is not snapped to the grid.
// 5.  **Whiteness Check**: a small pixel neighborhood at the centroid is averaged and
//     the component is dropped when its saturation is too high. A bright pastel data
//     dot must never pass for a white anchor.
// 6.  **Ordering**: survivors are sorted by size, largest first. The detector is
//     stateless: an empty result is a perfectly valid answer.

use crate::config::DecoderConfig;
use crate::core_modules::blob::{Blob, CellPoint};
use crate::core_modules::capture::PixelView;
use crate::core_modules::cell_grid::CellGrid;

pub mod blob_detector {
    use super::*;

    /// Finds anchor candidates in a capture, sorted descending by size.
    pub fn find_blobs(view: &PixelView<'_>, config: &DecoderConfig) -> Vec<Blob> {
        let grid = CellGrid::from_view(view, config.cell_size, config.brightness_threshold);
        find_blobs_in_grid(&grid, view, config)
    }

    /// Same as [`find_blobs`] over an already quantized grid.
    pub fn find_blobs_in_grid(
        grid: &CellGrid,
        view: &PixelView<'_>,
        config: &DecoderConfig,
    ) -> Vec<Blob> {
        let grid_width = grid.grid_width() as usize;
        let grid_height = grid.grid_height() as usize;
        let mut visited = vec![false; grid_width * grid_height];
        let mut blobs: Vec<Blob> = Vec::new();
        let mut blob_id_counter = 0;

        for y in 0..grid.grid_height() {
            for x in 0..grid.grid_width() {
                let index = y as usize * grid_width + x as usize;
                if visited[index] || !grid.is_bright(x, y) {
                    continue;
                }

                let cells = grow_region(grid, CellPoint { x, y }, &mut visited);
                if cells.len() < config.min_blob_cells || cells.len() > config.max_blob_cells {
                    continue;
                }

                let blob = summarize(grid, view, &cells, blob_id_counter, config);
                if blob.saturation > config.max_anchor_saturation {
                    tracing::trace!(
                        "blob at ({:.1}, {:.1}) rejected: saturation {:.2}",
                        blob.centroid.0,
                        blob.centroid.1,
                        blob.saturation
                    );
                    continue;
                }
                blobs.push(blob);
                blob_id_counter += 1;
            }
        }

        // Stable sort keeps scan order among equal sizes.
        blobs.sort_by(|a, b| b.size_in_cells.cmp(&a.size_in_cells));
        blobs
    }

    /// Depth-first flood fill over 4-connected bright cells.
    fn grow_region(grid: &CellGrid, seed: CellPoint, visited: &mut [bool]) -> Vec<CellPoint> {
        let grid_width = grid.grid_width() as i64;
        let grid_height = grid.grid_height() as i64;
        let mut region: Vec<CellPoint> = Vec::new();
        let mut stack: Vec<CellPoint> = vec![seed];
        visited[(seed.y as i64 * grid_width + seed.x as i64) as usize] = true;

        while let Some(current) = stack.pop() {
            region.push(current);

            for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || nx >= grid_width || ny < 0 || ny >= grid_height {
                    continue;
                }
                let index = (ny * grid_width + nx) as usize;
                if !visited[index] && grid.is_bright(nx as u32, ny as u32) {
                    visited[index] = true;
                    stack.push(CellPoint {
                        x: nx as u32,
                        y: ny as u32,
                    });
                }
            }
        }

        region
    }

    fn summarize(
        grid: &CellGrid,
        view: &PixelView<'_>,
        cells: &[CellPoint],
        id: u64,
        config: &DecoderConfig,
    ) -> Blob {
        let mut min = CellPoint {
            x: u32::MAX,
            y: u32::MAX,
        };
        let mut max = CellPoint { x: 0, y: 0 };
        let (mut sum_x, mut sum_y) = (0.0, 0.0);

        for cell in cells {
            min.x = min.x.min(cell.x);
            min.y = min.y.min(cell.y);
            max.x = max.x.max(cell.x);
            max.y = max.y.max(cell.y);
            let (cx, cy) = grid.cell_center(cell.x, cell.y);
            sum_x += cx;
            sum_y += cy;
        }

        let n = cells.len() as f64;
        let centroid = bright_pixel_centroid(grid, view, min, max, config.brightness_threshold)
            .unwrap_or((sum_x / n, sum_y / n));
        let saturation = view
            .average_disc(centroid.0, centroid.1, config.anchor_probe_radius as f64)
            .map_or(1.0, |sample| sample.saturation_hsv());

        Blob {
            id,
            centroid,
            size_in_cells: cells.len(),
            bounding_box: (min, max),
            saturation,
        }
    }

    /// Mean center of the bright pixels around a component, one cell of margin on each
    /// side. Cell centers alone snap small anchors to the grid.
    fn bright_pixel_centroid(
        grid: &CellGrid,
        view: &PixelView<'_>,
        min: CellPoint,
        max: CellPoint,
        threshold: u8,
    ) -> Option<(f64, f64)> {
        let cell_size = grid.cell_size();
        let x_start = min.x.saturating_sub(1) * cell_size;
        let y_start = min.y.saturating_sub(1) * cell_size;
        let x_end = (max.x + 2).min(grid.grid_width()) * cell_size;
        let y_end = (max.y + 2).min(grid.grid_height()) * cell_size;

        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        let mut count = 0usize;
        for y in y_start..y_end {
            for x in x_start..x_end {
                if view.pixel(x, y).all_channels_above(threshold) {
                    sum_x += x as f64 + 0.5;
                    sum_y += y as f64 + 0.5;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| (sum_x / count as f64, sum_y / count as f64))
    }
}
