// THEORY:
// A `Blob` is one spatially coherent bright region of a single capture: a candidate
// for being one of the three white anchors. Like the cell grid it comes from, it is a
// plain data container with no memory of previous captures; temporal reasoning about
// the anchors happens later, in the transform stabilizer.

/// A cell coordinate on the quantization grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPoint {
    pub x: u32,
    pub y: u32,
}

/// A detected bright region.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Identifier within the current capture only.
    pub id: u64,
    /// Centroid of the bright pixels under the member cells, in pixel coordinates.
    pub centroid: (f64, f64),
    /// Number of member cells.
    pub size_in_cells: usize,
    /// Top-left and bottom-right member cells.
    pub bounding_box: (CellPoint, CellPoint),
    /// Mean HSV saturation probed around the centroid.
    pub saturation: f32,
}

impl Blob {
    pub fn distance_to(&self, other: &Blob) -> f64 {
        let dx = self.centroid.0 - other.centroid.0;
        let dy = self.centroid.1 - other.centroid.1;
        dx.hypot(dy)
    }
}
