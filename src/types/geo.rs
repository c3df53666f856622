//! Spatial primitives: points, bounding boxes and the regular grids gridded fields live on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use forecast_bias::LatLon;
///
/// let de_bilt = LatLon(52.1015, 5.1779);
/// assert_eq!(de_bilt.0, 52.1015); // Latitude
/// assert_eq!(de_bilt.1, 5.1779); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

/// A rectangular region in degrees, west/south edges first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Edges are inclusive.
    pub fn contains(&self, point: LatLon) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.0)
            && (self.min_lon..=self.max_lon).contains(&point.1)
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}

/// A regular `rows × cols` grid laid over a [`BoundingBox`].
///
/// Row 0 is the northernmost row and column 0 the westernmost column, so cell values are
/// stored row-major in the same order a north-up raster is read.
///
/// Two gridded fields can only be combined when their `GridSpec`s are equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub bbox: BoundingBox,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn new(bbox: BoundingBox, rows: usize, cols: usize) -> Self {
        Self { bbox, rows, cols }
    }

    /// Number of cells in the grid, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Number of cells in the grid, or `None` when `rows × cols` overflows.
    pub fn checked_len(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major index of a cell, or `None` when the cell lies outside the grid.
    pub fn cell_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        row.checked_mul(self.cols)?.checked_add(col)
    }

    /// Geographic centre of a cell, or `None` when the cell lies outside the grid.
    pub fn cell_center(&self, row: usize, col: usize) -> Option<LatLon> {
        self.cell_index(row, col)?;
        let cell_height = self.bbox.height() / self.rows as f64;
        let cell_width = self.bbox.width() / self.cols as f64;
        Some(LatLon(
            self.bbox.max_lat - (row as f64 + 0.5) * cell_height,
            self.bbox.min_lon + (col as f64 + 0.5) * cell_width,
        ))
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} over [{}, {}]..[{}, {}]",
            self.rows,
            self.cols,
            self.bbox.min_lon,
            self.bbox.min_lat,
            self.bbox.max_lon,
            self.bbox.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn benelux() -> GridSpec {
        GridSpec::new(BoundingBox::new(2.0, 49.0, 8.0, 54.0), 5, 6)
    }

    #[test]
    fn test_cell_index_is_row_major() {
        let grid = benelux();
        assert_eq!(grid.len(), 30);
        assert_eq!(grid.cell_index(0, 0), Some(0));
        assert_eq!(grid.cell_index(1, 0), Some(6));
        assert_eq!(grid.cell_index(4, 5), Some(29));
        assert_eq!(grid.cell_index(5, 0), None);
        assert_eq!(grid.cell_index(0, 6), None);
    }

    #[test]
    fn test_cell_center_is_north_up() {
        let grid = benelux();
        let top_left = grid.cell_center(0, 0).unwrap();
        assert!((top_left.0 - 53.5).abs() < 1e-12);
        assert!((top_left.1 - 2.5).abs() < 1e-12);

        let bottom_right = grid.cell_center(4, 5).unwrap();
        assert!((bottom_right.0 - 49.5).abs() < 1e-12);
        assert!((bottom_right.1 - 7.5).abs() < 1e-12);
        assert!(grid.bbox.contains(bottom_right));
    }

    #[test]
    fn test_oversized_grid_has_no_cell_count() {
        let grid = GridSpec::new(benelux().bbox, 1 << 33, 1 << 33);
        assert_eq!(grid.checked_len(), None);
        assert_eq!(grid.len(), usize::MAX);
        assert_eq!(benelux().checked_len(), Some(30));
    }

    #[test]
    fn test_bounding_box_contains_edges() {
        let bbox = BoundingBox::new(2.0, 49.0, 8.0, 54.0);
        assert!(bbox.contains(LatLon(49.0, 2.0)));
        assert!(bbox.contains(LatLon(54.0, 8.0)));
        assert!(!bbox.contains(LatLon(54.1, 5.0)));
        assert!(!bbox.contains(LatLon(50.0, 1.9)));
    }
}
