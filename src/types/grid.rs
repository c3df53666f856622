//! Gridded fields and time-indexed stacks of them.

use crate::bias::error::BiasError;
use crate::bias::stats::FieldStats;
use crate::types::geo::GridSpec;
use crate::types::time_series::TimeSeries;
use crate::types::window::TimeWindow;
use crate::utils::defined;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A 2-D array of optional scalar values over a [`GridSpec`], stored row-major.
///
/// A missing cell (`None`) can stand for an ocean mask, a gap in the source data or the
/// result of arithmetic with a missing operand. Every cell-wise combination of two fields
/// first checks that both live on the same grid.
///
/// # Examples
///
/// ```
/// use forecast_bias::{BoundingBox, GridSpec, GriddedField};
///
/// let grid = GridSpec::new(BoundingBox::new(4.0, 51.0, 6.0, 53.0), 1, 2);
/// let forecast = GriddedField::new(grid, vec![Some(15.0), None]).unwrap();
/// let bias = GriddedField::filled(grid, 1.0);
///
/// let corrected = forecast.zip_with(&bias, |f, b| Some(f - b)).unwrap();
/// assert_eq!(corrected.cells(), &[Some(14.0), None]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GriddedFieldRepr", into = "GriddedFieldRepr")]
pub struct GriddedField {
    grid: GridSpec,
    cells: Vec<Option<f64>>,
}

#[derive(Serialize, Deserialize)]
struct GriddedFieldRepr {
    grid: GridSpec,
    values: Vec<Option<f64>>,
}

impl TryFrom<GriddedFieldRepr> for GriddedField {
    type Error = BiasError;

    fn try_from(repr: GriddedFieldRepr) -> Result<Self, Self::Error> {
        GriddedField::new(repr.grid, repr.values)
    }
}

impl From<GriddedField> for GriddedFieldRepr {
    fn from(field: GriddedField) -> Self {
        GriddedFieldRepr {
            grid: field.grid,
            values: field.cells,
        }
    }
}

impl GriddedField {
    /// Wraps row-major cell values. Non-finite values are stored as missing.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::GridTooLarge`] if `rows × cols` overflows and
    /// [`BiasError::CellCount`] if `cells` does not hold exactly `rows × cols` values.
    pub fn new(grid: GridSpec, cells: Vec<Option<f64>>) -> Result<Self, BiasError> {
        let expected = checked_len(&grid)?;
        if cells.len() != expected {
            return Err(BiasError::CellCount {
                grid,
                expected,
                found: cells.len(),
            });
        }
        let cells = cells.into_iter().map(|c| c.and_then(defined)).collect();
        Ok(Self { grid, cells })
    }

    /// Builds a field from raw row-major samples, treating NaN as missing.
    pub fn from_raw(grid: GridSpec, values: &[f64]) -> Result<Self, BiasError> {
        Self::new(grid, values.iter().map(|v| defined(*v)).collect())
    }

    pub fn missing(grid: GridSpec) -> Self {
        Self {
            grid,
            cells: vec![None; grid.len()],
        }
    }

    pub fn filled(grid: GridSpec, value: f64) -> Self {
        Self {
            grid,
            cells: vec![defined(value); grid.len()],
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    /// The value of a cell; `None` when it is missing or outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.grid
            .cell_index(row, col)
            .and_then(|index| self.cells[index])
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<f64>) -> Result<(), BiasError> {
        let index = self
            .grid
            .cell_index(row, col)
            .ok_or(BiasError::CellOutOfBounds {
                row,
                col,
                grid: self.grid,
            })?;
        self.cells[index] = value.and_then(defined);
        Ok(())
    }

    pub fn defined_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_all_missing(&self) -> bool {
        self.defined_count() == 0
    }

    /// Applies `f` to every defined cell; missing cells stay missing.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> GriddedField {
        GriddedField {
            grid: self.grid,
            cells: self
                .cells
                .iter()
                .map(|c| c.map(&f).and_then(defined))
                .collect(),
        }
    }

    /// Combines two fields cell by cell.
    ///
    /// `f` is only called where both cells are defined; a cell that is missing in either
    /// input is missing in the output, as is any cell for which `f` returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::GridMismatch`] if the fields do not share a grid.
    pub fn zip_with(
        &self,
        other: &GriddedField,
        f: impl Fn(f64, f64) -> Option<f64>,
    ) -> Result<GriddedField, BiasError> {
        self.check_grid(other.grid())?;
        Ok(GriddedField {
            grid: self.grid,
            cells: self
                .cells
                .iter()
                .zip(&other.cells)
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => f(*a, *b).and_then(defined),
                    _ => None,
                })
                .collect(),
        })
    }

    pub(crate) fn check_grid(&self, other: &GridSpec) -> Result<(), BiasError> {
        ensure_same_grid(&self.grid, other)
    }

    /// Mean, standard deviation and mean absolute value of the defined cells.
    pub fn stats(&self) -> Option<FieldStats> {
        FieldStats::from_values(self.cells.iter().copied())
    }
}

pub(crate) fn ensure_same_grid(expected: &GridSpec, found: &GridSpec) -> Result<(), BiasError> {
    if expected != found {
        warn!("Refusing to combine fields on {} and {}", expected, found);
        return Err(BiasError::GridMismatch {
            expected: *expected,
            found: *found,
        });
    }
    Ok(())
}

/// A chronologically ordered stack of [`GriddedField`]s that all share one grid.
///
/// This is the per-cell sample set over which temporal means are taken: the values of one
/// cell across the stack form that cell's [`TimeSeries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldSeriesRepr", into = "FieldSeriesRepr")]
pub struct FieldSeries {
    grid: GridSpec,
    fields: BTreeMap<DateTime<Utc>, GriddedField>,
}

#[derive(Serialize, Deserialize)]
struct FieldSeriesRepr {
    grid: GridSpec,
    steps: Vec<FieldStep>,
}

#[derive(Serialize, Deserialize)]
struct FieldStep {
    time: DateTime<Utc>,
    values: Vec<Option<f64>>,
}

impl TryFrom<FieldSeriesRepr> for FieldSeries {
    type Error = BiasError;

    fn try_from(repr: FieldSeriesRepr) -> Result<Self, Self::Error> {
        checked_len(&repr.grid)?;
        let mut series = FieldSeries::new(repr.grid);
        for step in repr.steps {
            series.insert(step.time, GriddedField::new(repr.grid, step.values)?)?;
        }
        Ok(series)
    }
}

impl From<FieldSeries> for FieldSeriesRepr {
    fn from(series: FieldSeries) -> Self {
        FieldSeriesRepr {
            grid: series.grid,
            steps: series
                .fields
                .into_iter()
                .map(|(time, field)| FieldStep {
                    time,
                    values: field.cells,
                })
                .collect(),
        }
    }
}

impl FieldSeries {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            fields: BTreeMap::new(),
        }
    }

    /// Builds a stack from timestamped fields, taking the grid from the first one.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::EmptyFieldSeries`] if `fields` is empty and
    /// [`BiasError::GridMismatch`] if the fields do not all share one grid.
    pub fn from_fields(
        fields: impl IntoIterator<Item = (DateTime<Utc>, GriddedField)>,
    ) -> Result<Self, BiasError> {
        let mut fields = fields.into_iter().peekable();
        let grid = *fields.peek().ok_or(BiasError::EmptyFieldSeries)?.1.grid();
        let mut series = FieldSeries::new(grid);
        for (timestamp, field) in fields {
            series.insert(timestamp, field)?;
        }
        Ok(series)
    }

    /// Inserts or replaces the field at `timestamp`.
    pub fn insert(
        &mut self,
        timestamp: DateTime<Utc>,
        field: GriddedField,
    ) -> Result<(), BiasError> {
        field.check_grid(&self.grid)?;
        self.fields.insert(timestamp, field);
        Ok(())
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<&GriddedField> {
        self.fields.get(timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &GriddedField)> + '_ {
        self.fields.iter()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.fields.keys().copied()
    }

    /// The values of one cell across the stack. Out-of-grid cells yield an all-missing series.
    pub fn cell_series(&self, row: usize, col: usize) -> TimeSeries {
        TimeSeries::from_points(
            self.fields
                .iter()
                .map(|(timestamp, field)| (*timestamp, field.get(row, col))),
        )
    }

    /// The fields whose timestamps fall inside `window`.
    pub fn within(&self, window: &TimeWindow) -> FieldSeries {
        FieldSeries {
            grid: self.grid,
            fields: self
                .fields
                .iter()
                .filter(|(t, _)| window.contains(t))
                .map(|(t, f)| (*t, f.clone()))
                .collect(),
        }
    }
}

fn checked_len(grid: &GridSpec) -> Result<usize, BiasError> {
    grid.checked_len().ok_or(BiasError::GridTooLarge {
        rows: grid.rows,
        cols: grid.cols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::geo::BoundingBox;
    use chrono::{Duration, TimeZone};

    fn grid(rows: usize, cols: usize) -> GridSpec {
        GridSpec::new(BoundingBox::new(4.0, 51.0, 6.0, 53.0), rows, cols)
    }

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn test_new_checks_cell_count() {
        let result = GriddedField::new(grid(2, 2), vec![Some(1.0); 3]);
        assert!(matches!(
            result,
            Err(BiasError::CellCount {
                expected: 4,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_new_rejects_overflowing_grid() {
        let huge = grid(1 << 33, 1 << 33);
        assert!(matches!(
            GriddedField::new(huge, Vec::new()),
            Err(BiasError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_from_raw_masks_nan() {
        let field = GriddedField::from_raw(grid(1, 3), &[1.0, f64::NAN, 3.0]).unwrap();
        assert_eq!(field.cells(), &[Some(1.0), None, Some(3.0)]);
        assert_eq!(field.defined_count(), 2);
    }

    #[test]
    fn test_get_and_set() {
        let mut field = GriddedField::missing(grid(2, 3));
        assert!(field.is_all_missing());
        field.set(1, 2, Some(7.0)).unwrap();
        assert_eq!(field.get(1, 2), Some(7.0));
        assert_eq!(field.get(0, 0), None);
        assert_eq!(field.get(2, 0), None);
        assert!(matches!(
            field.set(2, 0, Some(1.0)),
            Err(BiasError::CellOutOfBounds { row: 2, col: 0, .. })
        ));
    }

    #[test]
    fn test_zip_with_propagates_missing() {
        let a = GriddedField::new(grid(1, 3), vec![Some(1.0), None, Some(3.0)]).unwrap();
        let b = GriddedField::new(grid(1, 3), vec![Some(1.0), Some(2.0), None]).unwrap();
        let sum = a.zip_with(&b, |x, y| Some(x + y)).unwrap();
        assert_eq!(sum.cells(), &[Some(2.0), None, None]);
    }

    #[test]
    fn test_zip_with_rejects_grid_mismatch() {
        let a = GriddedField::filled(grid(2, 2), 1.0);
        let b = GriddedField::filled(grid(1, 4), 1.0);
        assert!(matches!(
            a.zip_with(&b, |x, y| Some(x - y)),
            Err(BiasError::GridMismatch { .. })
        ));
    }

    #[test]
    fn test_field_series_reversed_window_is_empty() {
        let stack = FieldSeries::from_fields(
            (0..6).map(|h| (hour(h), GriddedField::filled(grid(1, 2), h as f64))),
        )
        .unwrap();
        let reversed = TimeWindow {
            start: hour(5),
            end: hour(0),
        };
        let selected = stack.within(&reversed);
        assert!(selected.is_empty());
        assert_eq!(selected.grid(), stack.grid());
    }

    #[test]
    fn test_field_series_json_with_overflowing_grid_is_rejected() {
        let json = serde_json::json!({
            "grid": {
                "bbox": grid(1, 1).bbox,
                "rows": 8589934592u64,
                "cols": 8589934592u64,
            },
            "steps": [],
        });
        assert!(serde_json::from_value::<FieldSeries>(json).is_err());
    }

    #[test]
    fn test_field_series_cell_series() {
        let stack = FieldSeries::from_fields((0..3).map(|h| {
            let values = [h as f64, 10.0 * h as f64];
            (hour(h), GriddedField::from_raw(grid(1, 2), &values).unwrap())
        }))
        .unwrap();
        assert_eq!(stack.len(), 3);

        let cell = stack.cell_series(0, 1);
        assert_eq!(cell.len(), 3);
        assert_eq!(cell.get(&hour(2)), Some(20.0));

        let outside = stack.cell_series(5, 5);
        assert_eq!(outside.len(), 3);
        assert!(!outside.has_defined_values());
    }

    #[test]
    fn test_field_series_rejects_foreign_grid() {
        let mut stack = FieldSeries::new(grid(1, 2));
        let result = stack.insert(hour(0), GriddedField::filled(grid(2, 1), 0.0));
        assert!(matches!(result, Err(BiasError::GridMismatch { .. })));
        assert!(matches!(
            FieldSeries::from_fields(Vec::<(DateTime<Utc>, GriddedField)>::new()),
            Err(BiasError::EmptyFieldSeries)
        ));
    }

    #[test]
    fn test_field_series_json_representation() {
        let stack = FieldSeries::from_fields([
            (hour(0), GriddedField::new(grid(1, 2), vec![Some(1.0), None]).unwrap()),
            (hour(1), GriddedField::filled(grid(1, 2), 2.0)),
        ])
        .unwrap();
        let json = serde_json::to_value(&stack).unwrap();
        assert_eq!(json["grid"]["rows"], 1);
        assert_eq!(json["steps"].as_array().unwrap().len(), 2);
        assert!(json["steps"][0]["values"][1].is_null());

        let back: FieldSeries = serde_json::from_value(json).unwrap();
        assert_eq!(back, stack);
    }

    #[test]
    fn test_field_json_with_wrong_cell_count_is_rejected() {
        let json = serde_json::json!({
            "grid": grid(2, 2),
            "values": [1.0, 2.0, 3.0],
        });
        assert!(serde_json::from_value::<GriddedField>(json).is_err());
    }
}
