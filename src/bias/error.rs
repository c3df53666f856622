use crate::types::geo::GridSpec;
use chrono::{DateTime, Utc};
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BiasError {
    #[error("Grid mismatch: expected {expected}, found {found}")]
    GridMismatch { expected: GridSpec, found: GridSpec },

    #[error("Field has {found} cells but its grid {grid} requires {expected}")]
    CellCount {
        grid: GridSpec,
        expected: usize,
        found: usize,
    },

    #[error("Grid of {rows}x{cols} cells is too large to address")]
    GridTooLarge { rows: usize, cols: usize },

    #[error("Cell ({row}, {col}) is outside of grid {grid}")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        grid: GridSpec,
    },

    #[error("A field series needs at least one field to determine its grid")]
    EmptyFieldSeries,

    #[error("Layer '{0}' is not available for evaluation")]
    UnknownLayer(String),

    #[error("Expression '{0}' does not reference any layer")]
    ConstantExpression(String),

    #[error("Window start {start} lies after its end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Could not resolve the given value into a UTC datetime range")]
    DateParsingError,

    #[error("Failed processing DataFrame: {0}")]
    Frame(#[from] PolarsError),
}
