//! Estimation of a systematic forecast bias over a baseline period.
//!
//! The bias is always computed mean-then-subtract: the temporal mean of the forecast and the
//! temporal mean of the reference are taken over the *aligned* timestamps, then subtracted.
//! Subtracting raw values first would mix aggregates of series sampled at different native
//! frequencies (all hours against midnight only).

use crate::align::{align, AlignedTimestampSet};
use crate::bias::error::BiasError;
use crate::bias::stats::FieldStats;
use crate::types::grid::{ensure_same_grid, FieldSeries, GriddedField};
use crate::types::time_series::TimeSeries;
use crate::types::window::TimeWindow;
use log::{debug, info};

/// Bias of one forecast series against one reference series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBias {
    /// The timestamps the means were taken over.
    pub aligned: AlignedTimestampSet,
    pub forecast_mean: Option<f64>,
    pub reference_mean: Option<f64>,
    /// `forecast_mean - reference_mean`, missing when either mean is.
    pub bias: Option<f64>,
}

/// Estimates the bias of `forecast` against `reference` at a single location.
///
/// Only timestamps at which both series are defined, and which fall inside `window` when
/// one is given, contribute to the means.
///
/// # Examples
///
/// ```
/// use forecast_bias::{estimate_series_bias, TimeSeries};
/// use chrono::{TimeZone, Utc};
///
/// let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// let t2 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
/// let t3 = Utc.with_ymd_and_hms(2023, 1, 3, 0, 0, 0).unwrap();
///
/// let forecast = TimeSeries::from_points([(t1, Some(10.0)), (t2, Some(12.0)), (t3, None)]);
/// let reference = TimeSeries::from_points([(t1, Some(9.0)), (t2, Some(11.0)), (t3, Some(8.0))]);
///
/// let estimate = estimate_series_bias(&forecast, &reference, None);
/// assert_eq!(estimate.aligned.len(), 2);
/// assert_eq!(estimate.forecast_mean, Some(11.0));
/// assert_eq!(estimate.reference_mean, Some(10.0));
/// assert_eq!(estimate.bias, Some(1.0));
/// ```
pub fn estimate_series_bias(
    forecast: &TimeSeries,
    reference: &TimeSeries,
    window: Option<&TimeWindow>,
) -> SeriesBias {
    let aligned = align(forecast, reference);
    let aligned = match window {
        Some(window) => aligned.within(window),
        None => aligned,
    };
    let forecast_mean = forecast.mean_over(&aligned);
    let reference_mean = reference.mean_over(&aligned);
    SeriesBias {
        bias: forecast_mean
            .zip(reference_mean)
            .map(|(forecast, reference)| forecast - reference),
        aligned,
        forecast_mean,
        reference_mean,
    }
}

/// The temporal-mean fields a [`BiasField`] was derived from.
///
/// Correction uses these directly: `target - forecast_mean + reference_mean`.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasOperands {
    pub forecast_mean: GriddedField,
    pub reference_mean: GriddedField,
}

/// Per-cell mean bias (forecast mean − reference mean) over a baseline period.
///
/// A cell is missing where either mean is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasField {
    pub field: GriddedField,
    operands: BiasOperands,
}

impl BiasField {
    /// Builds a bias field from temporal-mean fields that were already aggregated over the
    /// aligned baseline timestamps, for instance by the remote service.
    ///
    /// # Errors
    ///
    /// Returns [`BiasError::GridMismatch`] if the two means do not share a grid.
    pub fn from_means(
        forecast_mean: GriddedField,
        reference_mean: GriddedField,
    ) -> Result<Self, BiasError> {
        let field = forecast_mean.zip_with(&reference_mean, |f, r| Some(f - r))?;
        Ok(Self {
            field,
            operands: BiasOperands {
                forecast_mean,
                reference_mean,
            },
        })
    }

    /// The operands the bias was computed from.
    pub fn operands(&self) -> &BiasOperands {
        &self.operands
    }

    pub fn into_operands(self) -> BiasOperands {
        self.operands
    }

    pub fn stats(&self) -> Option<FieldStats> {
        self.field.stats()
    }
}

/// Estimates a [`BiasField`] from per-cell forecast and reference samples.
///
/// For each cell independently the cell's forecast and reference series are aligned, the
/// temporal mean of each is taken over the aligned timestamps (restricted to `window` when
/// given) and the reference mean is subtracted from the forecast mean.
///
/// Cells without any aligned sample are missing. Inputs whose samples are all missing
/// produce an all-missing field rather than an error.
///
/// # Errors
///
/// Returns [`BiasError::GridMismatch`] if the two stacks are on different grids.
pub fn estimate_bias(
    forecast: &FieldSeries,
    reference: &FieldSeries,
    window: Option<&TimeWindow>,
) -> Result<BiasField, BiasError> {
    let grid = *forecast.grid();
    ensure_same_grid(&grid, reference.grid())?;

    let mut forecast_mean = GriddedField::missing(grid);
    let mut reference_mean = GriddedField::missing(grid);
    let mut aligned_samples = 0usize;

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let cell = estimate_series_bias(
                &forecast.cell_series(row, col),
                &reference.cell_series(row, col),
                window,
            );
            aligned_samples += cell.aligned.len();
            forecast_mean.set(row, col, cell.forecast_mean)?;
            reference_mean.set(row, col, cell.reference_mean)?;
        }
    }

    debug!(
        "Estimated bias over {} aligned cell samples ({} forecast steps, {} reference steps)",
        aligned_samples,
        forecast.len(),
        reference.len()
    );

    let bias = BiasField::from_means(forecast_mean, reference_mean)?;
    info!(
        "Bias defined for {} of {} cells on grid {}",
        bias.field.defined_count(),
        grid.len(),
        grid
    );
    Ok(bias)
}
