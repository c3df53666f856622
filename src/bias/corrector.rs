//! Additive bias correction of a target-period forecast and evaluation of what is left.
//!
//! The correction assumes the baseline bias carries over unchanged (same sign and size) to
//! the target period and location. There is no model fitting or seasonal decomposition.

use crate::align::align;
use crate::bias::error::BiasError;
use crate::bias::estimator::{BiasField, BiasOperands};
use crate::bias::stats::FieldStats;
use crate::types::grid::GriddedField;
use crate::types::time_series::TimeSeries;

/// A target-period forecast shifted by the baseline bias.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedForecastField {
    pub field: GriddedField,
}

/// Corrects `target` cell by cell as `target - forecast_mean + reference_mean`.
///
/// # Errors
///
/// Returns [`BiasError::GridMismatch`] if the target and the baseline operands are on
/// different grids.
pub fn correct(
    target: &GriddedField,
    operands: &BiasOperands,
) -> Result<CorrectedForecastField, BiasError> {
    let field = target
        .zip_with(&operands.forecast_mean, |t, f| Some(t - f))?
        .zip_with(&operands.reference_mean, |shifted, r| Some(shifted + r))?;
    Ok(CorrectedForecastField { field })
}

/// Corrects `target` cell by cell as `target - bias`.
///
/// Equivalent to [`correct`] with the operands of `bias`, up to floating point rounding.
///
/// # Examples
///
/// ```
/// use forecast_bias::{correct_with_bias, BiasField, BoundingBox, GridSpec, GriddedField};
///
/// let grid = GridSpec::new(BoundingBox::new(4.0, 51.0, 6.0, 53.0), 1, 1);
/// let bias = BiasField::from_means(
///     GriddedField::filled(grid, 11.0),
///     GriddedField::filled(grid, 10.0),
/// ).unwrap();
///
/// let corrected = correct_with_bias(&GriddedField::filled(grid, 15.0), &bias).unwrap();
/// assert_eq!(corrected.field.get(0, 0), Some(14.0));
/// ```
pub fn correct_with_bias(
    target: &GriddedField,
    bias: &BiasField,
) -> Result<CorrectedForecastField, BiasError> {
    let field = target.zip_with(&bias.field, |t, b| Some(t - b))?;
    Ok(CorrectedForecastField { field })
}

/// What remains of the bias after correction: `corrected - target_reference`.
pub fn residual_bias(
    corrected: &CorrectedForecastField,
    target_reference: &GriddedField,
) -> Result<GriddedField, BiasError> {
    corrected
        .field
        .zip_with(target_reference, |c, r| Some(c - r))
}

/// Shifts every defined value of `target` by `-bias`. A missing bias yields a series whose
/// values are all missing.
pub fn correct_series(target: &TimeSeries, bias: Option<f64>) -> TimeSeries {
    match bias {
        Some(bias) => target.map(|value| value - bias),
        None => TimeSeries::from_points(target.timestamps().map(|t| (t, None))),
    }
}

/// `corrected - reference` at the timestamps where both are defined.
pub fn residual_series(corrected: &TimeSeries, reference: &TimeSeries) -> TimeSeries {
    let aligned = align(corrected, reference);
    TimeSeries::from_points(aligned.iter().map(|t| {
        let residual = corrected
            .get(t)
            .zip(reference.get(t))
            .map(|(c, r)| c - r);
        (*t, residual)
    }))
}

/// Compares the error of a forecast before and after correction against a reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionSummary {
    /// Statistics of `target - reference`.
    pub uncorrected: Option<FieldStats>,
    /// Statistics of `corrected - reference`.
    pub residual: Option<FieldStats>,
}

impl CorrectionSummary {
    pub fn for_fields(
        target: &GriddedField,
        corrected: &CorrectedForecastField,
        reference: &GriddedField,
    ) -> Result<Self, BiasError> {
        let uncorrected = target.zip_with(reference, |t, r| Some(t - r))?;
        let residual = residual_bias(corrected, reference)?;
        Ok(Self {
            uncorrected: uncorrected.stats(),
            residual: residual.stats(),
        })
    }

    pub fn for_series(target: &TimeSeries, corrected: &TimeSeries, reference: &TimeSeries) -> Self {
        Self {
            uncorrected: residual_series(target, reference).stats(),
            residual: residual_series(corrected, reference).stats(),
        }
    }

    /// Whether the corrected forecast has a strictly smaller mean absolute error.
    pub fn improved(&self) -> bool {
        match (self.uncorrected, self.residual) {
            (Some(uncorrected), Some(residual)) => residual.mean_abs < uncorrected.mean_abs,
            _ => false,
        }
    }
}
