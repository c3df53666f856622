//! Summary statistics over the non-missing values of a field or series.

use crate::utils::mean;

/// Mean, spread and magnitude of a set of values, ignoring missing ones.
///
/// `mean_abs` is the mean absolute value; applied to a residual field it is the MAE of the
/// corrected forecast. `std_dev` is the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub mean_abs: f64,
}

impl FieldStats {
    /// Returns `None` when every value is missing.
    pub fn from_values(values: impl IntoIterator<Item = Option<f64>>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().flatten().collect();
        let mean_value = mean(values.iter().copied())?;
        let variance = mean(values.iter().map(|v| (v - mean_value).powi(2)))?;
        let mean_abs = mean(values.iter().map(|v| v.abs()))?;
        Some(Self {
            count: values.len(),
            mean: mean_value,
            std_dev: variance.sqrt(),
            mean_abs,
        })
    }
}
