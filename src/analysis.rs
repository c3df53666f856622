//! End-to-end bias analysis: fetch baseline and target data, estimate, correct, evaluate.

use crate::bias::corrector::{
    correct, correct_series, residual_bias, CorrectedForecastField, CorrectionSummary,
};
use crate::bias::estimator::{estimate_bias, estimate_series_bias, BiasField, SeriesBias};
use crate::error::ForecastBiasError;
use crate::query::config::ServiceConfig;
use crate::query::error::QueryError;
use crate::query::http::HttpQueryService;
use crate::query::result::QueryResult;
use crate::query::runner::QueryRunner;
use crate::query::service::QueryService;
use crate::query::spec::{LayerSpec, QuerySpec, SpatialExtent};
use crate::types::geo::{BoundingBox, LatLon};
use crate::types::grid::GriddedField;
use crate::types::time_series::TimeSeries;
use crate::types::window::TimeWindow;
use bon::bon;
use futures_util::future::try_join;
use log::info;

/// Name of the forecast layer in every query issued by [`BiasAnalysis`].
pub const FORECAST_LAYER: &str = "forecast";
/// Name of the reference layer in every query issued by [`BiasAnalysis`].
pub const REFERENCE_LAYER: &str = "reference";

/// Outcome of [`BiasAnalysis::point`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointReport {
    pub location: LatLon,
    /// Bias over the baseline window.
    pub baseline: SeriesBias,
    pub target_forecast: TimeSeries,
    pub target_reference: TimeSeries,
    /// `target_forecast` shifted by the baseline bias.
    pub corrected: TimeSeries,
    pub summary: CorrectionSummary,
}

/// Outcome of [`BiasAnalysis::grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridReport {
    pub bbox: BoundingBox,
    pub baseline_bias: BiasField,
    /// Temporal mean of the target forecast over the timestamps it shares with the target
    /// reference.
    pub target_forecast: GriddedField,
    /// Temporal mean of the target reference over the same timestamps.
    pub target_reference: GriddedField,
    pub corrected: CorrectedForecastField,
    /// `corrected - target_reference`.
    pub residual: GriddedField,
    pub summary: CorrectionSummary,
}

/// Bias estimation and correction on top of a [`QueryService`].
///
/// Each analysis issues two queries, one for the baseline window and one for the target
/// window, each requesting the forecast and the reference layer. Both queries run
/// concurrently on the same [`QueryRunner`].
pub struct BiasAnalysis<S> {
    runner: QueryRunner<S>,
}

impl BiasAnalysis<HttpQueryService> {
    /// An analysis against the HTTP service described by `config`, polling with its policy.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, QueryError> {
        let service = HttpQueryService::new(config)?;
        Ok(Self::new(
            QueryRunner::new(service).with_policy(config.poll_policy),
        ))
    }
}

#[bon]
impl<S: QueryService> BiasAnalysis<S> {
    pub fn new(runner: QueryRunner<S>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &QueryRunner<S> {
        &self.runner
    }

    /// Estimates the bias of a forecast at one location and corrects the target period.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.location(LatLon)`: **Required.** Where to evaluate.
    /// * `.forecast_key(impl Into<String>)`: **Required.** Catalogue key of the forecast.
    /// * `.horizon_hours(i64)`: Optional. Forecast lead time to select.
    /// * `.reference_key(impl Into<String>)`: **Required.** Catalogue key of the reference.
    /// * `.baseline(TimeWindow)`: **Required.** Window the bias is estimated over.
    /// * `.target(TimeWindow)`: **Required.** Window the correction is applied to.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastBiasError::Query`] if either query fails or lacks a layer.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use forecast_bias::{BiasAnalysis, ForecastBiasError, LatLon, Month, ServiceConfig, TimeWindow};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ForecastBiasError> {
    /// let analysis = BiasAnalysis::from_config(&ServiceConfig::from_env()?)?;
    ///
    /// let report = analysis
    ///     .point()
    ///     .location(LatLon(52.1015, 5.1779))
    ///     .forecast_key("ecmwf.hres.t2m")
    ///     .horizon_hours(24)
    ///     .reference_key("era5.t2m")
    ///     .baseline(TimeWindow::period(Month(2023, 1))?)
    ///     .target(TimeWindow::period(Month(2023, 2))?)
    ///     .call()
    ///     .await?;
    ///
    /// println!("Baseline bias: {:?}", report.baseline.bias);
    /// println!("Correction improved the forecast: {}", report.summary.improved());
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn point(
        &self,
        location: LatLon,
        #[builder(into)] forecast_key: String,
        horizon_hours: Option<i64>,
        #[builder(into)] reference_key: String,
        baseline: TimeWindow,
        target: TimeWindow,
    ) -> Result<PointReport, ForecastBiasError> {
        let spatial = SpatialExtent::point(location);
        let layers = layers(forecast_key, horizon_hours, reference_key);
        let (baseline_result, target_result) =
            self.fetch(spatial, &layers, baseline, target).await?;

        let estimate = estimate_series_bias(
            baseline_result.series(FORECAST_LAYER)?,
            baseline_result.series(REFERENCE_LAYER)?,
            Some(&baseline),
        );

        let target_forecast = target_result.series(FORECAST_LAYER)?.within(&target);
        let target_reference = target_result.series(REFERENCE_LAYER)?.within(&target);
        let corrected = correct_series(&target_forecast, estimate.bias);
        let summary = CorrectionSummary::for_series(&target_forecast, &corrected, &target_reference);

        info!(
            "Point ({}, {}): bias {:?} over {} aligned timestamps, correction improved: {}",
            location.0,
            location.1,
            estimate.bias,
            estimate.aligned.len(),
            summary.improved()
        );

        Ok(PointReport {
            location,
            baseline: estimate,
            target_forecast,
            target_reference,
            corrected,
            summary,
        })
    }

    /// Estimates a per-cell bias field over a region and corrects the target period.
    ///
    /// Takes the same arguments as [`Self::point`], with `.bbox(BoundingBox)` in place of
    /// `.location`. The service must return a stack of fields for both layers.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastBiasError::Query`] if either query fails or lacks a layer, and
    /// [`ForecastBiasError::Bias`] if the stacks of the two windows are on different grids.
    #[builder]
    pub async fn grid(
        &self,
        bbox: BoundingBox,
        #[builder(into)] forecast_key: String,
        horizon_hours: Option<i64>,
        #[builder(into)] reference_key: String,
        baseline: TimeWindow,
        target: TimeWindow,
    ) -> Result<GridReport, ForecastBiasError> {
        let spatial = SpatialExtent::BoundingBox(bbox);
        let layers = layers(forecast_key, horizon_hours, reference_key);
        let (baseline_result, target_result) =
            self.fetch(spatial, &layers, baseline, target).await?;

        let baseline_bias = estimate_bias(
            baseline_result.stack(FORECAST_LAYER)?,
            baseline_result.stack(REFERENCE_LAYER)?,
            Some(&baseline),
        )?;
        let target_means = estimate_bias(
            target_result.stack(FORECAST_LAYER)?,
            target_result.stack(REFERENCE_LAYER)?,
            Some(&target),
        )?
        .into_operands();

        let corrected = correct(&target_means.forecast_mean, baseline_bias.operands())?;
        let residual = residual_bias(&corrected, &target_means.reference_mean)?;
        let summary = CorrectionSummary::for_fields(
            &target_means.forecast_mean,
            &corrected,
            &target_means.reference_mean,
        )?;

        info!(
            "Grid {:?}: bias defined in {} cells, correction improved: {}",
            bbox,
            baseline_bias.field.defined_count(),
            summary.improved()
        );

        Ok(GridReport {
            bbox,
            baseline_bias,
            target_forecast: target_means.forecast_mean,
            target_reference: target_means.reference_mean,
            corrected,
            residual,
            summary,
        })
    }

    async fn fetch(
        &self,
        spatial: SpatialExtent,
        layers: &[LayerSpec],
        baseline: TimeWindow,
        target: TimeWindow,
    ) -> Result<(QueryResult, QueryResult), QueryError> {
        let query = |window: TimeWindow| {
            QuerySpec::builder()
                .spatial(spatial)
                .temporal(window.into())
                .layers(layers.to_vec())
                .build()
        };
        let baseline_query = query(baseline);
        let target_query = query(target);

        try_join(
            self.runner.run(&baseline_query),
            self.runner.run(&target_query),
        )
        .await
    }
}

fn layers(forecast_key: String, horizon_hours: Option<i64>, reference_key: String) -> Vec<LayerSpec> {
    let forecast = LayerSpec::new(FORECAST_LAYER, forecast_key);
    let forecast = match horizon_hours {
        Some(hours) => forecast.with_horizon_hours(hours),
        None => forecast,
    };
    vec![forecast, LayerSpec::new(REFERENCE_LAYER, reference_key)]
}
