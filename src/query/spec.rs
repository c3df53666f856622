//! What to ask a query service for: where, when, and which layers.

use crate::query::error::QueryError;
use crate::query::expr::LayerExpr;
use crate::types::geo::{BoundingBox, LatLon};
use crate::types::window::TimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Dimension selecting the forecast lead time, in hours.
pub const HORIZON_DIMENSION: &str = "horizon_hours";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialExtent {
    Point { lat: f64, lon: f64 },
    BoundingBox(BoundingBox),
}

impl SpatialExtent {
    pub fn point(location: LatLon) -> Self {
        SpatialExtent::Point {
            lat: location.0,
            lon: location.1,
        }
    }
}

impl From<LatLon> for SpatialExtent {
    fn from(location: LatLon) -> Self {
        SpatialExtent::point(location)
    }
}

impl From<BoundingBox> for SpatialExtent {
    fn from(bbox: BoundingBox) -> Self {
        SpatialExtent::BoundingBox(bbox)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalExtent {
    /// Explicit instants, e.g. the reference's publication times.
    Snapshots { times: Vec<DateTime<Utc>> },
    /// Every available timestamp inside the window.
    Interval(TimeWindow),
}

impl From<TimeWindow> for TemporalExtent {
    fn from(window: TimeWindow) -> Self {
        TemporalExtent::Interval(window)
    }
}

/// Temporal reduction the service applies to a layer before returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Min,
    Max,
    Sum,
}

/// A layer requested from the service's catalogue.
///
/// `name` is how the layer is called in the result; `key` identifies the dataset variable
/// in the service's catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            dimensions: BTreeMap::new(),
            aggregation: None,
        }
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>, value: i64) -> Self {
        self.dimensions.insert(dimension.into(), value);
        self
    }

    /// Selects the forecast issued `hours` before the valid time.
    pub fn with_horizon_hours(self, hours: i64) -> Self {
        self.with_dimension(HORIZON_DIMENSION, hours)
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }
}

/// A layer computed by the service from other layers of the same query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedLayer {
    pub name: String,
    pub expression: LayerExpr,
}

impl DerivedLayer {
    pub fn new(name: impl Into<String>, expression: LayerExpr) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

/// A complete query, serialised as the JSON body of a submission.
///
/// # Examples
///
/// ```
/// use forecast_bias::{LatLon, LayerSpec, Month, QuerySpec, SpatialExtent, TimeWindow};
///
/// let spec = QuerySpec::builder()
///     .spatial(SpatialExtent::point(LatLon(52.1, 5.18)))
///     .temporal(TimeWindow::period(Month(2023, 1)).unwrap().into())
///     .layers(vec![
///         LayerSpec::new("forecast", "ecmwf.hres.t2m").with_horizon_hours(24),
///         LayerSpec::new("reference", "era5.t2m"),
///     ])
///     .build();
/// assert!(spec.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, bon::Builder)]
pub struct QuerySpec {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
    pub layers: Vec<LayerSpec>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<DerivedLayer>,
}

impl QuerySpec {
    /// Names of every layer the result will contain, requested layers first.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.layers
            .iter()
            .map(|layer| layer.name.as_str())
            .chain(self.derived.iter().map(|layer| layer.name.as_str()))
    }

    /// Checks the query before it is submitted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidSpec`] when the query has no layers, reuses a layer name,
    /// derives a layer from names not declared before it, or has an empty spatial or temporal
    /// extent.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.layers.is_empty() {
            return Err(invalid("at least one layer is required"));
        }

        match &self.spatial {
            SpatialExtent::Point { lat, lon } => {
                if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
                    return Err(invalid(format!("point ({lat}, {lon}) is out of range")));
                }
            }
            SpatialExtent::BoundingBox(bbox) => {
                if !(bbox.width() > 0.0 && bbox.height() > 0.0) {
                    return Err(invalid(format!("bounding box {bbox:?} is empty")));
                }
            }
        }

        match &self.temporal {
            TemporalExtent::Snapshots { times } if times.is_empty() => {
                return Err(invalid("snapshot list is empty"));
            }
            TemporalExtent::Interval(window) if window.start > window.end => {
                return Err(invalid(format!("interval {window} ends before it starts")));
            }
            _ => {}
        }

        let mut declared = HashSet::new();
        for layer in &self.layers {
            if !declared.insert(layer.name.as_str()) {
                return Err(invalid(format!("layer name '{}' is used twice", layer.name)));
            }
        }
        for layer in &self.derived {
            if let Some(unknown) = layer
                .expression
                .layer_names()
                .into_iter()
                .find(|name| !declared.contains(name))
            {
                return Err(invalid(format!(
                    "derived layer '{}' references undeclared layer '{}'",
                    layer.name, unknown
                )));
            }
            if !declared.insert(layer.name.as_str()) {
                return Err(invalid(format!("layer name '{}' is used twice", layer.name)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidSpec(message.into())
}
