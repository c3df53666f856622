use crate::query::error::QueryError;
use crate::types::grid::{FieldSeries, GriddedField};
use crate::types::time_series::TimeSeries;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The data of one layer in a query result.
///
/// Point queries produce [`LayerData::Series`]; bounding-box queries produce a single
/// [`LayerData::Grid`] for aggregated layers and a [`LayerData::Stack`] otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LayerData {
    Grid(GriddedField),
    Series(TimeSeries),
    Stack(FieldSeries),
}

impl LayerData {
    fn kind(&self) -> &'static str {
        match self {
            LayerData::Grid(_) => "grid",
            LayerData::Series(_) => "series",
            LayerData::Stack(_) => "stack",
        }
    }
}

/// Layers returned by a completed query, keyed by layer name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub layers: HashMap<String, LayerData>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, name: impl Into<String>, data: LayerData) -> Self {
        self.layers.insert(name.into(), data);
        self
    }

    pub fn layer(&self, name: &str) -> Result<&LayerData, QueryError> {
        self.layers
            .get(name)
            .ok_or_else(|| QueryError::MissingLayer(name.to_string()))
    }

    pub fn grid(&self, name: &str) -> Result<&GriddedField, QueryError> {
        match self.layer(name)? {
            LayerData::Grid(field) => Ok(field),
            other => Err(unexpected(name, "grid", other)),
        }
    }

    pub fn series(&self, name: &str) -> Result<&TimeSeries, QueryError> {
        match self.layer(name)? {
            LayerData::Series(series) => Ok(series),
            other => Err(unexpected(name, "series", other)),
        }
    }

    pub fn stack(&self, name: &str) -> Result<&FieldSeries, QueryError> {
        match self.layer(name)? {
            LayerData::Stack(stack) => Ok(stack),
            other => Err(unexpected(name, "stack", other)),
        }
    }
}

fn unexpected(name: &str, expected: &'static str, found: &LayerData) -> QueryError {
    log::warn!(
        "Layer '{}' holds a {} where a {} was expected",
        name,
        found.kind(),
        expected
    );
    QueryError::UnexpectedLayerType {
        layer: name.to_string(),
        expected,
    }
}
