use crate::query::status::QueryState;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidSpec(String),

    #[error("Query cannot move from {from} to {to}")]
    InvalidTransition { from: QueryState, to: QueryState },

    #[error("Query {id} failed: {}", reason.as_deref().unwrap_or("no reason given"))]
    Failed { id: String, reason: Option<String> },

    #[error("Query {id} did not finish within {elapsed:?}")]
    TimedOut { id: String, elapsed: Duration },

    #[error("Query {id} was cancelled")]
    Cancelled { id: String },

    #[error("Layer '{0}' is not present in the query result")]
    MissingLayer(String),

    #[error("Layer '{layer}' is not a {expected}")]
    UnexpectedLayerType {
        layer: String,
        expected: &'static str,
    },

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {0}")]
    Decode(String, #[source] serde_json::Error),

    #[error("Invalid service configuration: {0}")]
    Config(String),
}
