use crate::query::error::QueryError;
use crate::query::result::QueryResult;
use crate::query::spec::QuerySpec;
use crate::query::status::QueryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Identifies a query accepted by a [`QueryService`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryHandle {
    pub id: String,
}

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A remote service that evaluates queries asynchronously.
///
/// Queries are submitted once, polled until the service reports a terminal status, and the
/// result is fetched only after the query has succeeded. [`crate::QueryRunner`] drives this
/// protocol; implementors only translate each step to their transport.
pub trait QueryService {
    fn submit_query(
        &self,
        spec: &QuerySpec,
    ) -> impl Future<Output = Result<QueryHandle, QueryError>> + Send;

    fn poll_status(
        &self,
        handle: &QueryHandle,
    ) -> impl Future<Output = Result<QueryStatus, QueryError>> + Send;

    fn fetch_result(
        &self,
        handle: &QueryHandle,
    ) -> impl Future<Output = Result<QueryResult, QueryError>> + Send;
}
