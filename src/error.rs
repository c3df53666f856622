use crate::bias::error::BiasError;
use crate::query::error::QueryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastBiasError {
    #[error(transparent)]
    Bias(#[from] BiasError),

    #[error(transparent)]
    Query(#[from] QueryError),
}
