mod align;
mod analysis;
mod bias;
mod error;
mod frames;
mod query;
mod types;
mod utils;

pub use error::ForecastBiasError;

pub use align::{align, align_all, AlignedTimestampSet};
pub use analysis::*;

pub use bias::corrector::*;
pub use bias::error::BiasError;
pub use bias::estimator::*;
pub use bias::stats::FieldStats;

pub use frames::*;

pub use types::calendar::{Month, Year};
pub use types::geo::{BoundingBox, GridSpec, LatLon};
pub use types::grid::{FieldSeries, GriddedField};
pub use types::time_series::TimeSeries;
pub use types::window::{AnyDateTime, TimeWindow};

pub use query::config::ServiceConfig;
pub use query::error::QueryError;
pub use query::expr::LayerExpr;
pub use query::http::HttpQueryService;
pub use query::result::{LayerData, QueryResult};
pub use query::runner::{PollPolicy, QueryRunner};
pub use query::service::{QueryHandle, QueryService};
pub use query::spec::*;
pub use query::status::{QueryState, QueryStatus};
