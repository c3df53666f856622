pub mod corrector;
pub mod error;
pub mod estimator;
pub mod stats;
