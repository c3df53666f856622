pub mod config;
pub mod error;
pub mod expr;
pub mod http;
pub mod result;
pub mod runner;
pub mod service;
pub mod spec;
pub mod status;
