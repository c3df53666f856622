pub mod calendar;
pub mod geo;
pub mod grid;
pub mod time_series;
pub mod window;
