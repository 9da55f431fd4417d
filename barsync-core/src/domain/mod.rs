//! Domain types for barsync

pub mod bar;
pub mod interval;
pub mod series;

pub use bar::{Bar, MonthKey};
pub use interval::{Interval, IntervalParseError};
pub use series::{sanitize_path_component, SeriesSpec};
