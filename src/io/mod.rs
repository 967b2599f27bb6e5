//! External inputs: batch configuration and recorded profiles.

pub mod config;

pub use crate::timeseries::TimeSeriesProfile;
pub use config::{BatchConfig, ScenarioPlan};
