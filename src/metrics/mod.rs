//! Metric calculation modules
//!
//! Pure computation over resolved inputs: unit normalization, per-activity
//! cost breakdowns, operational-efficiency scoring and regression helpers.

pub mod cost;
pub mod efficiency;
pub mod regression;
pub mod units;
