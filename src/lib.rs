//! Stock Price Prediction Dashboard
//!
//! Loads per-symbol stock tables, trains a regression model on a
//! chronological split and reports importances, metrics and chart series.
//!
//! ## Architecture
//!
//! ```text
//! DataStore → split → preprocess → ModelSpec::fit → evaluate → PipelineResult
//!                                                                  ↓
//!                                                      report (CLI) / dashboard (HTTP)
//! ```

pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod report;
