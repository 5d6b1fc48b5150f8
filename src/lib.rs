//! Agrolens - farm activity analytics backend
//!
//! This library computes cost and productivity analytics over farm activity
//! records. It handles:
//! - Per-activity cost computation (equipment, products, estimated labor)
//! - Multi-dimension cost consolidation (parcel, crop, period, kind, responsible)
//! - Yield-based productivity analysis with trend fitting and forecasts
//! - Alert rules, insight generation and report assembly
//! - Aggregate caching keyed by structured query parameters

pub mod aggregate;
pub mod aggregator;
pub mod alerts;
pub mod cache;
pub mod compare;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod models;
pub mod report;
pub mod store;

use thiserror::Error;

/// Error type for all public aggregation operations
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}

impl AnalysisError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable tag used by the dispatch layer's `errorKind` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::InvalidInput(_) => "InvalidInput",
            Self::InsufficientData(_) => "InsufficientData",
            Self::Store(_) => "StoreFailure",
        }
    }
}

/// Shorthand for the most common error in the aggregators
pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> AnalysisError {
    AnalysisError::not_found(entity, id)
}
