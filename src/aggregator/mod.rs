//! Aggregation engines
//!
//! [`cost::CostAggregator`] answers cost questions, [`productivity::ProductivityAggregator`]
//! answers yield and efficiency questions on top of it. Both are generic
//! over the [`crate::store::Store`] backing them and memoize their results.

pub mod cost;
pub mod productivity;

use serde::{Deserialize, Serialize};

use crate::models::ActivityState;
use crate::store::Period;

/// Options accepted by most aggregation operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Activity states to include; `None` applies the operation's default
    pub states: Option<Vec<ActivityState>>,
    /// Recompute even when a cached aggregate exists
    #[serde(default)]
    pub force_update: bool,
    /// Restrict to activities overlapping this window
    pub period: Option<Period>,
}

impl QueryOptions {
    pub fn force() -> Self {
        Self {
            force_update: true,
            ..Self::default()
        }
    }

    /// Effective state list, falling back to the aggregation default of
    /// completed and pending activities
    pub fn effective_states(&self) -> Vec<ActivityState> {
        self.states
            .clone()
            .unwrap_or_else(|| vec![ActivityState::Completed, ActivityState::Pending])
    }

    /// Stable signature of the state list for cache keys
    pub fn states_signature(&self) -> String {
        let mut tags: Vec<&str> = self.effective_states().iter().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        let opts = QueryOptions::default();
        assert_eq!(
            opts.effective_states(),
            vec![ActivityState::Completed, ActivityState::Pending]
        );
        assert!(!opts.force_update);
    }

    #[test]
    fn test_states_signature_is_order_independent() {
        let a = QueryOptions {
            states: Some(vec![ActivityState::Pending, ActivityState::Completed]),
            ..Default::default()
        };
        let b = QueryOptions {
            states: Some(vec![ActivityState::Completed, ActivityState::Pending]),
            ..Default::default()
        };
        assert_eq!(a.states_signature(), b.states_signature());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let opts: QueryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, QueryOptions::default());

        let opts: QueryOptions =
            serde_json::from_str(r#"{"force_update": true, "states": ["completed"]}"#).unwrap();
        assert!(opts.force_update);
        assert_eq!(opts.states, Some(vec![ActivityState::Completed]));
    }
}
