//! Persistence layer
//!
//! The aggregation core reads activities and reference entities through the
//! [`Store`] trait and never writes through it. Two implementations ship:
//! an in-memory fixture store and a SQLite-backed store.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Activity, ActivityKind, ActivityState, Crop, Equipment, Parcel, Product};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// A closed date range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Activity query filter. All clauses are conjunctive; unset clauses match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub ids: Option<Vec<String>>,
    pub parcel_id: Option<String>,
    pub kind: Option<ActivityKind>,
    pub responsible_id: Option<String>,
    pub states: Option<Vec<ActivityState>>,
    /// Window-overlap match; open-ended activities match when started on or
    /// before the period end
    pub period: Option<Period>,
}

impl ActivityFilter {
    pub fn for_parcel(parcel_id: impl Into<String>) -> Self {
        Self {
            parcel_id: Some(parcel_id.into()),
            ..Self::default()
        }
    }

    pub fn with_states(mut self, states: Vec<ActivityState>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn with_kind(mut self, kind: ActivityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    /// Shared matching semantics used by both store implementations
    pub fn matches(&self, activity: &Activity) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &activity.id) {
                return false;
            }
        }
        if let Some(parcel_id) = &self.parcel_id {
            if &activity.parcel_id != parcel_id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if activity.kind != kind {
                return false;
            }
        }
        if let Some(responsible_id) = &self.responsible_id {
            if &activity.responsible_id != responsible_id {
                return false;
            }
        }
        if let Some(states) = &self.states {
            if !states.contains(&activity.state) {
                return false;
            }
        }
        if let Some(period) = &self.period {
            if !activity.overlaps(period.start, period.end) {
                return false;
            }
        }
        true
    }
}

/// Read capabilities the aggregation core consumes
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, StoreError>;
    async fn activity(&self, id: &str) -> Result<Option<Activity>, StoreError>;
    async fn parcel(&self, id: &str) -> Result<Option<Parcel>, StoreError>;
    async fn parcels_for_crop(&self, crop_id: &str) -> Result<Vec<Parcel>, StoreError>;
    async fn crop(&self, id: &str) -> Result<Option<Crop>, StoreError>;
    async fn equipment(&self, id: &str) -> Result<Option<Equipment>, StoreError>;
    async fn product(&self, id: &str) -> Result<Option<Product>, StoreError>;
    async fn person_name(&self, id: &str) -> Result<Option<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activity(id: &str, state: ActivityState, kind: ActivityKind) -> Activity {
        Activity {
            id: id.to_string(),
            kind,
            state,
            started_at: Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap(),
            ended_at: Some(Utc.with_ymd_and_hms(2025, 6, 10, 18, 0, 0).unwrap()),
            parcel_id: "p1".to_string(),
            responsible_id: "u1".to_string(),
            equipment: vec![],
            products: vec![],
            harvested_quantity: None,
            harvest_unit: None,
            notes: None,
        }
    }

    #[test]
    fn test_filter_by_state() {
        let filter = ActivityFilter::for_parcel("p1")
            .with_states(vec![ActivityState::Completed, ActivityState::Pending]);

        assert!(filter.matches(&activity("a1", ActivityState::Completed, ActivityKind::Harvest)));
        assert!(filter.matches(&activity("a2", ActivityState::Pending, ActivityKind::Planting)));
        assert!(!filter.matches(&activity("a3", ActivityState::Cancelled, ActivityKind::Harvest)));
    }

    #[test]
    fn test_filter_by_parcel_and_kind() {
        let filter = ActivityFilter::for_parcel("p1").with_kind(ActivityKind::Harvest);
        assert!(filter.matches(&activity("a1", ActivityState::Completed, ActivityKind::Harvest)));
        assert!(!filter.matches(&activity("a2", ActivityState::Completed, ActivityKind::Planting)));

        let mut other_parcel = activity("a3", ActivityState::Completed, ActivityKind::Harvest);
        other_parcel.parcel_id = "p2".to_string();
        assert!(!filter.matches(&other_parcel));
    }

    #[test]
    fn test_filter_by_period_overlap() {
        let period = Period::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap(),
        );
        let filter = ActivityFilter::default().with_period(period);

        assert!(filter.matches(&activity("a1", ActivityState::Completed, ActivityKind::Harvest)));

        let mut open_ended = activity("a2", ActivityState::InProgress, ActivityKind::Treatment);
        open_ended.started_at = Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap();
        open_ended.ended_at = None;
        assert!(filter.matches(&open_ended));

        let mut outside = activity("a3", ActivityState::Completed, ActivityKind::Harvest);
        outside.started_at = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
        outside.ended_at = Some(Utc.with_ymd_and_hms(2025, 8, 2, 0, 0, 0).unwrap());
        assert!(!filter.matches(&outside));
    }

    #[test]
    fn test_filter_by_ids() {
        let filter = ActivityFilter {
            ids: Some(vec!["a1".to_string(), "a3".to_string()]),
            ..Default::default()
        };
        assert!(filter.matches(&activity("a1", ActivityState::Completed, ActivityKind::Harvest)));
        assert!(!filter.matches(&activity("a2", ActivityState::Completed, ActivityKind::Harvest)));
    }

    #[test]
    fn test_default_filter_matches_everything() {
        let filter = ActivityFilter::default();
        assert!(filter.matches(&activity("a1", ActivityState::Cancelled, ActivityKind::Treatment)));
    }
}
