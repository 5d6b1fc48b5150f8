//! Activity records
//!
//! An activity is one discrete unit of farm work: a kind, a lifecycle state,
//! a time window, and the resources it consumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of farm work an activity represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Preparation,
    Planting,
    Treatment,
    Harvest,
    Maintenance,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Planting => "planting",
            Self::Treatment => "treatment",
            Self::Harvest => "harvest",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "preparation" => Some(Self::Preparation),
            "planting" => Some(Self::Planting),
            "treatment" => Some(Self::Treatment),
            "harvest" => Some(Self::Harvest),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    pub fn all() -> Vec<ActivityKind> {
        vec![
            Self::Preparation,
            Self::Planting,
            Self::Treatment,
            Self::Harvest,
            Self::Maintenance,
        ]
    }
}

/// Lifecycle state: `pending → in_progress → completed | cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ActivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Equipment consumption line: time spent using one piece of equipment.
/// The unit is a free string ("minute", "hour", "day", "week", "month");
/// unknown units are treated as hours downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentUsage {
    pub equipment_id: String,
    pub time_used: f64,
    pub time_unit: String,
}

/// Product consumption line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUsage {
    pub product_id: String,
    pub quantity: f64,
    pub unit: String,
}

/// A discrete farm operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub kind: ActivityKind,
    pub state: ActivityState,
    pub started_at: DateTime<Utc>,
    /// Nullable while the activity is open; when present, >= started_at
    pub ended_at: Option<DateTime<Utc>>,
    pub parcel_id: String,
    pub responsible_id: String,
    #[serde(default)]
    pub equipment: Vec<EquipmentUsage>,
    #[serde(default)]
    pub products: Vec<ProductUsage>,
    /// Harvest activities only
    pub harvested_quantity: Option<f64>,
    pub harvest_unit: Option<String>,
    pub notes: Option<String>,
}

impl Activity {
    /// Elapsed wall-clock hours, if the activity has ended
    pub fn elapsed_hours(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds() as f64 / 3600.0)
    }

    pub fn is_open_ended(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Window-overlap test used by period queries. Open-ended activities
    /// match when they started on or before the period end.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match self.ended_at {
            Some(ended) => self.started_at <= end && ended >= start,
            None => self.started_at <= end,
        }
    }
}
