//! Reference entities: parcels, crops, equipment, products
//!
//! These are looked up by id while computing costs and productivity.

use serde::{Deserialize, Serialize};

/// A unit of land carrying at most one crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: String,
    pub name: String,
    /// Hectares, > 0
    pub area_ha: f64,
    pub soil_type: Option<String>,
    pub crop_id: Option<String>,
}

/// Crop classification driving expected-yield lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropKind {
    Cereal,
    Horticultural,
    Fruit,
    Vine,
    Olive,
    Tuber,
    Oilseed,
    Other,
}

impl CropKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cereal => "cereal",
            Self::Horticultural => "horticultural",
            Self::Fruit => "fruit",
            Self::Vine => "vine",
            Self::Olive => "olive",
            Self::Tuber => "tuber",
            Self::Oilseed => "oilseed",
            Self::Other => "other",
        }
    }

    /// Parse from string; anything unrecognized maps to `Other`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cereal" => Self::Cereal,
            "horticultural" => Self::Horticultural,
            "fruit" => Self::Fruit,
            "vine" => Self::Vine,
            "olive" => Self::Olive,
            "tuber" => Self::Tuber,
            "oilseed" => Self::Oilseed,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crop {
    pub id: String,
    pub name: String,
    pub kind: CropKind,
    /// Days from planting to harvest, when known
    pub growth_cycle_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub name: String,
    pub equipment_type: Option<String>,
    /// >= 0 when present; absent falls back to the configured default rate
    pub hourly_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub product_type: Option<String>,
    /// >= 0 when present; absent falls back to the configured default price
    pub unit_price: Option<f64>,
}
