//! Analysis configuration
//!
//! Every benchmark and threshold the aggregators use lives here as a
//! `Default`-implementing struct, so callers can recalibrate without
//! touching computation code.

use serde::{Deserialize, Serialize};

use crate::models::{ActivityKind, CropKind};

/// Fallback rates injected when a referenced entity is missing or carries
/// no price of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultRates {
    /// EUR per equipment-hour
    pub equipment_hourly: f64,
    /// EUR per estimated labor-hour
    pub labor_hourly: f64,
    /// EUR per product unit
    pub product_unit_price: f64,
}

impl Default for DefaultRates {
    fn default() -> Self {
        Self {
            equipment_hourly: 50.0,
            labor_hourly: 10.0,
            product_unit_price: 5.0,
        }
    }
}

/// Estimated labor hours per activity kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborBenchmarks {
    pub preparation: f64,
    pub planting: f64,
    pub treatment: f64,
    pub harvest: f64,
    pub maintenance: f64,
}

impl Default for LaborBenchmarks {
    fn default() -> Self {
        Self {
            preparation: 8.0,
            planting: 6.0,
            treatment: 4.0,
            harvest: 10.0,
            maintenance: 5.0,
        }
    }
}

impl LaborBenchmarks {
    pub fn hours_for(&self, kind: ActivityKind) -> f64 {
        match kind {
            ActivityKind::Preparation => self.preparation,
            ActivityKind::Planting => self.planting,
            ActivityKind::Treatment => self.treatment,
            ActivityKind::Harvest => self.harvest,
            ActivityKind::Maintenance => self.maintenance,
        }
    }
}

/// Expected yield benchmarks in kg/ha by crop kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedYields {
    pub cereal: f64,
    pub horticultural: f64,
    pub fruit: f64,
    pub vine: f64,
    pub olive: f64,
    pub tuber: f64,
    pub oilseed: f64,
    pub other: f64,
}

impl Default for ExpectedYields {
    fn default() -> Self {
        Self {
            cereal: 5000.0,
            horticultural: 20000.0,
            fruit: 15000.0,
            vine: 8000.0,
            olive: 3000.0,
            tuber: 25000.0,
            oilseed: 3500.0,
            other: 10000.0,
        }
    }
}

impl ExpectedYields {
    pub fn kg_per_ha(&self, kind: CropKind) -> f64 {
        match kind {
            CropKind::Cereal => self.cereal,
            CropKind::Horticultural => self.horticultural,
            CropKind::Fruit => self.fruit,
            CropKind::Vine => self.vine,
            CropKind::Olive => self.olive,
            CropKind::Tuber => self.tuber,
            CropKind::Oilseed => self.oilseed,
            CropKind::Other => self.other,
        }
    }
}

/// Weights and benchmarks for the operational-efficiency blend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyConfig {
    pub time_weight: f64,
    pub cost_weight: f64,
    pub yield_weight: f64,
    /// EUR per hour used as the cost-efficiency denominator
    pub benchmark_hourly_cost: f64,
    /// Time-efficiency score assigned when an activity has no end date
    pub open_ended_time_score: f64,
}

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            time_weight: 0.4,
            cost_weight: 0.4,
            yield_weight: 0.2,
            benchmark_hourly_cost: 75.0,
            open_ended_time_score: 50.0,
        }
    }
}

/// Default alert trigger levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Aggregate total above this raises a high-cost alert (EUR)
    pub high_total_cost: f64,
    /// Equipment share of total above this raises a disproportion alert
    pub equipment_share_max: f64,
    /// Productivity below this percentage of expected yield raises an alert
    pub min_expected_ratio_pct: f64,
    /// First-to-last productivity drop beyond this raises an alert (negative pct)
    pub productivity_drop_pct: f64,
    /// Productivity above this percentage of expected yield is an insight
    pub exceptional_ratio_pct: f64,
    /// Trend strength above this marks a strong trend insight
    pub strong_trend_strength_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            high_total_cost: 10_000.0,
            equipment_share_max: 0.7,
            min_expected_ratio_pct: 60.0,
            productivity_drop_pct: -15.0,
            exceptional_ratio_pct: 120.0,
            strong_trend_strength_pct: 10.0,
        }
    }
}

/// Full configuration consumed by both aggregators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub rates: DefaultRates,
    #[serde(default)]
    pub labor: LaborBenchmarks,
    #[serde(default)]
    pub yields: ExpectedYields,
    #[serde(default)]
    pub efficiency: EfficiencyConfig,
    #[serde(default)]
    pub alerts: AlertThresholds,
}
