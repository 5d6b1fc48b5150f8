//! Cost aggregation
//!
//! [`CostAggregate`] accumulates per-activity cost results into category
//! totals and per-dimension buckets (parcel, crop, kind, responsible,
//! equipment, product type). Every aggregation builds a fresh accumulator;
//! results never alias a shared instance. Buckets are ordered maps so
//! serialization and tie-breaking are deterministic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::cost::{ActivityCost, CostBreakdown};
use crate::models::ActivityKind;

/// Per-dimension cost bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionBucket {
    pub name: String,
    pub total: f64,
    pub equipment: f64,
    pub products: f64,
    pub labor: f64,
    pub activity_ids: Vec<String>,
}

impl DimensionBucket {
    fn absorb(&mut self, cost: &ActivityCost) {
        self.total += cost.breakdown.total;
        self.equipment += cost.breakdown.equipment;
        self.products += cost.breakdown.products;
        self.labor += cost.breakdown.labor;
        self.activity_ids.push(cost.activity_id.clone());
    }
}

/// Crop bucket: a dimension bucket plus the per-parcel split inside the crop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CropBucket {
    pub name: String,
    pub total: f64,
    pub equipment: f64,
    pub products: f64,
    pub labor: f64,
    pub activity_ids: Vec<String>,
    pub parcel_costs: BTreeMap<String, f64>,
}

/// Resource bucket keyed by equipment id or product type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBucket {
    pub name: String,
    pub total: f64,
    pub activity_ids: Vec<String>,
}

/// Derived ratios filled in by [`CostAggregate::finalize`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Total cost over estimated working hours (8h per activity)
    pub cost_per_hour: f64,
    /// Total cost per hectare; only set when an area is known
    pub cost_per_area: Option<f64>,
    pub avg_efficiency: f64,
}

/// Dimension labels attached while consolidating one activity
#[derive(Debug, Clone, Default)]
pub struct ConsolidationContext {
    pub parcel_id: String,
    pub parcel_name: String,
    pub crop_id: Option<String>,
    pub crop_name: Option<String>,
}

const ESTIMATED_HOURS_PER_ACTIVITY: f64 = 8.0;

/// Accumulated cost picture over a set of activities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostAggregate {
    pub total: f64,
    pub equipment: f64,
    pub products: f64,
    pub labor: f64,
    pub activity_count: usize,
    pub activities: Vec<ActivityCost>,
    pub by_parcel: BTreeMap<String, DimensionBucket>,
    pub by_crop: BTreeMap<String, CropBucket>,
    pub by_kind: BTreeMap<String, f64>,
    pub by_responsible: BTreeMap<String, DimensionBucket>,
    pub by_equipment: BTreeMap<String, ResourceBucket>,
    pub by_product_type: BTreeMap<String, ResourceBucket>,
    pub metrics: AggregateMetrics,
    /// Scope markers describing what this aggregate covers
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub scope_kind: Option<ActivityKind>,
    pub scope_responsible: Option<String>,
}

impl CostAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one activity cost into the running totals and every dimension
    /// bucket it belongs to
    pub fn consolidate(&mut self, cost: &ActivityCost, ctx: &ConsolidationContext) {
        self.total += cost.breakdown.total;
        self.equipment += cost.breakdown.equipment;
        self.products += cost.breakdown.products;
        self.labor += cost.breakdown.labor;
        self.activity_count += 1;

        let parcel = self.by_parcel.entry(ctx.parcel_id.clone()).or_default();
        if parcel.name.is_empty() {
            parcel.name = ctx.parcel_name.clone();
        }
        parcel.absorb(cost);

        if let Some(crop_id) = &ctx.crop_id {
            let crop = self.by_crop.entry(crop_id.clone()).or_default();
            if crop.name.is_empty() {
                crop.name = ctx.crop_name.clone().unwrap_or_else(|| crop_id.clone());
            }
            crop.total += cost.breakdown.total;
            crop.equipment += cost.breakdown.equipment;
            crop.products += cost.breakdown.products;
            crop.labor += cost.breakdown.labor;
            crop.activity_ids.push(cost.activity_id.clone());
            *crop.parcel_costs.entry(ctx.parcel_id.clone()).or_insert(0.0) +=
                cost.breakdown.total;
        }

        *self.by_kind.entry(cost.kind.as_str().to_string()).or_insert(0.0) +=
            cost.breakdown.total;

        let responsible = self
            .by_responsible
            .entry(cost.responsible_id.clone())
            .or_default();
        if responsible.name.is_empty() {
            responsible.name = cost
                .responsible_name
                .clone()
                .unwrap_or_else(|| cost.responsible_id.clone());
        }
        responsible.absorb(cost);

        for line in &cost.equipment_lines {
            let bucket = self.by_equipment.entry(line.equipment_id.clone()).or_default();
            if bucket.name.is_empty() {
                bucket.name = line.name.clone();
            }
            bucket.total += line.cost;
            if bucket.activity_ids.last() != Some(&cost.activity_id) {
                bucket.activity_ids.push(cost.activity_id.clone());
            }
        }
        for line in &cost.product_lines {
            let bucket = self
                .by_product_type
                .entry(line.product_type.clone())
                .or_default();
            if bucket.name.is_empty() {
                bucket.name = line.product_type.clone();
            }
            bucket.total += line.cost;
            if bucket.activity_ids.last() != Some(&cost.activity_id) {
                bucket.activity_ids.push(cost.activity_id.clone());
            }
        }

        self.activities.push(cost.clone());
    }

    /// Compute the derived ratios once consolidation is done
    pub fn finalize(&mut self) {
        if self.activity_count == 0 {
            self.metrics = AggregateMetrics::default();
            return;
        }
        let estimated_hours = self.activity_count as f64 * ESTIMATED_HOURS_PER_ACTIVITY;
        self.metrics.cost_per_hour = self.total / estimated_hours;
        self.metrics.avg_efficiency =
            self.activities.iter().map(|a| a.efficiency).sum::<f64>() / self.activity_count as f64;
    }

    /// Attach a per-area ratio; ignored for a non-positive area
    pub fn set_area_metrics(&mut self, area_ha: f64) {
        if area_ha > 0.0 {
            self.metrics.cost_per_area = Some(self.total / area_ha);
        }
    }

    /// Category breakdown view of the top-level totals
    pub fn breakdown(&self) -> CostBreakdown {
        CostBreakdown {
            equipment: self.equipment,
            products: self.products,
            labor: self.labor,
            total: self.total,
        }
    }

    /// Share of the total carried by one category total, 0 when empty
    pub fn share_of_total(&self, category_total: f64) -> f64 {
        if self.total > 0.0 {
            category_total / self.total
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::cost::{ResolvedEquipmentLine, ResolvedProductLine};
    use crate::models::ActivityState;
    use chrono::TimeZone;

    fn cost(
        id: &str,
        kind: ActivityKind,
        equipment: f64,
        products: f64,
        labor: f64,
    ) -> ActivityCost {
        let efficiency = 80.0;
        ActivityCost {
            activity_id: id.to_string(),
            kind,
            state: ActivityState::Completed,
            started_at: Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap(),
            ended_at: Some(Utc.with_ymd_and_hms(2025, 6, 10, 16, 0, 0).unwrap()),
            responsible_id: "u1".to_string(),
            responsible_name: Some("Ana".to_string()),
            breakdown: CostBreakdown::from_parts(equipment, products, labor),
            efficiency,
            equipment_lines: vec![ResolvedEquipmentLine {
                equipment_id: "e1".to_string(),
                name: "Tractor".to_string(),
                hours: 4.0,
                hourly_rate: equipment / 4.0,
                default_rate_used: false,
                cost: equipment,
            }],
            product_lines: vec![ResolvedProductLine {
                product_id: "pr1".to_string(),
                name: "Fertilizer".to_string(),
                product_type: "fertilizer".to_string(),
                quantity: 10.0,
                unit_price: products / 10.0,
                default_price_used: false,
                cost: products,
            }],
        }
    }

    fn ctx(parcel: &str) -> ConsolidationContext {
        ConsolidationContext {
            parcel_id: parcel.to_string(),
            parcel_name: format!("Parcel {parcel}"),
            crop_id: Some("c1".to_string()),
            crop_name: Some("Winter Wheat".to_string()),
        }
    }

    #[test]
    fn test_totals_equal_sum_of_parts() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 250.0, 12.5, 100.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Treatment, 100.0, 80.0, 40.0), &ctx("p1"));

        assert!((agg.total - (agg.equipment + agg.products + agg.labor)).abs() < 1e-9);
        assert!((agg.total - 582.5).abs() < 1e-9);
        assert_eq!(agg.activity_count, 2);
        assert_eq!(agg.activities.len(), 2);
    }

    #[test]
    fn test_parcel_buckets_sum_to_grand_total() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 200.0, 50.0, 100.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Planting, 100.0, 25.0, 60.0), &ctx("p2"));
        agg.consolidate(&cost("a3", ActivityKind::Harvest, 50.0, 10.0, 100.0), &ctx("p1"));

        let bucket_sum: f64 = agg.by_parcel.values().map(|b| b.total).sum();
        assert!((bucket_sum - agg.total).abs() < 1e-9);
        assert_eq!(agg.by_parcel["p1"].activity_ids, vec!["a1", "a3"]);
        assert_eq!(agg.by_parcel["p1"].name, "Parcel p1");
    }

    #[test]
    fn test_crop_bucket_tracks_parcel_split() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 200.0, 0.0, 100.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Harvest, 100.0, 0.0, 100.0), &ctx("p2"));

        let crop = &agg.by_crop["c1"];
        assert_eq!(crop.name, "Winter Wheat");
        assert!((crop.total - 500.0).abs() < 1e-9);
        assert!((crop.parcel_costs["p1"] - 300.0).abs() < 1e-9);
        assert!((crop.parcel_costs["p2"] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_kind_and_responsible_buckets() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 200.0, 0.0, 100.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Treatment, 50.0, 30.0, 40.0), &ctx("p1"));

        assert!((agg.by_kind["harvest"] - 300.0).abs() < 1e-9);
        assert!((agg.by_kind["treatment"] - 120.0).abs() < 1e-9);

        let responsible = &agg.by_responsible["u1"];
        assert_eq!(responsible.name, "Ana");
        assert!((responsible.total - agg.total).abs() < 1e-9);
    }

    #[test]
    fn test_resource_buckets() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 200.0, 50.0, 100.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Harvest, 100.0, 25.0, 100.0), &ctx("p1"));

        assert!((agg.by_equipment["e1"].total - 300.0).abs() < 1e-9);
        assert_eq!(agg.by_equipment["e1"].activity_ids, vec!["a1", "a2"]);
        assert!((agg.by_product_type["fertilizer"].total - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_ratios() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 200.0, 0.0, 120.0), &ctx("p1"));
        agg.consolidate(&cost("a2", ActivityKind::Harvest, 100.0, 0.0, 60.0), &ctx("p1"));
        agg.finalize();

        // 480 total over 2 activities * 8h
        assert!((agg.metrics.cost_per_hour - 30.0).abs() < 1e-9);
        agg.set_area_metrics(4.0);
        assert!((agg.metrics.cost_per_area.unwrap() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_avg_efficiency() {
        let mut agg = CostAggregate::new();
        let mut a = cost("a1", ActivityKind::Harvest, 100.0, 0.0, 0.0);
        a.efficiency = 90.0;
        let mut b = cost("a2", ActivityKind::Harvest, 100.0, 0.0, 0.0);
        b.efficiency = 70.0;
        agg.consolidate(&a, &ctx("p1"));
        agg.consolidate(&b, &ctx("p1"));
        agg.finalize();
        assert!((agg.metrics.avg_efficiency - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_aggregate_finalizes_to_zero() {
        let mut agg = CostAggregate::new();
        agg.finalize();
        assert_eq!(agg.metrics.cost_per_hour, 0.0);
        assert_eq!(agg.metrics.avg_efficiency, 0.0);
        assert!(agg.metrics.cost_per_area.is_none());
        agg.set_area_metrics(0.0);
        assert!(agg.metrics.cost_per_area.is_none());
    }

    #[test]
    fn test_share_of_total() {
        let mut agg = CostAggregate::new();
        agg.consolidate(&cost("a1", ActivityKind::Harvest, 300.0, 50.0, 50.0), &ctx("p1"));
        assert!((agg.share_of_total(agg.equipment) - 0.75).abs() < 1e-9);

        let empty = CostAggregate::new();
        assert_eq!(empty.share_of_total(0.0), 0.0);
    }
}
