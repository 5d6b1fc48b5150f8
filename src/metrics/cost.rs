//! Per-activity cost computation
//!
//! A cost result is built from resolved resource lines: equipment time at an
//! hourly rate, product quantities at a unit price, and estimated labor.
//! Rate resolution is an explicit named step so the fallback path is
//! observable in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DefaultRates, LaborBenchmarks};
use crate::metrics::units::{estimated_labor_hours, hours_from_duration};
use crate::models::{ActivityKind, ActivityState, Equipment, EquipmentUsage, Product, ProductUsage};

/// Cost breakdown by category; `total` always equals the sum of the parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub equipment: f64,
    pub products: f64,
    pub labor: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn from_parts(equipment: f64, products: f64, labor: f64) -> Self {
        Self {
            equipment,
            products,
            labor,
            total: equipment + products + labor,
        }
    }

    /// Add another breakdown to this one
    pub fn add(&mut self, other: &CostBreakdown) {
        self.equipment += other.equipment;
        self.products += other.products;
        self.labor += other.labor;
        self.total += other.total;
    }
}

/// An equipment usage line with its rate resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEquipmentLine {
    pub equipment_id: String,
    pub name: String,
    pub hours: f64,
    pub hourly_rate: f64,
    /// True when the configured default rate was injected because the
    /// equipment reference was missing or carried no rate
    pub default_rate_used: bool,
    pub cost: f64,
}

/// A product usage line with its price resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProductLine {
    pub product_id: String,
    pub name: String,
    pub product_type: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub default_price_used: bool,
    pub cost: f64,
}

/// Full cost result for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityCost {
    pub activity_id: String,
    pub kind: ActivityKind,
    pub state: ActivityState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub responsible_id: String,
    pub responsible_name: Option<String>,
    pub breakdown: CostBreakdown,
    /// Operational efficiency score, 0-100 scale
    pub efficiency: f64,
    pub equipment_lines: Vec<ResolvedEquipmentLine>,
    pub product_lines: Vec<ResolvedProductLine>,
}

/// Resolve the hourly rate for an equipment reference, injecting the
/// configured default when the reference is missing or priceless
pub fn resolve_hourly_rate_or_default(
    equipment: Option<&Equipment>,
    rates: &DefaultRates,
) -> (f64, bool) {
    match equipment.and_then(|e| e.hourly_cost) {
        Some(rate) => (rate, false),
        None => (rates.equipment_hourly, true),
    }
}

/// Resolve the unit price for a product reference, injecting the configured
/// default when the reference is missing or priceless
pub fn resolve_unit_price_or_default(
    product: Option<&Product>,
    rates: &DefaultRates,
) -> (f64, bool) {
    match product.and_then(|p| p.unit_price) {
        Some(price) => (price, false),
        None => (rates.product_unit_price, true),
    }
}

/// Build a resolved equipment line from a usage record and its (possibly
/// absent) equipment reference
pub fn resolve_equipment_line(
    usage: &EquipmentUsage,
    equipment: Option<&Equipment>,
    rates: &DefaultRates,
) -> ResolvedEquipmentLine {
    let (hourly_rate, default_rate_used) = resolve_hourly_rate_or_default(equipment, rates);
    let hours = hours_from_duration(usage.time_used, &usage.time_unit);
    ResolvedEquipmentLine {
        equipment_id: usage.equipment_id.clone(),
        name: equipment
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("Equipment {}", usage.equipment_id)),
        hours,
        hourly_rate,
        default_rate_used,
        cost: hours * hourly_rate,
    }
}

/// Build a resolved product line from a usage record and its (possibly
/// absent) product reference
pub fn resolve_product_line(
    usage: &ProductUsage,
    product: Option<&Product>,
    rates: &DefaultRates,
) -> ResolvedProductLine {
    let (unit_price, default_price_used) = resolve_unit_price_or_default(product, rates);
    ResolvedProductLine {
        product_id: usage.product_id.clone(),
        name: product
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Product {}", usage.product_id)),
        product_type: product
            .and_then(|p| p.product_type.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        quantity: usage.quantity,
        unit_price,
        default_price_used,
        cost: usage.quantity * unit_price,
    }
}

/// Estimated labor cost for one activity of the given kind
pub fn labor_cost(kind: ActivityKind, benchmarks: &LaborBenchmarks, rates: &DefaultRates) -> f64 {
    estimated_labor_hours(kind, benchmarks) * rates.labor_hourly
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equipment(rate: Option<f64>) -> Equipment {
        Equipment {
            id: "e1".to_string(),
            name: "Tractor".to_string(),
            equipment_type: Some("tractor".to_string()),
            hourly_cost: rate,
        }
    }

    #[test]
    fn test_breakdown_sum_invariant() {
        let b = CostBreakdown::from_parts(250.0, 12.5, 100.0);
        assert!((b.total - (b.equipment + b.products + b.labor)).abs() < 1e-9);
        assert!((b.total - 362.5).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_add_preserves_invariant() {
        let mut a = CostBreakdown::from_parts(100.0, 50.0, 25.0);
        let b = CostBreakdown::from_parts(10.0, 5.0, 2.5);
        a.add(&b);
        assert!((a.total - (a.equipment + a.products + a.labor)).abs() < 1e-9);
        assert!((a.total - 192.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_resolution_prefers_entity_rate() {
        let rates = DefaultRates::default();
        let eq = equipment(Some(25.0));
        let (rate, used_default) = resolve_hourly_rate_or_default(Some(&eq), &rates);
        assert!((rate - 25.0).abs() < 1e-9);
        assert!(!used_default);
    }

    #[test]
    fn test_rate_resolution_falls_back_to_default() {
        let rates = DefaultRates::default();

        // Missing reference
        let (rate, used_default) = resolve_hourly_rate_or_default(None, &rates);
        assert!((rate - 50.0).abs() < 1e-9);
        assert!(used_default);

        // Reference present but priceless
        let eq = equipment(None);
        let (rate, used_default) = resolve_hourly_rate_or_default(Some(&eq), &rates);
        assert!((rate - 50.0).abs() < 1e-9);
        assert!(used_default);
    }

    #[test]
    fn test_resolve_equipment_line_converts_units() {
        let rates = DefaultRates::default();
        let usage = EquipmentUsage {
            equipment_id: "e1".to_string(),
            time_used: 2.0,
            time_unit: "day".to_string(),
        };
        let line = resolve_equipment_line(&usage, Some(&equipment(Some(25.0))), &rates);
        assert!((line.hours - 16.0).abs() < 1e-9);
        assert!((line.cost - 400.0).abs() < 1e-9);
        assert_eq!(line.name, "Tractor");
    }

    #[test]
    fn test_resolve_product_line_with_default_price() {
        let rates = DefaultRates::default();
        let usage = ProductUsage {
            product_id: "prod-9".to_string(),
            quantity: 3.0,
            unit: "l".to_string(),
        };
        let line = resolve_product_line(&usage, None, &rates);
        assert!(line.default_price_used);
        assert!((line.cost - 15.0).abs() < 1e-9);
        assert_eq!(line.product_type, "unknown");
        assert_eq!(line.name, "Product prod-9");
    }

    #[test]
    fn test_labor_cost_by_kind() {
        let bench = LaborBenchmarks::default();
        let rates = DefaultRates::default();
        // harvest: 10h * 10 EUR/h
        assert!((labor_cost(ActivityKind::Harvest, &bench, &rates) - 100.0).abs() < 1e-9);
        // treatment: 4h * 10 EUR/h
        assert!((labor_cost(ActivityKind::Treatment, &bench, &rates) - 40.0).abs() < 1e-9);
    }
}
