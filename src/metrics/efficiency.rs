//! Operational efficiency scoring
//!
//! One weighted blend on a 0-100 scale:
//! - time efficiency: estimated hours vs. actual elapsed hours
//! - cost efficiency: actual cost vs. a benchmark hourly cost
//! - yield efficiency: actual vs. expected productivity, harvests only
//!
//! Weights and benchmarks come from [`crate::config::AnalysisConfig`];
//! nothing here is hardcoded.

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::metrics::units::{estimated_labor_hours, yield_per_area};
use crate::models::{Activity, ActivityKind, CropKind};

/// Parcel/crop context needed to score yield efficiency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YieldContext {
    pub area_ha: f64,
    pub crop_kind: CropKind,
}

/// Score one activity. `yield_context` is only consulted for harvest
/// activities; without it (or for non-harvest kinds) the yield component
/// scores a neutral 100.
pub fn operational_efficiency(
    activity: &Activity,
    total_cost: f64,
    yield_context: Option<YieldContext>,
    cfg: &AnalysisConfig,
) -> f64 {
    let estimated = estimated_labor_hours(activity.kind, &cfg.labor);

    let time_score = match activity.elapsed_hours() {
        Some(actual) if actual > 0.0 => (estimated / actual) * 100.0,
        _ => cfg.efficiency.open_ended_time_score,
    };

    let benchmark_cost = estimated * cfg.efficiency.benchmark_hourly_cost;
    let cost_score = (1.0 - total_cost / benchmark_cost) * 100.0;

    let yield_score = yield_efficiency(activity, yield_context, cfg);

    time_score * cfg.efficiency.time_weight
        + cost_score * cfg.efficiency.cost_weight
        + yield_score * cfg.efficiency.yield_weight
}

fn yield_efficiency(
    activity: &Activity,
    yield_context: Option<YieldContext>,
    cfg: &AnalysisConfig,
) -> f64 {
    if activity.kind != ActivityKind::Harvest {
        return 100.0;
    }
    let (Some(ctx), Some(quantity), Some(unit)) = (
        yield_context,
        activity.harvested_quantity,
        activity.harvest_unit.as_deref(),
    ) else {
        return 100.0;
    };
    match yield_per_area(quantity, unit, ctx.area_ha) {
        Ok(actual) => (actual / cfg.yields.kg_per_ha(ctx.crop_kind)) * 100.0,
        Err(_) => 100.0,
    }
}
