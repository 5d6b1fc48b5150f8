//! Unit normalization and labor estimation
//!
//! Duration conversions assume workday conventions: 1 day = 8h, 1 week = 40h
//! (5 workdays), 1 month = 160h (20 workdays). Yield normalization converts
//! harvested quantities to kilograms before dividing by parcel area.

use crate::config::LaborBenchmarks;
use crate::models::ActivityKind;
use crate::AnalysisError;

/// Convert a duration to hours. Unknown units pass through unchanged,
/// treated as already-hours; this is a lenient default, not a validation
/// failure.
pub fn hours_from_duration(amount: f64, unit: &str) -> f64 {
    match unit.to_lowercase().as_str() {
        "minute" | "minutes" | "min" => amount / 60.0,
        "hour" | "hours" | "h" => amount,
        "day" | "days" => amount * 8.0,
        "week" | "weeks" => amount * 40.0,
        "month" | "months" => amount * 160.0,
        _ => amount,
    }
}

/// Benchmark labor hours for one activity of the given kind
pub fn estimated_labor_hours(kind: ActivityKind, benchmarks: &LaborBenchmarks) -> f64 {
    benchmarks.hours_for(kind)
}

/// Mass conversion factor to kilograms for a harvest unit.
/// "unit" is a piece-count placeholder at 0.2 kg apiece; unrecognized
/// units are treated as kilograms.
pub fn mass_factor_kg(unit: &str) -> f64 {
    match unit.to_lowercase().as_str() {
        "kg" => 1.0,
        "g" => 0.001,
        "ton" | "t" => 1000.0,
        "lb" => 0.453592,
        "oz" => 0.0283495,
        "unit" | "units" => 0.2,
        _ => 1.0,
    }
}

/// Normalize a harvested quantity to kg/ha. A non-positive area is an
/// explicit input error, never a NaN.
pub fn yield_per_area(quantity: f64, unit: &str, area_ha: f64) -> Result<f64, AnalysisError> {
    if area_ha <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "parcel area must be positive, got {area_ha}"
        )));
    }
    Ok(quantity * mass_factor_kg(unit) / area_ha)
}
