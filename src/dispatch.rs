//! Command dispatch
//!
//! The aggregators are driven through serializable commands: a tagged
//! `kind` plus a `payload`. Every command resolves to one JSON envelope,
//! `{"ok": true, "value": …}` on success or
//! `{"ok": false, "errorKind": …, "detail": …}` on failure, so transport
//! layers never need to understand the domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::aggregate::CostAggregate;
use crate::aggregator::cost::{CostAggregator, CostComparisonKind};
use crate::aggregator::productivity::{
    EfficiencyScope, ParcelProductivity, PerformanceComparison, PerformanceParams,
    ProductivityAggregator, TrendAnalysis,
};
use crate::aggregator::QueryOptions;
use crate::alerts::AlertRuleConfig;
use crate::models::ActivityKind;
use crate::store::Store;
use crate::AnalysisError;

/// Commands understood by the cost engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum CostCommand {
    ComputeActivityCost {
        activity_id: String,
    },
    ComputeParcelCosts {
        parcel_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    ComputeCropCosts {
        crop_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    ComputePeriodCosts {
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        #[serde(default)]
        options: QueryOptions,
    },
    ComputeCostsByKind {
        activity_kind: ActivityKind,
        #[serde(default)]
        options: QueryOptions,
    },
    ComputeCostsByResponsible {
        responsible_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    CompareCosts {
        comparison: CostComparisonKind,
        ids: Vec<String>,
        #[serde(default)]
        options: QueryOptions,
    },
    GenerateAlerts {
        aggregate: Box<CostAggregate>,
    },
    GenerateInsights {
        aggregate: Box<CostAggregate>,
    },
    ConfigureAlertRule {
        rule: AlertRuleConfig,
    },
    ClearCache,
}

/// Commands understood by the productivity engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum ProductivityCommand {
    AnalyzeParcelProductivity {
        parcel_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    AnalyzeCropProductivity {
        crop_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    AnalyzeOperationalEfficiency {
        #[serde(default)]
        scope: EfficiencyScope,
        #[serde(default)]
        options: QueryOptions,
    },
    AnalyzeTrends {
        parcel_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    ComparePerformance {
        params: PerformanceParams,
        #[serde(default)]
        options: QueryOptions,
    },
    GenerateAlerts {
        analysis: Box<ParcelProductivity>,
    },
    GenerateInsights {
        analysis: Box<ParcelProductivity>,
        trend: Option<Box<TrendAnalysis>>,
        comparison: Option<Box<PerformanceComparison>>,
    },
    ConfigureAlertRule {
        rule: AlertRuleConfig,
    },
    ClearCache,
}

fn ok_value<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(value) => json!({ "ok": true, "value": value }),
        Err(e) => err_value(&AnalysisError::InvalidInput(format!(
            "result serialization failed: {e}"
        ))),
    }
}

fn err_value(error: &AnalysisError) -> Value {
    json!({
        "ok": false,
        "errorKind": error.kind(),
        "detail": error.to_string(),
    })
}

fn envelope<T: Serialize>(result: Result<T, AnalysisError>) -> Value {
    match result {
        Ok(value) => ok_value(&value),
        Err(e) => err_value(&e),
    }
}

/// Execute one cost command against an aggregator
pub async fn handle_cost_command<S: Store>(
    aggregator: &mut CostAggregator<S>,
    command: CostCommand,
) -> Value {
    match command {
        CostCommand::ComputeActivityCost { activity_id } => {
            envelope(aggregator.cost_of_activity(&activity_id).await)
        }
        CostCommand::ComputeParcelCosts { parcel_id, options } => {
            envelope(aggregator.costs_for_parcel(&parcel_id, &options).await)
        }
        CostCommand::ComputeCropCosts { crop_id, options } => {
            envelope(aggregator.costs_for_crop(&crop_id, &options).await)
        }
        CostCommand::ComputePeriodCosts { start, end, options } => {
            envelope(aggregator.costs_for_period(start, end, &options).await)
        }
        CostCommand::ComputeCostsByKind {
            activity_kind,
            options,
        } => envelope(aggregator.costs_by_kind(activity_kind, &options).await),
        CostCommand::ComputeCostsByResponsible {
            responsible_id,
            options,
        } => envelope(
            aggregator
                .costs_by_responsible(&responsible_id, &options)
                .await,
        ),
        CostCommand::CompareCosts {
            comparison,
            ids,
            options,
        } => envelope(aggregator.compare_costs(comparison, &ids, &options).await),
        CostCommand::GenerateAlerts { aggregate } => {
            ok_value(&aggregator.check_alerts(&aggregate))
        }
        CostCommand::GenerateInsights { aggregate } => {
            ok_value(&aggregator.generate_insights(&aggregate))
        }
        CostCommand::ConfigureAlertRule { rule } => {
            envelope(aggregator.configure_alert_rule(rule))
        }
        CostCommand::ClearCache => {
            aggregator.clear_cache();
            info!("cost caches cleared");
            ok_value(&json!({ "cleared": true }))
        }
    }
}

/// Execute one productivity command against an aggregator
pub async fn handle_productivity_command<S: Store>(
    aggregator: &mut ProductivityAggregator<S>,
    command: ProductivityCommand,
) -> Value {
    match command {
        ProductivityCommand::AnalyzeParcelProductivity { parcel_id, options } => {
            envelope(aggregator.productivity_for_parcel(&parcel_id, &options).await)
        }
        ProductivityCommand::AnalyzeCropProductivity { crop_id, options } => {
            envelope(aggregator.productivity_for_crop(&crop_id, &options).await)
        }
        ProductivityCommand::AnalyzeOperationalEfficiency { scope, options } => {
            envelope(aggregator.operational_efficiency(&scope, &options).await)
        }
        ProductivityCommand::AnalyzeTrends { parcel_id, options } => {
            envelope(aggregator.trends_for_parcel(&parcel_id, &options).await)
        }
        ProductivityCommand::ComparePerformance { params, options } => {
            envelope(aggregator.compare_performance(&params, &options).await)
        }
        ProductivityCommand::GenerateAlerts { analysis } => {
            ok_value(&aggregator.check_alerts(&analysis))
        }
        ProductivityCommand::GenerateInsights {
            analysis,
            trend,
            comparison,
        } => ok_value(&aggregator.generate_insights(
            &analysis,
            trend.as_deref(),
            comparison.as_deref(),
        )),
        ProductivityCommand::ConfigureAlertRule { rule } => {
            envelope(aggregator.configure_alert_rule(rule))
        }
        ProductivityCommand::ClearCache => {
            aggregator.clear_cache();
            info!("productivity caches cleared");
            ok_value(&json!({ "cleared": true }))
        }
    }
}

/// Decode and execute a raw cost command; malformed input becomes an
/// error envelope instead of a transport failure
pub async fn dispatch_cost<S: Store>(aggregator: &mut CostAggregator<S>, raw: Value) -> Value {
    match serde_json::from_value::<CostCommand>(raw) {
        Ok(command) => handle_cost_command(aggregator, command).await,
        Err(e) => err_value(&AnalysisError::InvalidInput(format!(
            "unrecognized cost command: {e}"
        ))),
    }
}

/// Decode and execute a raw productivity command
pub async fn dispatch_productivity<S: Store>(
    aggregator: &mut ProductivityAggregator<S>,
    raw: Value,
) -> Value {
    match serde_json::from_value::<ProductivityCommand>(raw) {
        Ok(command) => handle_productivity_command(aggregator, command).await,
        Err(e) => err_value(&AnalysisError::InvalidInput(format!(
            "unrecognized productivity command: {e}"
        ))),
    }
}
