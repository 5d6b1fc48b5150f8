//! Productivity aggregation engine
//!
//! Yield analysis per parcel and per crop, operational-efficiency reports,
//! least-squares trend detection with forecasts, and ranked performance
//! comparisons. Cost figures come from an embedded [`CostAggregator`];
//! yields are normalized to kg/ha before any aggregation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::alerts::{Alert, AlertLevel, AlertMetric, AlertRule, AlertRuleConfig, Insight, InsightImpact};
use crate::cache::{AggregateCache, CacheKey};
use crate::compare::{ranked_summary, sort_descending, ComparisonItem, RankedSummary};
use crate::config::AnalysisConfig;
use crate::metrics::regression::{least_squares, std_deviation};
use crate::metrics::units::yield_per_area;
use crate::models::{Activity, ActivityKind, ActivityState, CropKind};
use crate::store::{ActivityFilter, Period, Store};
use crate::{not_found, AnalysisError};

use super::cost::CostAggregator;
use super::QueryOptions;

/// One completed harvest, normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub activity_id: String,
    pub date: DateTime<Utc>,
    pub quantity: f64,
    pub unit: String,
    pub yield_kg_per_ha: f64,
}

/// Productivity picture of one parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelProductivity {
    pub parcel_id: String,
    pub parcel_name: String,
    pub area_ha: f64,
    pub soil_type: Option<String>,
    pub crop_id: Option<String>,
    pub crop_name: Option<String>,
    pub crop_kind: Option<CropKind>,
    /// Chronologically ascending
    pub harvests: Vec<HarvestRecord>,
    pub mean_yield: f64,
    /// First-to-last harvest variation; `None` for a single harvest
    pub variation_pct: Option<f64>,
    /// Mean yield as a percentage of the crop benchmark; `None` without a crop
    pub expected_ratio_pct: Option<f64>,
}

impl ComparisonItem for ParcelProductivity {
    fn comparison_id(&self) -> String {
        self.parcel_id.clone()
    }
    fn comparison_value(&self) -> f64 {
        self.mean_yield
    }
}

/// Per-parcel contribution inside a crop analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropParcelSummary {
    pub parcel_id: String,
    pub parcel_name: String,
    pub area_ha: f64,
    pub mean_yield: f64,
    pub expected_ratio_pct: Option<f64>,
}

/// Productivity picture of one crop across its parcels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropProductivity {
    pub crop_id: String,
    pub crop_name: String,
    pub crop_kind: CropKind,
    /// Parcels that contributed harvests; harvest-less parcels are skipped
    pub parcels: Vec<CropParcelSummary>,
    pub total_area_ha: f64,
    /// Area-weighted mean over the contributing parcels
    pub mean_yield: f64,
    pub expected_ratio_pct: Option<f64>,
}

/// Scope selector for an operational-efficiency report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyScope {
    pub kind: Option<ActivityKind>,
    pub responsible_id: Option<String>,
    pub period: Option<Period>,
}

impl EfficiencyScope {
    fn signature(&self) -> String {
        format!(
            "{}-{}",
            self.kind.map(|k| k.as_str()).unwrap_or("all"),
            self.responsible_id.as_deref().unwrap_or("all"),
        )
    }
}

/// One scored activity inside an efficiency report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyEntry {
    pub activity_id: String,
    pub kind: ActivityKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub parcel_id: String,
    pub responsible_id: String,
    pub efficiency: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub mean_efficiency: f64,
    pub efficiency_std_dev: f64,
    /// Mean wall-clock hours to completion, over activities with an end date
    pub mean_completion_hours: f64,
    pub completed_count: usize,
}

/// Efficiency report over a scope. An empty scope yields an empty report,
/// not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    pub scope: EfficiencyScope,
    pub activities: Vec<EfficiencyEntry>,
    pub metrics: EfficiencyMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Ascending,
    Descending,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// 1-based harvest ordinal
    pub index: usize,
    pub yield_kg_per_ha: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub index: usize,
    pub predicted_yield: f64,
    pub predicted_date: DateTime<Utc>,
}

/// Linear trend over a parcel's harvest history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub parcel_id: String,
    pub parcel_name: String,
    pub points: Vec<TrendPoint>,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub direction: TrendDirection,
    /// |slope| relative to the mean yield, as a percentage
    pub strength_pct: f64,
    /// Three forecast periods spaced by the mean inter-harvest interval
    pub forecasts: Vec<TrendForecast>,
}

/// What a performance comparison ranges over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PerformanceParams {
    Parcels { ids: Vec<String> },
    Crops { ids: Vec<String> },
    Periods { parcel_id: String, periods: Vec<Period> },
}

impl PerformanceParams {
    fn signature(&self) -> String {
        match self {
            Self::Parcels { ids } => format!("parcels-{}", ids.join(",")),
            Self::Crops { ids } => format!("crops-{}", ids.join(",")),
            Self::Periods { parcel_id, periods } => format!(
                "periods-{parcel_id}-{}",
                periods
                    .iter()
                    .map(|p| format!("{}..{}", p.start.timestamp(), p.end.timestamp()))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

/// One ranked entity in a performance comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceItem {
    pub id: String,
    pub label: String,
    pub mean_yield: f64,
    pub expected_ratio_pct: Option<f64>,
}

impl ComparisonItem for PerformanceItem {
    fn comparison_id(&self) -> String {
        self.id.clone()
    }
    fn comparison_value(&self) -> f64 {
        self.mean_yield
    }
}

/// Ranked comparison result, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceComparison {
    pub ranking: Vec<PerformanceItem>,
    pub summary: Option<RankedSummary>,
}

/// Productivity analysis engine over a [`Store`]
pub struct ProductivityAggregator<S: Store> {
    store: Arc<S>,
    costing: CostAggregator<S>,
    config: AnalysisConfig,
    parcel_cache: AggregateCache<ParcelProductivity>,
    crop_cache: AggregateCache<CropProductivity>,
    efficiency_cache: AggregateCache<EfficiencyReport>,
    trend_cache: AggregateCache<TrendAnalysis>,
    compare_cache: AggregateCache<PerformanceComparison>,
    rules: Vec<AlertRule>,
}

impl<S: Store> ProductivityAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, AnalysisConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: AnalysisConfig) -> Self {
        let costing = CostAggregator::with_config(Arc::clone(&store), config.clone());
        Self {
            store,
            costing,
            config,
            parcel_cache: AggregateCache::new(),
            crop_cache: AggregateCache::new(),
            efficiency_cache: AggregateCache::new(),
            trend_cache: AggregateCache::new(),
            compare_cache: AggregateCache::new(),
            rules: Vec::new(),
        }
    }

    /// Yield history and derived metrics for one parcel. Only completed
    /// harvests count; activities missing a quantity or unit are skipped.
    pub async fn productivity_for_parcel(
        &mut self,
        parcel_id: &str,
        opts: &QueryOptions,
    ) -> Result<ParcelProductivity, AnalysisError> {
        let mut key = CacheKey::entity("parcel-productivity", parcel_id);
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.parcel_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let parcel = self
            .store
            .parcel(parcel_id)
            .await?
            .ok_or_else(|| not_found("parcel", parcel_id))?;
        if parcel.area_ha <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "parcel {parcel_id} has non-positive area {}",
                parcel.area_ha
            )));
        }

        let crop = match &parcel.crop_id {
            Some(crop_id) => self.store.crop(crop_id).await?,
            None => None,
        };

        let mut filter = ActivityFilter::for_parcel(parcel_id)
            .with_kind(ActivityKind::Harvest)
            .with_states(vec![ActivityState::Completed]);
        filter.period = opts.period;
        let mut activities = self.store.activities(&filter).await?;
        activities.sort_by_key(harvest_date);

        let mut harvests = Vec::new();
        for activity in &activities {
            let (Some(quantity), Some(unit)) =
                (activity.harvested_quantity, activity.harvest_unit.as_deref())
            else {
                continue;
            };
            match yield_per_area(quantity, unit, parcel.area_ha) {
                Ok(yield_kg_per_ha) => harvests.push(HarvestRecord {
                    activity_id: activity.id.clone(),
                    date: harvest_date(activity),
                    quantity,
                    unit: unit.to_string(),
                    yield_kg_per_ha,
                }),
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping harvest"),
            }
        }
        if harvests.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "no completed harvests recorded for parcel {parcel_id}"
            )));
        }

        let mean_yield =
            harvests.iter().map(|h| h.yield_kg_per_ha).sum::<f64>() / harvests.len() as f64;

        let variation_pct = if harvests.len() > 1 {
            let first = harvests[0].yield_kg_per_ha;
            let last = harvests[harvests.len() - 1].yield_kg_per_ha;
            (first != 0.0).then(|| (last - first) / first * 100.0)
        } else {
            None
        };

        let crop_kind = crop.as_ref().map(|c| c.kind);
        let expected_ratio_pct =
            crop_kind.map(|kind| mean_yield / self.config.yields.kg_per_ha(kind) * 100.0);

        let analysis = ParcelProductivity {
            parcel_id: parcel.id,
            parcel_name: parcel.name,
            area_ha: parcel.area_ha,
            soil_type: parcel.soil_type,
            crop_id: parcel.crop_id,
            crop_name: crop.as_ref().map(|c| c.name.clone()),
            crop_kind,
            harvests,
            mean_yield,
            variation_pct,
            expected_ratio_pct,
        };
        self.parcel_cache.insert(key, analysis.clone());
        Ok(analysis)
    }

    /// Area-weighted productivity of one crop across its parcels. Parcels
    /// without harvest data are skipped rather than dragging the mean down.
    pub async fn productivity_for_crop(
        &mut self,
        crop_id: &str,
        opts: &QueryOptions,
    ) -> Result<CropProductivity, AnalysisError> {
        let mut key = CacheKey::entity("crop-productivity", crop_id);
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.crop_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let crop = self
            .store
            .crop(crop_id)
            .await?
            .ok_or_else(|| not_found("crop", crop_id))?;
        let parcels = self.store.parcels_for_crop(crop_id).await?;
        if parcels.is_empty() {
            return Err(not_found("parcels for crop", crop_id));
        }

        let mut summaries = Vec::new();
        let mut weighted_sum = 0.0;
        let mut total_area = 0.0;
        for parcel in &parcels {
            match self.productivity_for_parcel(&parcel.id, opts).await {
                Ok(analysis) => {
                    weighted_sum += analysis.mean_yield * parcel.area_ha;
                    total_area += parcel.area_ha;
                    summaries.push(CropParcelSummary {
                        parcel_id: analysis.parcel_id,
                        parcel_name: analysis.parcel_name,
                        area_ha: parcel.area_ha,
                        mean_yield: analysis.mean_yield,
                        expected_ratio_pct: analysis.expected_ratio_pct,
                    });
                }
                Err(e) => warn!(parcel_id = %parcel.id, error = %e, "skipping parcel"),
            }
        }
        if total_area <= 0.0 {
            return Err(AnalysisError::InsufficientData(format!(
                "no parcel of crop {crop_id} has harvest data"
            )));
        }

        let mean_yield = weighted_sum / total_area;
        let expected_ratio_pct =
            Some(mean_yield / self.config.yields.kg_per_ha(crop.kind) * 100.0);

        let analysis = CropProductivity {
            crop_id: crop.id,
            crop_name: crop.name,
            crop_kind: crop.kind,
            parcels: summaries,
            total_area_ha: total_area,
            mean_yield,
            expected_ratio_pct,
        };
        self.crop_cache.insert(key, analysis.clone());
        Ok(analysis)
    }

    /// Efficiency report over completed activities in a scope. Activities
    /// whose cost cannot be resolved are skipped with a warning.
    pub async fn operational_efficiency(
        &mut self,
        scope: &EfficiencyScope,
        opts: &QueryOptions,
    ) -> Result<EfficiencyReport, AnalysisError> {
        let mut key = CacheKey::entity("efficiency", scope.signature());
        if let Some(period) = &scope.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.efficiency_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let mut filter = ActivityFilter::default().with_states(vec![ActivityState::Completed]);
        filter.kind = scope.kind;
        filter.responsible_id = scope.responsible_id.clone();
        filter.period = scope.period;
        let activities = self.store.activities(&filter).await?;

        let mut entries = Vec::new();
        let mut efficiencies = Vec::new();
        let mut completion_hours = Vec::new();
        for activity in &activities {
            let cost = match self.costing.cost_of_activity(&activity.id).await {
                Ok(cost) => cost,
                Err(e) => {
                    warn!(activity_id = %activity.id, error = %e, "skipping activity");
                    continue;
                }
            };
            efficiencies.push(cost.efficiency);
            if let Some(hours) = activity.elapsed_hours() {
                completion_hours.push(hours);
            }
            entries.push(EfficiencyEntry {
                activity_id: activity.id.clone(),
                kind: activity.kind,
                started_at: activity.started_at,
                ended_at: activity.ended_at,
                parcel_id: activity.parcel_id.clone(),
                responsible_id: activity.responsible_id.clone(),
                efficiency: cost.efficiency,
                total_cost: cost.breakdown.total,
            });
        }

        let metrics = EfficiencyMetrics {
            mean_efficiency: if efficiencies.is_empty() {
                0.0
            } else {
                efficiencies.iter().sum::<f64>() / efficiencies.len() as f64
            },
            efficiency_std_dev: std_deviation(&efficiencies),
            mean_completion_hours: if completion_hours.is_empty() {
                0.0
            } else {
                completion_hours.iter().sum::<f64>() / completion_hours.len() as f64
            },
            completed_count: entries.len(),
        };

        let report = EfficiencyReport {
            scope: scope.clone(),
            activities: entries,
            metrics,
        };
        self.efficiency_cache.insert(key, report.clone());
        Ok(report)
    }

    /// Least-squares trend over a parcel's harvest history, with three
    /// forecast periods. Needs at least three harvests.
    pub async fn trends_for_parcel(
        &mut self,
        parcel_id: &str,
        opts: &QueryOptions,
    ) -> Result<TrendAnalysis, AnalysisError> {
        let mut key = CacheKey::entity("trends", parcel_id);
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.trend_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let analysis = self.productivity_for_parcel(parcel_id, opts).await?;
        if analysis.harvests.len() < 3 {
            return Err(AnalysisError::InsufficientData(format!(
                "trend analysis needs at least 3 harvests, parcel {parcel_id} has {}",
                analysis.harvests.len()
            )));
        }

        let points: Vec<TrendPoint> = analysis
            .harvests
            .iter()
            .enumerate()
            .map(|(i, h)| TrendPoint {
                index: i + 1,
                yield_kg_per_ha: h.yield_kg_per_ha,
                date: h.date,
            })
            .collect();

        let series: Vec<(f64, f64)> = points
            .iter()
            .map(|p| (p.index as f64, p.yield_kg_per_ha))
            .collect();
        let fit = least_squares(&series).ok_or_else(|| {
            AnalysisError::InsufficientData("harvest series is degenerate".to_string())
        })?;

        let direction = if fit.slope > 0.0 {
            TrendDirection::Ascending
        } else if fit.slope < 0.0 {
            TrendDirection::Descending
        } else {
            TrendDirection::Stable
        };
        let strength_pct = if analysis.mean_yield > 0.0 {
            fit.slope.abs() / analysis.mean_yield * 100.0
        } else {
            0.0
        };

        let interval_days = mean_interval_days(&analysis.harvests);
        let last_date = analysis.harvests[analysis.harvests.len() - 1].date;
        let n = points.len();
        let forecasts = (1..=3)
            .map(|ahead| {
                let index = n + ahead;
                TrendForecast {
                    index,
                    predicted_yield: fit.slope * index as f64 + fit.intercept,
                    predicted_date: last_date
                        + Duration::seconds((interval_days * 86_400.0 * ahead as f64) as i64),
                }
            })
            .collect();

        let trend = TrendAnalysis {
            parcel_id: analysis.parcel_id.clone(),
            parcel_name: analysis.parcel_name.clone(),
            points,
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            direction,
            strength_pct,
            forecasts,
        };
        self.trend_cache.insert(key, trend.clone());
        Ok(trend)
    }

    /// Rank entities by mean yield, best first. Entities that fail to
    /// analyze are skipped; an empty ranking is an error. Each item is
    /// recomputed so the ranking never compares stale snapshots.
    pub async fn compare_performance(
        &mut self,
        params: &PerformanceParams,
        opts: &QueryOptions,
    ) -> Result<PerformanceComparison, AnalysisError> {
        let key = CacheKey::op("compare-performance").with_filter(params.signature());
        if !opts.force_update {
            if let Some(cached) = self.compare_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let fresh = QueryOptions::force();
        let mut items = Vec::new();
        match params {
            PerformanceParams::Parcels { ids } => {
                for id in ids {
                    match self.productivity_for_parcel(id, &fresh).await {
                        Ok(analysis) => items.push(PerformanceItem {
                            id: analysis.parcel_id.clone(),
                            label: analysis.parcel_name.clone(),
                            mean_yield: analysis.mean_yield,
                            expected_ratio_pct: analysis.expected_ratio_pct,
                        }),
                        Err(e) => warn!(parcel_id = %id, error = %e, "skipping parcel"),
                    }
                }
            }
            PerformanceParams::Crops { ids } => {
                for id in ids {
                    match self.productivity_for_crop(id, &fresh).await {
                        Ok(analysis) => items.push(PerformanceItem {
                            id: analysis.crop_id.clone(),
                            label: analysis.crop_name.clone(),
                            mean_yield: analysis.mean_yield,
                            expected_ratio_pct: analysis.expected_ratio_pct,
                        }),
                        Err(e) => warn!(crop_id = %id, error = %e, "skipping crop"),
                    }
                }
            }
            PerformanceParams::Periods { parcel_id, periods } => {
                for period in periods {
                    let windowed = QueryOptions {
                        period: Some(*period),
                        force_update: true,
                        ..Default::default()
                    };
                    match self.productivity_for_parcel(parcel_id, &windowed).await {
                        Ok(analysis) => items.push(PerformanceItem {
                            id: format!(
                                "{}..{}",
                                period.start.format("%Y-%m-%d"),
                                period.end.format("%Y-%m-%d")
                            ),
                            label: analysis.parcel_name.clone(),
                            mean_yield: analysis.mean_yield,
                            expected_ratio_pct: analysis.expected_ratio_pct,
                        }),
                        Err(e) => {
                            warn!(parcel_id = %parcel_id, error = %e, "skipping period")
                        }
                    }
                }
            }
        }
        if items.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "no comparable entities produced harvest data".to_string(),
            ));
        }

        sort_descending(&mut items);
        let comparison = PerformanceComparison {
            summary: ranked_summary(&items),
            ranking: items,
        };
        self.compare_cache.insert(key, comparison.clone());
        Ok(comparison)
    }

    /// Built-in productivity checks plus every configured rule
    pub fn check_alerts(&self, analysis: &ParcelProductivity) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let thresholds = &self.config.alerts;

        if let Some(ratio) = analysis.expected_ratio_pct {
            if ratio < thresholds.min_expected_ratio_pct {
                alerts.push(Alert {
                    code: "YIELD_BELOW_EXPECTED".to_string(),
                    message: format!("Yield is at {ratio:.2}% of the expected benchmark"),
                    level: AlertLevel::High,
                    suggestion: Some(
                        "Check soil conditions, applied treatments and cultivation practices"
                            .to_string(),
                    ),
                });
            }
        }

        if let Some(variation) = analysis.variation_pct {
            if variation < thresholds.productivity_drop_pct {
                alerts.push(Alert {
                    code: "SIGNIFICANT_YIELD_DROP".to_string(),
                    message: format!("Yield dropped {:.2}% across the harvest history", variation.abs()),
                    level: AlertLevel::Medium,
                    suggestion: Some(
                        "Review weather factors, management and the activity history".to_string(),
                    ),
                });
            }
        }

        for rule in &self.rules {
            if let Some(value) = productivity_metric_value(analysis, rule.metric) {
                if rule.triggers(value) {
                    alerts.push(rule.to_alert(value));
                }
            }
        }

        alerts
    }

    /// Positive observations over an analysis, its trend and a comparison
    pub fn generate_insights(
        &self,
        analysis: &ParcelProductivity,
        trend: Option<&TrendAnalysis>,
        comparison: Option<&PerformanceComparison>,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        let thresholds = &self.config.alerts;

        if let Some(ratio) = analysis.expected_ratio_pct {
            if ratio > thresholds.exceptional_ratio_pct {
                insights.push(Insight {
                    code: "EXCEPTIONAL_YIELD".to_string(),
                    message: format!("Yield is {ratio:.2}% of the expected benchmark"),
                    impact: InsightImpact::Positive,
                    action: Some(
                        "Consider documenting the practices used for replication".to_string(),
                    ),
                });
            }
        }

        if let Some(trend) = trend {
            if trend.direction == TrendDirection::Ascending
                && trend.strength_pct > thresholds.strong_trend_strength_pct
            {
                insights.push(Insight {
                    code: "STRONG_POSITIVE_TREND".to_string(),
                    message: "Strong positive yield trend detected".to_string(),
                    impact: InsightImpact::Positive,
                    action: Some("Maintain or intensify current practices".to_string()),
                });
            }
        }

        if let Some(comparison) = comparison {
            if let Some(summary) = &comparison.summary {
                if let Some(variation) = summary.mean_adjacent_variation_pct {
                    if variation.abs() > 20.0 {
                        insights.push(Insight {
                            code: "HIGH_VARIATION_BETWEEN_ITEMS".to_string(),
                            message: format!(
                                "Large variation ({variation:.2}%) between compared items"
                            ),
                            impact: InsightImpact::Neutral,
                            action: Some(
                                "Investigate the causes of the differences to lift every item"
                                    .to_string(),
                            ),
                        });
                    }
                }
            }
        }

        insights
    }

    /// Validate and register a threshold rule
    pub fn configure_alert_rule(
        &mut self,
        config: AlertRuleConfig,
    ) -> Result<AlertRule, AnalysisError> {
        let rule = AlertRule::from_config(config)?;
        self.rules.push(rule.clone());
        Ok(rule)
    }

    pub fn clear_cache(&mut self) {
        self.parcel_cache.clear();
        self.crop_cache.clear();
        self.efficiency_cache.clear();
        self.trend_cache.clear();
        self.compare_cache.clear();
    }
}

fn harvest_date(activity: &Activity) -> DateTime<Utc> {
    activity.ended_at.unwrap_or(activity.started_at)
}

/// Mean days between consecutive harvests; one year when there is no
/// usable spacing
fn mean_interval_days(harvests: &[HarvestRecord]) -> f64 {
    if harvests.len() < 2 {
        return 365.0;
    }
    let total: f64 = harvests
        .windows(2)
        .map(|pair| (pair[1].date - pair[0].date).num_seconds() as f64 / 86_400.0)
        .sum();
    total / (harvests.len() - 1) as f64
}

fn productivity_metric_value(analysis: &ParcelProductivity, metric: AlertMetric) -> Option<f64> {
    match metric {
        AlertMetric::MeanYield => Some(analysis.mean_yield),
        AlertMetric::ExpectedYieldRatio => analysis.expected_ratio_pct,
        AlertMetric::YieldVariation => analysis.variation_pct,
        AlertMetric::TotalCost
        | AlertMetric::EquipmentShare
        | AlertMetric::ProductShare
        | AlertMetric::LaborShare
        | AlertMetric::AverageEfficiency => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Comparator;
    use crate::models::{Crop, Parcel};
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 8, 0, 0).unwrap()
    }

    fn harvest(id: &str, parcel: &str, ended: DateTime<Utc>, quantity: f64) -> Activity {
        Activity {
            id: id.to_string(),
            kind: ActivityKind::Harvest,
            state: ActivityState::Completed,
            started_at: ended - Duration::hours(10),
            ended_at: Some(ended),
            parcel_id: parcel.to_string(),
            responsible_id: "u1".to_string(),
            equipment: vec![],
            products: vec![],
            harvested_quantity: Some(quantity),
            harvest_unit: Some("kg".to_string()),
            notes: None,
        }
    }

    fn fixture() -> Arc<crate::store::MemoryStore> {
        Arc::new(
            crate::store::MemoryStore::new()
                .with_parcels(vec![
                    Parcel {
                        id: "p1".to_string(),
                        name: "North Field".to_string(),
                        area_ha: 5.0,
                        soil_type: Some("clay".to_string()),
                        crop_id: Some("c1".to_string()),
                    },
                    Parcel {
                        id: "p2".to_string(),
                        name: "South Field".to_string(),
                        area_ha: 10.0,
                        soil_type: None,
                        crop_id: Some("c1".to_string()),
                    },
                    Parcel {
                        id: "p3".to_string(),
                        name: "Fallow".to_string(),
                        area_ha: 2.0,
                        soil_type: None,
                        crop_id: Some("c1".to_string()),
                    },
                ])
                .with_crops(vec![Crop {
                    id: "c1".to_string(),
                    name: "Winter Wheat".to_string(),
                    kind: CropKind::Cereal,
                    growth_cycle_days: Some(240),
                }])
                .with_person("u1", "Ana")
                .with_activities(vec![
                    // p1: yields 4000, 5000, 6000 kg/ha over three months
                    harvest("h1", "p1", ts(2025, 6, 15), 20_000.0),
                    harvest("h2", "p1", ts(2025, 7, 15), 25_000.0),
                    harvest("h3", "p1", ts(2025, 8, 14), 30_000.0),
                    // p2: single harvest, 3000 kg/ha
                    harvest("h4", "p2", ts(2025, 7, 1), 30_000.0),
                ]),
        )
    }

    #[tokio::test]
    async fn test_parcel_productivity_scenario() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let analysis = aggregator
            .productivity_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(analysis.harvests.len(), 3);
        assert!((analysis.harvests[0].yield_kg_per_ha - 4000.0).abs() < 1e-9);
        assert!((analysis.mean_yield - 5000.0).abs() < 1e-9);
        // (6000 - 4000) / 4000
        assert!((analysis.variation_pct.unwrap() - 50.0).abs() < 1e-9);
        // 5000 vs 5000 expected for cereal
        assert!((analysis.expected_ratio_pct.unwrap() - 100.0).abs() < 1e-9);
        assert_eq!(analysis.crop_kind, Some(CropKind::Cereal));
    }

    #[tokio::test]
    async fn test_single_harvest_has_no_variation() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let analysis = aggregator
            .productivity_for_parcel("p2", &QueryOptions::default())
            .await
            .unwrap();
        assert!((analysis.mean_yield - 3000.0).abs() < 1e-9);
        assert!(analysis.variation_pct.is_none());
    }

    #[tokio::test]
    async fn test_missing_parcel_and_empty_history() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let err = aggregator
            .productivity_for_parcel("ghost", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let err = aggregator
            .productivity_for_parcel("p3", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientData");
    }

    #[tokio::test]
    async fn test_crop_productivity_is_area_weighted() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let analysis = aggregator
            .productivity_for_crop("c1", &QueryOptions::default())
            .await
            .unwrap();

        // (5000 * 5 + 3000 * 10) / 15; the harvest-less p3 is skipped
        assert!((analysis.mean_yield - 55_000.0 / 15.0).abs() < 1e-9);
        assert_eq!(analysis.parcels.len(), 2);
        assert!((analysis.total_area_ha - 15.0).abs() < 1e-9);
        let ratio = analysis.expected_ratio_pct.unwrap();
        assert!((ratio - (55_000.0 / 15.0) / 5000.0 * 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_crop_productivity_keyed_by_period() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let june = QueryOptions {
            period: Some(Period::new(ts(2025, 6, 1), ts(2025, 6, 30))),
            ..Default::default()
        };
        let narrow = aggregator.productivity_for_crop("c1", &june).await.unwrap();
        assert!((narrow.mean_yield - 4000.0).abs() < 1e-9);
        assert_eq!(narrow.parcels.len(), 1);

        // The unwindowed call right after must not see the June snapshot
        let full = aggregator
            .productivity_for_crop("c1", &QueryOptions::default())
            .await
            .unwrap();
        assert!((full.mean_yield - 55_000.0 / 15.0).abs() < 1e-9);
        assert_eq!(full.parcels.len(), 2);
    }

    #[tokio::test]
    async fn test_efficiency_report() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let scope = EfficiencyScope {
            kind: Some(ActivityKind::Harvest),
            ..Default::default()
        };
        let report = aggregator
            .operational_efficiency(&scope, &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(report.metrics.completed_count, 4);
        assert!((report.metrics.mean_completion_hours - 10.0).abs() < 1e-9);
        assert!(report.metrics.mean_efficiency > 0.0);
        assert!(report.metrics.efficiency_std_dev >= 0.0);
    }

    #[tokio::test]
    async fn test_efficiency_report_empty_scope_is_ok() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let scope = EfficiencyScope {
            responsible_id: Some("nobody".to_string()),
            ..Default::default()
        };
        let report = aggregator
            .operational_efficiency(&scope, &QueryOptions::default())
            .await
            .unwrap();
        assert!(report.activities.is_empty());
        assert_eq!(report.metrics.mean_efficiency, 0.0);
    }

    #[tokio::test]
    async fn test_trend_analysis() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let trend = aggregator
            .trends_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();

        assert!((trend.slope - 1000.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Ascending);
        // 1000 / 5000 * 100
        assert!((trend.strength_pct - 20.0).abs() < 1e-9);
        assert!((trend.r_squared - 1.0).abs() < 1e-9);

        assert_eq!(trend.forecasts.len(), 3);
        assert!((trend.forecasts[0].predicted_yield - 7000.0).abs() < 1e-9);
        assert!((trend.forecasts[2].predicted_yield - 9000.0).abs() < 1e-9);
        // Mean interval is 30 days; first forecast lands ~30 days after h3
        let expected_date = ts(2025, 8, 14) + Duration::days(30);
        assert_eq!(trend.forecasts[0].predicted_date, expected_date);
    }

    #[tokio::test]
    async fn test_trend_keyed_by_period() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        aggregator
            .trends_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();

        // Only two harvests fall in June-July; the full-history trend
        // cached above must not answer for the window
        let early = QueryOptions {
            period: Some(Period::new(ts(2025, 6, 1), ts(2025, 7, 31))),
            ..Default::default()
        };
        let err = aggregator
            .trends_for_parcel("p1", &early)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientData");
    }

    #[tokio::test]
    async fn test_trend_needs_three_harvests() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let err = aggregator
            .trends_for_parcel("p2", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientData");
    }

    #[tokio::test]
    async fn test_compare_parcels_ranks_descending() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let params = PerformanceParams::Parcels {
            ids: vec!["p2".to_string(), "p1".to_string(), "p3".to_string()],
        };
        let comparison = aggregator
            .compare_performance(&params, &QueryOptions::default())
            .await
            .unwrap();

        // p3 has no harvests and is skipped
        assert_eq!(comparison.ranking.len(), 2);
        assert_eq!(comparison.ranking[0].id, "p1");
        let summary = comparison.summary.unwrap();
        assert_eq!(summary.best_id, "p1");
        assert_eq!(summary.worst_id, "p2");
        // One adjacent pair: (3000 - 5000) / 5000 * 100
        assert!((summary.mean_adjacent_variation_pct.unwrap() + 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_compare_periods() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let params = PerformanceParams::Periods {
            parcel_id: "p1".to_string(),
            periods: vec![
                Period::new(ts(2025, 6, 1), ts(2025, 6, 30)),
                Period::new(ts(2025, 7, 1), ts(2025, 8, 31)),
            ],
        };
        let comparison = aggregator
            .compare_performance(&params, &QueryOptions::default())
            .await
            .unwrap();

        // June: 4000; July-August: mean of 5000 and 6000
        assert_eq!(comparison.ranking.len(), 2);
        assert!((comparison.ranking[0].mean_yield - 5500.0).abs() < 1e-9);
        assert!((comparison.ranking[1].mean_yield - 4000.0).abs() < 1e-9);
        assert!(comparison.ranking[0].id.starts_with("2025-07-01"));
    }

    #[tokio::test]
    async fn test_compare_with_no_usable_entities() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let params = PerformanceParams::Parcels {
            ids: vec!["p3".to_string(), "ghost".to_string()],
        };
        let err = aggregator
            .compare_performance(&params, &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InsufficientData");
    }

    #[tokio::test]
    async fn test_productivity_alerts() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let mut analysis = aggregator
            .productivity_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();
        assert!(aggregator.check_alerts(&analysis).is_empty());

        analysis.expected_ratio_pct = Some(45.0);
        analysis.variation_pct = Some(-30.0);
        let alerts = aggregator.check_alerts(&analysis);
        let codes: Vec<_> = alerts.iter().map(|a| a.code.as_str()).collect();
        assert!(codes.contains(&"YIELD_BELOW_EXPECTED"));
        assert!(codes.contains(&"SIGNIFICANT_YIELD_DROP"));
    }

    #[tokio::test]
    async fn test_configured_productivity_rule() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        aggregator
            .configure_alert_rule(AlertRuleConfig {
                name: "yield floor".to_string(),
                metric: AlertMetric::MeanYield,
                comparator: Comparator::Below,
                threshold: 6000.0,
                level: None,
                message: "mean yield under target".to_string(),
            })
            .unwrap();

        let analysis = aggregator
            .productivity_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();
        let alerts = aggregator.check_alerts(&analysis);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].code, "RULE_YIELD_FLOOR");
    }

    #[tokio::test]
    async fn test_insights() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let mut analysis = aggregator
            .productivity_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();
        let trend = aggregator
            .trends_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();

        analysis.expected_ratio_pct = Some(130.0);
        let insights = aggregator.generate_insights(&analysis, Some(&trend), None);
        let codes: Vec<_> = insights.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"EXCEPTIONAL_YIELD"));
        assert!(codes.contains(&"STRONG_POSITIVE_TREND"));
    }

    #[tokio::test]
    async fn test_comparison_insight() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let analysis = aggregator
            .productivity_for_parcel("p1", &QueryOptions::default())
            .await
            .unwrap();
        let params = PerformanceParams::Parcels {
            ids: vec!["p1".to_string(), "p2".to_string()],
        };
        let comparison = aggregator
            .compare_performance(&params, &QueryOptions::default())
            .await
            .unwrap();

        // -40% adjacent variation exceeds the 20% magnitude threshold
        let insights = aggregator.generate_insights(&analysis, None, Some(&comparison));
        assert!(insights
            .iter()
            .any(|i| i.code == "HIGH_VARIATION_BETWEEN_ITEMS"));
    }

    #[tokio::test]
    async fn test_parcel_cache_and_force_update() {
        let mut aggregator = ProductivityAggregator::new(fixture());
        let opts = QueryOptions::default();
        let first = aggregator
            .productivity_for_parcel("p1", &opts)
            .await
            .unwrap();

        let key = CacheKey::entity("parcel-productivity", "p1");
        let mut sentinel = first.clone();
        sentinel.mean_yield = -1.0;
        aggregator.parcel_cache.insert(key, sentinel);

        let cached = aggregator
            .productivity_for_parcel("p1", &opts)
            .await
            .unwrap();
        assert_eq!(cached.mean_yield, -1.0);

        let forced = aggregator
            .productivity_for_parcel("p1", &QueryOptions::force())
            .await
            .unwrap();
        assert!((forced.mean_yield - first.mean_yield).abs() < 1e-9);

        aggregator.clear_cache();
        assert!(aggregator.parcel_cache.is_empty());
    }
}
