//! Cost aggregation engine
//!
//! Computes per-activity costs by resolving resource lines against the
//! store, consolidates them into [`CostAggregate`] snapshots along every
//! dimension (parcel, crop, period, kind, responsible), compares entities,
//! and derives alerts and insights from the result. Aggregates are cached
//! per question; a `force_update` recomputes and replaces the entry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{ConsolidationContext, CostAggregate};
use crate::alerts::{Alert, AlertLevel, AlertMetric, AlertRule, AlertRuleConfig, Insight, InsightImpact};
use crate::cache::{AggregateCache, CacheKey};
use crate::compare::{input_order_summary, ComparisonItem, InputOrderSummary};
use crate::config::AnalysisConfig;
use crate::metrics::cost::{
    labor_cost, resolve_equipment_line, resolve_product_line, ActivityCost, CostBreakdown,
    ResolvedEquipmentLine, ResolvedProductLine,
};
use crate::metrics::efficiency::{operational_efficiency, YieldContext};
use crate::models::{Activity, ActivityKind, CropKind};
use crate::store::{ActivityFilter, Store};
use crate::{not_found, AnalysisError};

use super::QueryOptions;

/// What a cost comparison ranges over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostComparisonKind {
    Harvests,
    Parcels,
    Crops,
}

impl CostComparisonKind {
    fn cache_op(&self) -> &'static str {
        match self {
            Self::Harvests => "compare-harvests",
            Self::Parcels => "compare-parcels",
            Self::Crops => "compare-crops",
        }
    }
}

/// One compared entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparisonItem {
    pub id: String,
    pub name: Option<String>,
    pub total_cost: f64,
    /// EUR per hectare, when an area is known
    pub cost_per_area: Option<f64>,
    /// EUR per harvested unit; harvest comparisons only
    pub cost_per_unit: Option<f64>,
    pub harvested_quantity: Option<f64>,
    pub harvest_unit: Option<String>,
    pub area_ha: Option<f64>,
    pub activity_count: Option<usize>,
    pub date: Option<DateTime<Utc>>,
}

impl ComparisonItem for CostComparisonItem {
    fn comparison_id(&self) -> String {
        self.id.clone()
    }
    fn comparison_value(&self) -> f64 {
        self.total_cost
    }
}

/// Comparison result: the items in caller order plus summary metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    pub kind: CostComparisonKind,
    pub items: Vec<CostComparisonItem>,
    pub summary: Option<InputOrderSummary>,
}

/// Cost analysis engine over a [`Store`]
pub struct CostAggregator<S: Store> {
    store: Arc<S>,
    config: AnalysisConfig,
    cache: AggregateCache<CostAggregate>,
    compare_cache: AggregateCache<CostComparison>,
    rules: Vec<AlertRule>,
}

impl<S: Store> CostAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, AnalysisConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: AnalysisConfig) -> Self {
        Self {
            store,
            config,
            cache: AggregateCache::new(),
            compare_cache: AggregateCache::new(),
            rules: Vec::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Full cost result for one activity. Never cached: a single activity
    /// is cheap to recompute and staleness here is worse than the lookup.
    pub async fn cost_of_activity(&self, activity_id: &str) -> Result<ActivityCost, AnalysisError> {
        let activity = self
            .store
            .activity(activity_id)
            .await?
            .ok_or_else(|| not_found("activity", activity_id))?;
        self.resolved_cost(&activity).await
    }

    /// Aggregate costs over one parcel's activities
    pub async fn costs_for_parcel(
        &mut self,
        parcel_id: &str,
        opts: &QueryOptions,
    ) -> Result<CostAggregate, AnalysisError> {
        let mut key =
            CacheKey::entity("parcel-costs", parcel_id).with_filter(opts.states_signature());
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.cache.get(&key) {
                debug!(parcel_id, "serving parcel costs from cache");
                return Ok(cached.clone());
            }
        }

        let mut filter =
            ActivityFilter::for_parcel(parcel_id).with_states(opts.effective_states());
        filter.period = opts.period;
        let activities = self.store.activities(&filter).await?;

        let ctx = self.load_context(parcel_id).await?;
        let area = self.store.parcel(parcel_id).await?.map(|p| p.area_ha);

        let mut aggregate = CostAggregate::new();
        if let Some(period) = &opts.period {
            aggregate.period_start = Some(period.start);
            aggregate.period_end = Some(period.end);
        }
        for activity in &activities {
            match self.resolved_cost(activity).await {
                Ok(cost) => aggregate.consolidate(&cost, &ctx),
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping activity"),
            }
        }
        aggregate.finalize();
        if let Some(area) = area {
            aggregate.set_area_metrics(area);
        }

        self.cache.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    /// Aggregate costs over every parcel carrying one crop. The result is
    /// always a fresh accumulator holding the full activity detail; the
    /// per-parcel split lands in the crop bucket.
    pub async fn costs_for_crop(
        &mut self,
        crop_id: &str,
        opts: &QueryOptions,
    ) -> Result<CostAggregate, AnalysisError> {
        let mut key = CacheKey::entity("crop-costs", crop_id).with_filter(opts.states_signature());
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.cache.get(&key) {
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

        let mut aggregate = CostAggregate::new();
        let mut total_area = 0.0;
        for parcel in &parcels {
            total_area += parcel.area_ha;
            let parcel_aggregate = self.costs_for_parcel(&parcel.id, opts).await?;
            let ctx = ConsolidationContext {
                parcel_id: parcel.id.clone(),
                parcel_name: parcel.name.clone(),
                crop_id: Some(crop_id.to_string()),
                crop_name: Some(crop.name.clone()),
            };
            for cost in &parcel_aggregate.activities {
                aggregate.consolidate(cost, &ctx);
            }
        }
        aggregate.finalize();
        aggregate.set_area_metrics(total_area);

        self.cache.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    /// Aggregate costs over every activity overlapping a period. An absent
    /// end closes the window at now.
    pub async fn costs_for_period(
        &mut self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        opts: &QueryOptions,
    ) -> Result<CostAggregate, AnalysisError> {
        let end = end.unwrap_or_else(Utc::now);
        if start > end {
            return Err(AnalysisError::InvalidInput(format!(
                "period start {start} is after end {end}"
            )));
        }

        let key =
            CacheKey::range("period-costs", start, end).with_filter(opts.states_signature());
        if !opts.force_update {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let filter = ActivityFilter::default()
            .with_states(opts.effective_states())
            .with_period(crate::store::Period::new(start, end));
        let activities = self.store.activities(&filter).await?;

        let mut aggregate = CostAggregate::new();
        aggregate.period_start = Some(start);
        aggregate.period_end = Some(end);
        let mut contexts: HashMap<String, ConsolidationContext> = HashMap::new();
        for activity in &activities {
            let ctx = self.memoized_context(&activity.parcel_id, &mut contexts).await?;
            match self.resolved_cost(activity).await {
                Ok(cost) => aggregate.consolidate(&cost, &ctx),
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping activity"),
            }
        }
        aggregate.finalize();

        self.cache.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    /// Aggregate costs over every activity of one kind
    pub async fn costs_by_kind(
        &mut self,
        kind: ActivityKind,
        opts: &QueryOptions,
    ) -> Result<CostAggregate, AnalysisError> {
        let mut key =
            CacheKey::entity("kind-costs", kind.as_str()).with_filter(opts.states_signature());
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let mut filter = ActivityFilter::default()
            .with_states(opts.effective_states())
            .with_kind(kind);
        filter.period = opts.period;
        let activities = self.store.activities(&filter).await?;

        let mut aggregate = CostAggregate::new();
        aggregate.scope_kind = Some(kind);
        let mut contexts = HashMap::new();
        for activity in &activities {
            let ctx = self.memoized_context(&activity.parcel_id, &mut contexts).await?;
            match self.resolved_cost(activity).await {
                Ok(cost) => aggregate.consolidate(&cost, &ctx),
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping activity"),
            }
        }
        aggregate.finalize();

        self.cache.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    /// Aggregate costs over every activity owned by one responsible
    pub async fn costs_by_responsible(
        &mut self,
        responsible_id: &str,
        opts: &QueryOptions,
    ) -> Result<CostAggregate, AnalysisError> {
        let mut key = CacheKey::entity("responsible-costs", responsible_id)
            .with_filter(opts.states_signature());
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let mut filter = ActivityFilter::default().with_states(opts.effective_states());
        filter.responsible_id = Some(responsible_id.to_string());
        filter.period = opts.period;
        let activities = self.store.activities(&filter).await?;

        let mut aggregate = CostAggregate::new();
        aggregate.scope_responsible = Some(responsible_id.to_string());
        let mut contexts = HashMap::new();
        for activity in &activities {
            let ctx = self.memoized_context(&activity.parcel_id, &mut contexts).await?;
            match self.resolved_cost(activity).await {
                Ok(cost) => aggregate.consolidate(&cost, &ctx),
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping activity"),
            }
        }
        aggregate.finalize();

        self.cache.insert(key, aggregate.clone());
        Ok(aggregate)
    }

    /// Compare the costs of several entities of one kind. Item order
    /// follows the caller's id order; the summary's variation is
    /// first-vs-last over that order.
    pub async fn compare_costs(
        &mut self,
        kind: CostComparisonKind,
        ids: &[String],
        opts: &QueryOptions,
    ) -> Result<CostComparison, AnalysisError> {
        if ids.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "comparison needs at least one id".to_string(),
            ));
        }
        let mut key = CacheKey::op(kind.cache_op())
            .with_filter(format!("{}|{}", ids.join(","), opts.states_signature()));
        if let Some(period) = &opts.period {
            key = key.with_range(period.start, period.end);
        }
        if !opts.force_update {
            if let Some(cached) = self.compare_cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        let items = match kind {
            CostComparisonKind::Harvests => self.harvest_items(ids).await?,
            CostComparisonKind::Parcels => self.parcel_items(ids, opts).await?,
            CostComparisonKind::Crops => self.crop_items(ids, opts).await?,
        };
        if items.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "no comparable entities found".to_string(),
            ));
        }

        let comparison = CostComparison {
            kind,
            summary: input_order_summary(&items),
            items,
        };
        self.compare_cache.insert(key, comparison.clone());
        Ok(comparison)
    }

    /// Built-in threshold checks plus every configured rule
    pub fn check_alerts(&self, costs: &CostAggregate) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let thresholds = &self.config.alerts;

        if costs.total > thresholds.high_total_cost {
            alerts.push(Alert {
                code: "HIGH_TOTAL_COST".to_string(),
                message: format!("Total cost is high: {:.2}", costs.total),
                level: AlertLevel::High,
                suggestion: Some(
                    "Review costs by category to find reduction opportunities".to_string(),
                ),
            });
        }

        let equipment_share = costs.share_of_total(costs.equipment);
        if equipment_share > thresholds.equipment_share_max {
            alerts.push(Alert {
                code: "EQUIPMENT_COST_DISPROPORTIONATE".to_string(),
                message: format!(
                    "Equipment accounts for {:.2}% of total cost",
                    equipment_share * 100.0
                ),
                level: AlertLevel::Medium,
                suggestion: Some(
                    "Consider optimizing equipment usage or negotiating better rates".to_string(),
                ),
            });
        }

        for rule in &self.rules {
            if let Some(value) = cost_metric_value(costs, rule.metric) {
                if rule.triggers(value) {
                    alerts.push(rule.to_alert(value));
                }
            }
        }

        alerts
    }

    /// Observations about the dominant buckets of an aggregate. Ties break
    /// toward the lexicographically first key.
    pub fn generate_insights(&self, costs: &CostAggregate) -> Vec<Insight> {
        let mut insights = Vec::new();

        let mut costliest_kind: Option<(&String, f64)> = None;
        for (kind, total) in &costs.by_kind {
            if costliest_kind.map_or(true, |(_, best)| *total > best) {
                costliest_kind = Some((kind, *total));
            }
        }
        if let Some((kind, total)) = costliest_kind {
            insights.push(Insight {
                code: "COSTLIEST_ACTIVITY_KIND".to_string(),
                message: format!("The costliest activity kind was '{kind}' at {total:.2}"),
                impact: InsightImpact::High,
                action: None,
            });
        }

        let mut top_equipment: Option<(&String, f64)> = None;
        for (id, bucket) in &costs.by_equipment {
            if top_equipment.map_or(true, |(_, best)| bucket.total > best) {
                top_equipment = Some((id, bucket.total));
            }
        }
        if let Some((id, total)) = top_equipment {
            let name = costs
                .by_equipment
                .get(id)
                .map(|b| b.name.clone())
                .unwrap_or_else(|| id.clone());
            insights.push(Insight {
                code: "MOST_USED_EQUIPMENT".to_string(),
                message: format!("The most used equipment was '{name}' at {total:.2}"),
                impact: InsightImpact::Medium,
                action: None,
            });
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
        self.cache.clear();
        self.compare_cache.clear();
    }

    /// Resolve every resource line of one activity concurrently and score it
    async fn resolved_cost(&self, activity: &Activity) -> Result<ActivityCost, AnalysisError> {
        let (equipment_lines, product_lines, responsible_name, yield_context) = futures::try_join!(
            self.resolve_equipment_lines(activity),
            self.resolve_product_lines(activity),
            self.responsible_name(activity),
            self.yield_context(activity),
        )?;

        let equipment_total: f64 = equipment_lines.iter().map(|l| l.cost).sum();
        let product_total: f64 = product_lines.iter().map(|l| l.cost).sum();
        let labor = labor_cost(activity.kind, &self.config.labor, &self.config.rates);
        let breakdown = CostBreakdown::from_parts(equipment_total, product_total, labor);

        let efficiency =
            operational_efficiency(activity, breakdown.total, yield_context, &self.config);

        Ok(ActivityCost {
            activity_id: activity.id.clone(),
            kind: activity.kind,
            state: activity.state,
            started_at: activity.started_at,
            ended_at: activity.ended_at,
            responsible_id: activity.responsible_id.clone(),
            responsible_name,
            breakdown,
            efficiency,
            equipment_lines,
            product_lines,
        })
    }

    async fn resolve_equipment_lines(
        &self,
        activity: &Activity,
    ) -> Result<Vec<ResolvedEquipmentLine>, AnalysisError> {
        let lookups = activity.equipment.iter().map(|usage| async move {
            let equipment = self.store.equipment(&usage.equipment_id).await?;
            Ok::<_, AnalysisError>(resolve_equipment_line(
                usage,
                equipment.as_ref(),
                &self.config.rates,
            ))
        });
        futures::future::try_join_all(lookups).await
    }

    async fn resolve_product_lines(
        &self,
        activity: &Activity,
    ) -> Result<Vec<ResolvedProductLine>, AnalysisError> {
        let lookups = activity.products.iter().map(|usage| async move {
            let product = self.store.product(&usage.product_id).await?;
            Ok::<_, AnalysisError>(resolve_product_line(
                usage,
                product.as_ref(),
                &self.config.rates,
            ))
        });
        futures::future::try_join_all(lookups).await
    }

    async fn responsible_name(&self, activity: &Activity) -> Result<Option<String>, AnalysisError> {
        Ok(self.store.person_name(&activity.responsible_id).await?)
    }

    /// Parcel area and crop kind for yield scoring; harvests only
    async fn yield_context(&self, activity: &Activity) -> Result<Option<YieldContext>, AnalysisError> {
        if activity.kind != ActivityKind::Harvest {
            return Ok(None);
        }
        let Some(parcel) = self.store.parcel(&activity.parcel_id).await? else {
            return Ok(None);
        };
        let crop_kind = match &parcel.crop_id {
            Some(crop_id) => self
                .store
                .crop(crop_id)
                .await?
                .map(|c| c.kind)
                .unwrap_or(CropKind::Other),
            None => CropKind::Other,
        };
        Ok(Some(YieldContext {
            area_ha: parcel.area_ha,
            crop_kind,
        }))
    }

    /// Dimension labels for one parcel; lenient when the parcel reference
    /// is missing so one bad id does not sink a whole aggregation
    async fn load_context(&self, parcel_id: &str) -> Result<ConsolidationContext, AnalysisError> {
        match self.store.parcel(parcel_id).await? {
            Some(parcel) => {
                let (crop_id, crop_name) = match &parcel.crop_id {
                    Some(crop_id) => {
                        let crop = self.store.crop(crop_id).await?;
                        (Some(crop_id.clone()), crop.map(|c| c.name))
                    }
                    None => (None, None),
                };
                Ok(ConsolidationContext {
                    parcel_id: parcel.id,
                    parcel_name: parcel.name,
                    crop_id,
                    crop_name,
                })
            }
            None => Ok(ConsolidationContext {
                parcel_id: parcel_id.to_string(),
                parcel_name: format!("Parcel {parcel_id}"),
                crop_id: None,
                crop_name: None,
            }),
        }
    }

    async fn memoized_context(
        &self,
        parcel_id: &str,
        memo: &mut HashMap<String, ConsolidationContext>,
    ) -> Result<ConsolidationContext, AnalysisError> {
        if let Some(ctx) = memo.get(parcel_id) {
            return Ok(ctx.clone());
        }
        let ctx = self.load_context(parcel_id).await?;
        memo.insert(parcel_id.to_string(), ctx.clone());
        Ok(ctx)
    }

    async fn harvest_items(&self, ids: &[String]) -> Result<Vec<CostComparisonItem>, AnalysisError> {
        let filter = ActivityFilter {
            ids: Some(ids.to_vec()),
            kind: Some(ActivityKind::Harvest),
            ..Default::default()
        };
        let activities = self.store.activities(&filter).await?;

        let mut items = Vec::with_capacity(activities.len());
        for activity in &activities {
            match self.resolved_cost(activity).await {
                Ok(cost) => {
                    let ctx = self.load_context(&activity.parcel_id).await?;
                    let cost_per_unit = activity
                        .harvested_quantity
                        .filter(|q| *q > 0.0)
                        .map(|q| cost.breakdown.total / q);
                    items.push(CostComparisonItem {
                        id: activity.id.clone(),
                        name: Some(ctx.parcel_name),
                        total_cost: cost.breakdown.total,
                        cost_per_area: None,
                        cost_per_unit,
                        harvested_quantity: activity.harvested_quantity,
                        harvest_unit: activity.harvest_unit.clone(),
                        area_ha: None,
                        activity_count: None,
                        date: activity.ended_at,
                    });
                }
                Err(e) => warn!(activity_id = %activity.id, error = %e, "skipping harvest"),
            }
        }
        Ok(items)
    }

    async fn parcel_items(
        &mut self,
        ids: &[String],
        opts: &QueryOptions,
    ) -> Result<Vec<CostComparisonItem>, AnalysisError> {
        let mut items = Vec::with_capacity(ids.len());
        for parcel_id in ids {
            let aggregate = self.costs_for_parcel(parcel_id, opts).await?;
            let parcel = self.store.parcel(parcel_id).await?;
            let area_ha = parcel.as_ref().map(|p| p.area_ha);
            items.push(CostComparisonItem {
                id: parcel_id.clone(),
                name: parcel.map(|p| p.name),
                total_cost: aggregate.total,
                cost_per_area: area_ha.filter(|a| *a > 0.0).map(|a| aggregate.total / a),
                cost_per_unit: None,
                harvested_quantity: None,
                harvest_unit: None,
                area_ha,
                activity_count: Some(aggregate.activity_count),
                date: None,
            });
        }
        Ok(items)
    }

    async fn crop_items(
        &mut self,
        ids: &[String],
        opts: &QueryOptions,
    ) -> Result<Vec<CostComparisonItem>, AnalysisError> {
        let mut items = Vec::with_capacity(ids.len());
        for crop_id in ids {
            let aggregate = match self.costs_for_crop(crop_id, opts).await {
                Ok(aggregate) => aggregate,
                Err(e) => {
                    warn!(crop_id, error = %e, "skipping crop");
                    continue;
                }
            };
            let crop = self.store.crop(crop_id).await?;
            let parcels = self.store.parcels_for_crop(crop_id).await?;
            let total_area: f64 = parcels.iter().map(|p| p.area_ha).sum();
            items.push(CostComparisonItem {
                id: crop_id.clone(),
                name: crop.map(|c| c.name),
                total_cost: aggregate.total,
                cost_per_area: (total_area > 0.0).then(|| aggregate.total / total_area),
                cost_per_unit: None,
                harvested_quantity: None,
                harvest_unit: None,
                area_ha: Some(total_area),
                activity_count: Some(aggregate.activity_count),
                date: None,
            });
        }
        Ok(items)
    }
}

/// Extract the value a rule's metric refers to from a cost aggregate.
/// `None` for metrics this aggregate does not carry.
fn cost_metric_value(costs: &CostAggregate, metric: AlertMetric) -> Option<f64> {
    match metric {
        AlertMetric::TotalCost => Some(costs.total),
        AlertMetric::EquipmentShare => Some(costs.share_of_total(costs.equipment)),
        AlertMetric::ProductShare => Some(costs.share_of_total(costs.products)),
        AlertMetric::LaborShare => Some(costs.share_of_total(costs.labor)),
        AlertMetric::AverageEfficiency => Some(costs.metrics.avg_efficiency),
        AlertMetric::MeanYield | AlertMetric::ExpectedYieldRatio | AlertMetric::YieldVariation => {
            None
        }
    }
}
