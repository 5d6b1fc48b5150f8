//! Report assembly
//!
//! A report bundles an entity's cost aggregate, its productivity analysis
//! when harvest data exists, a trend when the history supports one, and the
//! alerts and insights both engines derive from them. Missing productivity
//! data downgrades the section to `None` instead of failing the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::aggregate::CostAggregate;
use crate::aggregator::cost::CostAggregator;
use crate::aggregator::productivity::{
    CropProductivity, ParcelProductivity, ProductivityAggregator, TrendAnalysis,
};
use crate::aggregator::QueryOptions;
use crate::alerts::{Alert, Insight};
use crate::config::AnalysisConfig;
use crate::store::Store;
use crate::AnalysisError;

/// What a report covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum ReportScope {
    Parcel { id: String },
    Crop { id: String },
}

/// Assembled analysis report for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub scope: ReportScope,
    pub costs: CostAggregate,
    pub parcel_productivity: Option<ParcelProductivity>,
    pub crop_productivity: Option<CropProductivity>,
    pub trend: Option<TrendAnalysis>,
    pub alerts: Vec<Alert>,
    pub insights: Vec<Insight>,
}

/// Builds reports by driving both aggregation engines
pub struct ReportAssembler<S: Store> {
    costs: CostAggregator<S>,
    productivity: ProductivityAggregator<S>,
}

impl<S: Store> ReportAssembler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, AnalysisConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: AnalysisConfig) -> Self {
        Self {
            costs: CostAggregator::with_config(Arc::clone(&store), config.clone()),
            productivity: ProductivityAggregator::with_config(store, config),
        }
    }

    /// Full report for one parcel. Fails only when the cost side fails;
    /// absent harvest history leaves the productivity sections empty.
    pub async fn parcel_report(
        &mut self,
        parcel_id: &str,
        opts: &QueryOptions,
    ) -> Result<Report, AnalysisError> {
        let costs = self.costs.costs_for_parcel(parcel_id, opts).await?;

        let analysis = optional(
            self.productivity.productivity_for_parcel(parcel_id, opts).await,
            parcel_id,
        )?;
        let trend = optional(
            self.productivity.trends_for_parcel(parcel_id, opts).await,
            parcel_id,
        )?;

        let mut alerts = self.costs.check_alerts(&costs);
        let mut insights = self.costs.generate_insights(&costs);
        if let Some(analysis) = &analysis {
            alerts.extend(self.productivity.check_alerts(analysis));
            insights.extend(self.productivity.generate_insights(
                analysis,
                trend.as_ref(),
                None,
            ));
        }

        Ok(Report {
            generated_at: Utc::now(),
            scope: ReportScope::Parcel {
                id: parcel_id.to_string(),
            },
            costs,
            parcel_productivity: analysis,
            crop_productivity: None,
            trend,
            alerts,
            insights,
        })
    }

    /// Full report for one crop across its parcels
    pub async fn crop_report(
        &mut self,
        crop_id: &str,
        opts: &QueryOptions,
    ) -> Result<Report, AnalysisError> {
        let costs = self.costs.costs_for_crop(crop_id, opts).await?;
        let analysis = optional(
            self.productivity.productivity_for_crop(crop_id, opts).await,
            crop_id,
        )?;

        let alerts = self.costs.check_alerts(&costs);
        let insights = self.costs.generate_insights(&costs);

        Ok(Report {
            generated_at: Utc::now(),
            scope: ReportScope::Crop {
                id: crop_id.to_string(),
            },
            costs,
            parcel_productivity: None,
            crop_productivity: analysis,
            trend: None,
            alerts,
            insights,
        })
    }
}

/// Treat missing data as an absent section; propagate everything else
fn optional<T>(result: Result<T, AnalysisError>, entity: &str) -> Result<Option<T>, AnalysisError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(AnalysisError::InsufficientData(reason)) => {
            debug!(entity, reason, "section omitted");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Activity, ActivityKind, ActivityState, Crop, CropKind, Parcel,
    };
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 8, 0, 0).unwrap()
    }

    fn harvest(id: &str, parcel: &str, ended: DateTime<Utc>, quantity: f64) -> Activity {
        Activity {
            id: id.to_string(),
            kind: ActivityKind::Harvest,
            state: ActivityState::Completed,
            started_at: ended - chrono::Duration::hours(10),
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

    fn fixture() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new()
                .with_parcels(vec![
                    Parcel {
                        id: "p1".to_string(),
                        name: "North Field".to_string(),
                        area_ha: 5.0,
                        soil_type: None,
                        crop_id: Some("c1".to_string()),
                    },
                    Parcel {
                        id: "p2".to_string(),
                        name: "Fallow".to_string(),
                        area_ha: 3.0,
                        soil_type: None,
                        crop_id: Some("c1".to_string()),
                    },
                ])
                .with_crops(vec![Crop {
                    id: "c1".to_string(),
                    name: "Winter Wheat".to_string(),
                    kind: CropKind::Cereal,
                    growth_cycle_days: None,
                }])
                .with_person("u1", "Ana")
                .with_activities(vec![
                    harvest("a1", "p1", ts(2025, 6, 15), 20_000.0),
                    harvest("a2", "p1", ts(2025, 7, 15), 25_000.0),
                    harvest("a3", "p1", ts(2025, 8, 14), 30_000.0),
                ]),
        )
    }

    #[tokio::test]
    async fn test_parcel_report_with_full_history() {
        let mut assembler = ReportAssembler::new(fixture());
        let report = assembler
            .parcel_report("p1", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(report.costs.activity_count, 3);
        let productivity = report.parcel_productivity.unwrap();
        assert!((productivity.mean_yield - 5000.0).abs() < 1e-9);
        assert!(report.trend.is_some());
        assert!(report.crop_productivity.is_none());
    }

    #[tokio::test]
    async fn test_parcel_report_without_harvests_downgrades_sections() {
        let mut assembler = ReportAssembler::new(fixture());
        let report = assembler
            .parcel_report("p2", &QueryOptions::default())
            .await
            .unwrap();

        assert_eq!(report.costs.activity_count, 0);
        assert!(report.parcel_productivity.is_none());
        assert!(report.trend.is_none());
        assert!(report.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_crop_report() {
        let mut assembler = ReportAssembler::new(fixture());
        let report = assembler
            .crop_report("c1", &QueryOptions::default())
            .await
            .unwrap();

        assert!(matches!(report.scope, ReportScope::Crop { .. }));
        assert_eq!(report.costs.activity_count, 3);
        let productivity = report.crop_productivity.unwrap();
        // Only p1 contributes; Fallow has no harvests
        assert!((productivity.mean_yield - 5000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_entity_fails_report() {
        let mut assembler = ReportAssembler::new(fixture());
        let err = assembler
            .crop_report("ghost", &QueryOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }
}
