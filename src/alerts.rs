//! Alerts and insights
//!
//! Alerts flag threshold breaches over a computed aggregate; insights point
//! at the dominant buckets or notable ratios. Beyond the built-in rules,
//! callers register serializable threshold rules: a metric selector, a
//! comparator and a threshold. Rules carry no code, so they survive the
//! JSON command boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable machine-readable code, e.g. `HIGH_TOTAL_COST`
    pub code: String,
    pub message: String,
    pub level: AlertLevel,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightImpact {
    High,
    Medium,
    Positive,
    Neutral,
}

/// A derived observation about an aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub code: String,
    pub message: String,
    pub impact: InsightImpact,
    pub action: Option<String>,
}

/// Metric a configured rule evaluates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    TotalCost,
    EquipmentShare,
    ProductShare,
    LaborShare,
    AverageEfficiency,
    MeanYield,
    ExpectedYieldRatio,
    YieldVariation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Above,
    Below,
}

/// Incoming rule configuration, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    pub name: String,
    pub metric: AlertMetric,
    pub comparator: Comparator,
    pub threshold: f64,
    pub level: Option<AlertLevel>,
    pub message: String,
}

/// A validated, registered alert rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric: AlertMetric,
    pub comparator: Comparator,
    pub threshold: f64,
    pub level: AlertLevel,
    pub message: String,
    pub configured_at: DateTime<Utc>,
}

impl AlertRule {
    /// Validate and register a rule configuration
    pub fn from_config(config: AlertRuleConfig) -> Result<Self, AnalysisError> {
        if config.name.trim().is_empty() || config.message.trim().is_empty() {
            return Err(AnalysisError::InvalidInput(
                "alert rule requires a name and a message".to_string(),
            ));
        }
        if !config.threshold.is_finite() {
            return Err(AnalysisError::InvalidInput(
                "alert rule threshold must be finite".to_string(),
            ));
        }
        let configured_at = Utc::now();
        Ok(Self {
            id: configured_at.timestamp_millis().to_string(),
            name: config.name,
            metric: config.metric,
            comparator: config.comparator,
            threshold: config.threshold,
            level: config.level.unwrap_or(AlertLevel::Medium),
            message: config.message,
            configured_at,
        })
    }

    pub fn triggers(&self, value: f64) -> bool {
        match self.comparator {
            Comparator::Above => value > self.threshold,
            Comparator::Below => value < self.threshold,
        }
    }

    /// The alert this rule raises when triggered
    pub fn to_alert(&self, value: f64) -> Alert {
        Alert {
            code: format!("RULE_{}", self.name.to_uppercase().replace(' ', "_")),
            message: format!("{} (observed {:.2})", self.message, value),
            level: self.level,
            suggestion: None,
        }
    }
}
