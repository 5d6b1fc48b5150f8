//! Comparison summaries over aggregated results
//!
//! Two deliberately distinct variation semantics share this module:
//!
//! - [`input_order_summary`] keeps the caller's item order and reports the
//!   percent variation between the first and last item as given. Cost
//!   comparisons use this: the caller's ordering is part of the question.
//! - [`ranked_summary`] expects items sorted descending and reports the
//!   mean of adjacent pairwise variations. Performance comparisons use
//!   this ranking view.
//!
//! They are not interchangeable and must not be unified.

use serde::{Deserialize, Serialize};

/// Anything with an identity and a comparable scalar
pub trait ComparisonItem {
    fn comparison_id(&self) -> String;
    fn comparison_value(&self) -> f64;
}

/// Extremes and spread over items in caller-supplied order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOrderSummary {
    pub lowest_id: String,
    pub lowest_value: f64,
    pub highest_id: String,
    pub highest_value: f64,
    pub mean: f64,
    /// (last - first) / first * 100 over the input order; `None` for a
    /// single item
    pub first_to_last_variation_pct: Option<f64>,
}

/// Summarize items without reordering them. `None` for an empty slice.
pub fn input_order_summary<T: ComparisonItem>(items: &[T]) -> Option<InputOrderSummary> {
    let first = items.first()?;
    let mut lowest = first;
    let mut highest = first;
    let mut sum = 0.0;

    for item in items {
        if item.comparison_value() < lowest.comparison_value() {
            lowest = item;
        }
        if item.comparison_value() > highest.comparison_value() {
            highest = item;
        }
        sum += item.comparison_value();
    }

    let variation = if items.len() > 1 {
        let first_value = first.comparison_value();
        let last_value = items[items.len() - 1].comparison_value();
        if first_value != 0.0 {
            Some((last_value - first_value) / first_value * 100.0)
        } else {
            None
        }
    } else {
        None
    };

    Some(InputOrderSummary {
        lowest_id: lowest.comparison_id(),
        lowest_value: lowest.comparison_value(),
        highest_id: highest.comparison_id(),
        highest_value: highest.comparison_value(),
        mean: sum / items.len() as f64,
        first_to_last_variation_pct: variation,
    })
}

/// Best/worst and mean adjacent variation over a descending ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSummary {
    pub best_id: String,
    pub best_value: f64,
    pub worst_id: String,
    pub worst_value: f64,
    pub mean: f64,
    /// Mean of ((item[i] - item[i-1]) / item[i-1] * 100) over adjacent
    /// ranked pairs; `None` for a single item
    pub mean_adjacent_variation_pct: Option<f64>,
}

/// Sort items descending by their comparison scalar
pub fn sort_descending<T: ComparisonItem>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.comparison_value()
            .partial_cmp(&a.comparison_value())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Summarize an already-descending ranking. `None` for an empty slice.
pub fn ranked_summary<T: ComparisonItem>(ranked: &[T]) -> Option<RankedSummary> {
    let best = ranked.first()?;
    let worst = ranked.last()?;
    let mean = ranked.iter().map(|i| i.comparison_value()).sum::<f64>() / ranked.len() as f64;

    let variation = if ranked.len() > 1 {
        let mut variations = Vec::with_capacity(ranked.len() - 1);
        for pair in ranked.windows(2) {
            let prev = pair[0].comparison_value();
            if prev != 0.0 {
                variations.push((pair[1].comparison_value() - prev) / prev * 100.0);
            }
        }
        if variations.is_empty() {
            None
        } else {
            Some(variations.iter().sum::<f64>() / variations.len() as f64)
        }
    } else {
        None
    };

    Some(RankedSummary {
        best_id: best.comparison_id(),
        best_value: best.comparison_value(),
        worst_id: worst.comparison_id(),
        worst_value: worst.comparison_value(),
        mean,
        mean_adjacent_variation_pct: variation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(&'static str, f64);

    impl ComparisonItem for Item {
        fn comparison_id(&self) -> String {
            self.0.to_string()
        }
        fn comparison_value(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_input_order_variation_is_first_vs_last() {
        // Totals [100, 300, 200]: variation must be (200-100)/100 = 100%,
        // not the min-vs-max 200%.
        let items = vec![Item("A", 100.0), Item("B", 300.0), Item("C", 200.0)];
        let summary = input_order_summary(&items).unwrap();
        assert_eq!(summary.lowest_id, "A");
        assert_eq!(summary.highest_id, "B");
        assert!((summary.mean - 200.0).abs() < 1e-9);
        assert!((summary.first_to_last_variation_pct.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_input_order_single_item() {
        let items = vec![Item("A", 42.0)];
        let summary = input_order_summary(&items).unwrap();
        assert_eq!(summary.lowest_id, "A");
        assert_eq!(summary.highest_id, "A");
        assert!(summary.first_to_last_variation_pct.is_none());
    }

    #[test]
    fn test_input_order_empty() {
        let items: Vec<Item> = vec![];
        assert!(input_order_summary(&items).is_none());
    }

    #[test]
    fn test_sort_descending() {
        let mut items = vec![Item("A", 1.0), Item("B", 3.0), Item("C", 2.0)];
        sort_descending(&mut items);
        let ids: Vec<_> = items.iter().map(|i| i.0).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_ranked_summary_adjacent_variation() {
        // Descending ranking [4000, 3000, 2000]:
        // variations are -25% and -33.33%; mean ~ -29.17%
        let ranked = vec![Item("B", 4000.0), Item("C", 3000.0), Item("A", 2000.0)];
        let summary = ranked_summary(&ranked).unwrap();
        assert_eq!(summary.best_id, "B");
        assert_eq!(summary.worst_id, "A");
        assert!((summary.mean - 3000.0).abs() < 1e-9);
        let expected = (-25.0 + (-1000.0 / 3000.0 * 100.0)) / 2.0;
        assert!((summary.mean_adjacent_variation_pct.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ranked_summary_single_item() {
        let ranked = vec![Item("A", 5.0)];
        let summary = ranked_summary(&ranked).unwrap();
        assert!(summary.mean_adjacent_variation_pct.is_none());
        assert_eq!(summary.best_id, summary.worst_id);
    }

    #[test]
    fn test_two_semantics_differ_on_same_data() {
        // The same three values produce different variation figures under
        // the two summaries; this divergence is intentional.
        let mut items = vec![Item("A", 100.0), Item("B", 300.0), Item("C", 200.0)];
        let input_order = input_order_summary(&items).unwrap();
        sort_descending(&mut items);
        let ranked = ranked_summary(&items).unwrap();

        assert!((input_order.first_to_last_variation_pct.unwrap() - 100.0).abs() < 1e-9);
        // Ranked: 300 -> 200 (-33.33%), 200 -> 100 (-50%): mean -41.67%
        let expected = ((-100.0 / 300.0 * 100.0) + -50.0) / 2.0;
        assert!((ranked.mean_adjacent_variation_pct.unwrap() - expected).abs() < 1e-9);
    }
}
