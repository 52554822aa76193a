//! Metric grouper: builds display units for one node
//!
//! A display unit is a mother metric plus the related sub-metrics rendered
//! with it. Units come from the node's configuration entries first, in
//! configuration order, then one default unit per unclaimed metric in
//! discovery order.

use crate::classify::Classification;
use crate::config::{contains_ignore_case, MetricGroupConfig, PlotType, ResolvedConfig};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A mother metric, its ordered sub-metrics and the plot types to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayUnit {
    pub mother: String,
    /// Mother first (if present), then by classification.
    pub sub_metrics: Vec<String>,
    /// Sorted, no duplicates.
    pub plot_types: Vec<PlotType>,
    /// False for units created by the default one-metric rule.
    pub configured: bool,
}

impl DisplayUnit {
    /// Default unit for a single metric: bar and time series.
    pub fn single(metric: &str) -> Self {
        DisplayUnit {
            mother: metric.to_string(),
            sub_metrics: vec![metric.to_string()],
            plot_types: PlotType::ALL.to_vec(),
            configured: false,
        }
    }

    pub fn has_plot_type(&self, plot_type: PlotType) -> bool {
        self.plot_types.contains(&plot_type)
    }
}

/// Related sub-metrics of `mother` among `available`, ordered for display.
///
/// With a configured rule the rule decides membership; otherwise a metric is
/// related when it contains the mother name, ignoring case.
pub fn related_metrics(
    mother: &str,
    available: &[String],
    config: &ResolvedConfig,
    classification: &Classification,
) -> Vec<String> {
    let rule = config.rule_for(mother);
    let mut related: Vec<String> = available
        .iter()
        .filter(|metric| match rule {
            Some(rule) => rule.matches(mother, metric),
            None => contains_ignore_case(metric, mother),
        })
        .cloned()
        .collect();
    related.sort_by(|a, b| compare_within_unit(mother, a, b, classification));
    related.dedup();
    related
}

fn compare_within_unit(
    mother: &str,
    a: &str,
    b: &str,
    classification: &Classification,
) -> Ordering {
    let a_is_mother = a.eq_ignore_ascii_case(mother);
    let b_is_mother = b.eq_ignore_ascii_case(mother);
    b_is_mother
        .cmp(&a_is_mother)
        .then_with(|| classification.compare(a, b))
}

/// Build units from an explicit selection of mother metrics.
///
/// A mother listed in several entries becomes one unit, positioned at its
/// first mention, with the union of the plot types.
pub fn select_units(
    available: &[String],
    selection: &[MetricGroupConfig],
    config: &ResolvedConfig,
    classification: &Classification,
) -> Vec<DisplayUnit> {
    let mut order: Vec<String> = Vec::new();
    let mut plot_types: HashMap<String, BTreeSet<PlotType>> = HashMap::new();

    for entry in selection {
        for mother in &entry.mother_metrics {
            let types = plot_types.entry(mother.clone()).or_insert_with(|| {
                order.push(mother.clone());
                BTreeSet::new()
            });
            types.extend(entry.plot_types.iter().copied());
        }
    }

    order
        .into_iter()
        .map(|mother| {
            let types = plot_types.remove(&mother).unwrap_or_default();
            DisplayUnit {
                sub_metrics: related_metrics(&mother, available, config, classification),
                plot_types: types.into_iter().collect(),
                mother,
                configured: true,
            }
        })
        .collect()
}

/// Display units for one node.
///
/// `available` lists the node's distinct metric names in discovery order.
pub fn group_node(
    node: &str,
    available: &[String],
    config: &ResolvedConfig,
    classification: &Classification,
) -> Vec<DisplayUnit> {
    let Some(node_config) = config.node(node) else {
        return available.iter().map(|m| DisplayUnit::single(m)).collect();
    };

    let mut units = select_units(available, &node_config.groups, config, classification);

    if node_config.include_unclaimed {
        let claimed: HashSet<&str> = units
            .iter()
            .flat_map(|u| u.sub_metrics.iter().map(String::as_str))
            .collect();
        let unclaimed: Vec<DisplayUnit> = available
            .iter()
            .filter(|m| !claimed.contains(m.as_str()))
            .map(|m| DisplayUnit::single(m))
            .collect();
        units.extend(unclaimed);
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::RiskboardConfig;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn classification_for(available: &[String]) -> Classification {
        Classification::build(
            &Classifier::default(),
            available.iter().map(String::as_str),
        )
    }

    fn config_from(json: &str) -> ResolvedConfig {
        serde_json::from_str::<RiskboardConfig>(json)
            .unwrap()
            .resolve()
            .unwrap()
    }

    #[test]
    fn test_unconfigured_node_gets_one_unit_per_metric() {
        let available = names(&["VaR", "CredBpv_3M"]);
        let config = ResolvedConfig::defaults().unwrap();
        let units = group_node("N", &available, &config, &classification_for(&available));
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], DisplayUnit::single("VaR"));
        assert_eq!(units[1].sub_metrics, vec!["CredBpv_3M"]);
        assert!(units[1].has_plot_type(PlotType::Bar));
        assert!(units[1].has_plot_type(PlotType::TimeSeries));
    }

    #[test]
    fn test_related_metrics_substring_and_order() {
        let available = names(&["CredBpv[USD]", "CredBpv_1Y", "CredBpv", "CredBpv_3M", "VaR"]);
        let config = ResolvedConfig::defaults().unwrap();
        let related = related_metrics(
            "CredBpv",
            &available,
            &config,
            &classification_for(&available),
        );
        assert_eq!(
            related,
            vec!["CredBpv", "CredBpv_3M", "CredBpv_1Y", "CredBpv[USD]"]
        );
    }

    #[test]
    fn test_related_metrics_apply_exclude_rule() {
        let available = names(&["FTQ", "FTQ3M", "FTQglobJapan", "FTQglobJapan1M"]);
        let config = ResolvedConfig::defaults().unwrap();
        let related = related_metrics("FTQ", &available, &config, &classification_for(&available));
        assert_eq!(related, vec!["FTQ", "FTQ3M"]);
    }

    #[test]
    fn test_related_metrics_rule_may_reach_beyond_substring() {
        let available = names(&["VaR", "SVaR", "STTH", "IncrementalVaR"]);
        let config = ResolvedConfig::defaults().unwrap();
        let related = related_metrics("VaR", &available, &config, &classification_for(&available));
        assert_eq!(related, vec!["VaR", "SVaR", "STTH"]);
    }

    #[test]
    fn test_duplicate_mother_merges_plot_types() {
        let available = names(&["CredBpv_3M", "FXUSD"]);
        let config = config_from(
            r#"{"nodes": {"N": {"metrics_config": [
                {"mother_metrics": ["CredBpv", "FX"], "plot_types": ["bar"]},
                {"mother_metrics": ["CredBpv"], "plot_types": ["time_series"]}
            ]}}}"#,
        );
        let units = group_node("N", &available, &config, &classification_for(&available));
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].mother, "CredBpv");
        assert_eq!(
            units[0].plot_types,
            vec![PlotType::Bar, PlotType::TimeSeries]
        );
        assert_eq!(units[1].mother, "FX");
        assert_eq!(units[1].plot_types, vec![PlotType::Bar]);
        assert_eq!(units[1].sub_metrics, vec!["FXUSD"]);
    }

    #[test]
    fn test_unclaimed_metrics_get_default_units() {
        let available = names(&["CredBpv_3M", "FTQglobJapan1M", "SOVFuture"]);
        let config = config_from(
            r#"{"nodes": {"N": {"metrics_config": [
                {"mother_metrics": ["FTQ", "CredBpv"], "plot_types": ["bar"]}
            ]}}}"#,
        );
        let units = group_node("N", &available, &config, &classification_for(&available));
        let mothers: Vec<&str> = units.iter().map(|u| u.mother.as_str()).collect();
        assert_eq!(
            mothers,
            vec!["FTQ", "CredBpv", "FTQglobJapan1M", "SOVFuture"]
        );
        assert!(units[0].sub_metrics.is_empty());
        assert!(units[0].configured);
        assert!(!units[2].configured);
    }

    #[test]
    fn test_metric_rejected_by_its_own_mother_rule_gets_default_unit() {
        let available = names(&["FX", "FXUSD"]);
        let config = config_from(
            r#"{"nodes": {"N": {"metrics_config": [
                {"mother_metrics": ["FX"], "plot_types": ["bar"]}
            ]}}}"#,
        );
        let units = group_node("N", &available, &config, &classification_for(&available));
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].mother, "FX");
        assert_eq!(units[0].sub_metrics, vec!["FXUSD"]);
        assert!(units[0].configured);
        assert_eq!(units[1], DisplayUnit::single("FX"));
    }

    #[test]
    fn test_include_unclaimed_false_drops_leftovers() {
        let available = names(&["VaR", "SOVFuture"]);
        let config = config_from(
            r#"{"nodes": {"N": {"metrics_config": [
                {"mother_metrics": ["VaR"], "plot_types": ["time_series"]}
            ], "include_unclaimed": false}}}"#,
        );
        let units = group_node("N", &available, &config, &classification_for(&available));
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].plot_types, vec![PlotType::TimeSeries]);
    }

    #[test]
    fn test_other_nodes_unaffected_by_node_config() {
        let available = names(&["VaR"]);
        let config = config_from(
            r#"{"nodes": {"A": {"metrics_config": [
                {"mother_metrics": ["VaR"], "plot_types": ["time_series"]}
            ]}}}"#,
        );
        let units = group_node("B", &available, &config, &classification_for(&available));
        assert_eq!(units, vec![DisplayUnit::single("VaR")]);
    }

    #[test]
    fn test_select_units_is_pure() {
        let available = names(&["FXUSD", "FXEUR"]);
        let config = ResolvedConfig::defaults().unwrap();
        let classification = classification_for(&available);
        let selection = vec![MetricGroupConfig {
            mother_metrics: names(&["FX"]),
            plot_types: vec![PlotType::Bar],
        }];
        let first = select_units(&available, &selection, &config, &classification);
        let second = select_units(&available, &selection, &config, &classification);
        assert_eq!(first, second);
        assert_eq!(first[0].sub_metrics, vec!["FXEUR", "FXUSD"]);
    }
}
