//! Configuration file support for riskboard
//!
//! Loads the metric grouping configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.riskboardrc.json` in the working directory
//! 3. `riskboard.config.json` in the working directory
//!
//! All fields are optional. With no file, every metric gets its own display
//! unit and the built-in sub-metric rules apply.

use crate::classify::{Classifier, DEFAULT_CURRENCY_PRIORITY};
use crate::loader::parse_date;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Built-in sub-metric rules applied when the config has no `rules` table:
/// (mother metric, include pattern, exclude pattern)
const DEFAULT_RULES: &[(&str, &str, Option<&str>)] = &[
    ("VaR", r"^(VaR|SVaR|STTH)", None),
    ("FTQ", r"^FTQ(\d+[DWMY])?", Some(r"(globJapan|Japan)(\d+[DWMY])?")),
    (
        "IRSensi",
        r"^IRSensi(\d+[DWMY])?",
        Some(r"(JPY|ByCurve)(\d+[DWMY])?"),
    ),
    ("FX", r"^FX[A-Z]{3}", None),
    ("CIMSensiBOR", r"^CIMSensiBOR(\d+[DWMY])?", Some(r"(EUR)(\d+[DWMY])?")),
];

/// Chart family a display unit is rendered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    Bar,
    TimeSeries,
}

impl PlotType {
    pub const ALL: [PlotType; 2] = [PlotType::Bar, PlotType::TimeSeries];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlotType::Bar => "bar",
            PlotType::TimeSeries => "time_series",
        }
    }

    /// Badge text on dashboard cards
    pub fn label(&self) -> &'static str {
        match self {
            PlotType::Bar => "Bar Plot",
            PlotType::TimeSeries => "Time Series",
        }
    }

    /// File name suffix, e.g. `CredBpv_bar.html`
    pub fn file_suffix(&self) -> &'static str {
        match self {
            PlotType::Bar => "bar",
            PlotType::TimeSeries => "timeseries",
        }
    }
}

impl fmt::Display for PlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// riskboard configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskboardConfig {
    /// Per-node display unit configuration, keyed by stranaNodeName
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeConfig>,

    /// Sub-metric rules keyed by mother metric (default: built-in rules)
    #[serde(default)]
    pub rules: Option<BTreeMap<String, RuleConfig>>,

    /// Currency ordering for bracketed currency metrics
    #[serde(default)]
    pub currency_priority: Option<Vec<String>>,

    /// Dates marked as vertical lines on time series charts
    #[serde(default)]
    pub event_dates: Vec<String>,

    /// Dates plotted side by side in grouped bar charts
    #[serde(default)]
    pub bar_dates: Vec<String>,

    /// Also write one combined time series page per node
    #[serde(default)]
    pub grouped_time_series: bool,
}

/// Display units configured for one node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub metrics_config: Vec<MetricGroupConfig>,

    /// Give unclaimed metrics their own default unit (default: true)
    #[serde(default)]
    pub include_unclaimed: Option<bool>,
}

/// One entry of a node's `metrics_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricGroupConfig {
    pub mother_metrics: Vec<String>,
    pub plot_types: Vec<PlotType>,
}

/// Sub-metric selection rule for one mother metric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub include_pattern: Option<String>,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
}

/// Compiled sub-metric rule. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct MetricRule {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl MetricRule {
    /// Whether `metric` belongs to `mother` under this rule. Without an
    /// include pattern, membership falls back to substring containment.
    pub fn matches(&self, mother: &str, metric: &str) -> bool {
        let included = match &self.include {
            Some(re) => re.is_match(metric),
            None => contains_ignore_case(metric, mother),
        };
        let excluded = self
            .exclude
            .as_ref()
            .map(|re| re.is_match(metric))
            .unwrap_or(false);
        included && !excluded
    }

    pub fn include_pattern(&self) -> Option<&str> {
        self.include.as_ref().map(|re| re.as_str())
    }

    pub fn exclude_pattern(&self) -> Option<&str> {
        self.exclude.as_ref().map(|re| re.as_str())
    }
}

/// Case-insensitive substring containment
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Resolved node entry
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    pub groups: Vec<MetricGroupConfig>,
    pub include_unclaimed: bool,
}

/// Resolved configuration with compiled patterns and parsed dates
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub nodes: BTreeMap<String, ResolvedNode>,
    pub rules: BTreeMap<String, MetricRule>,
    pub currency_priority: Vec<String>,
    pub event_dates: Vec<NaiveDate>,
    pub bar_dates: Vec<NaiveDate>,
    pub grouped_time_series: bool,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid pattern: {}", pattern))
}

fn parse_config_dates(field: &str, values: &[String]) -> Result<Vec<NaiveDate>> {
    let mut dates = Vec::with_capacity(values.len());
    for value in values {
        match parse_date(value) {
            Some(date) => dates.push(date),
            None => anyhow::bail!("{} contains an unparseable date: {:?}", field, value),
        }
    }
    dates.sort();
    dates.dedup();
    Ok(dates)
}

impl RiskboardConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        for (node, node_config) in &self.nodes {
            if node.trim().is_empty() {
                anyhow::bail!("nodes contains a blank node name");
            }
            if node_config.metrics_config.is_empty() {
                anyhow::bail!("nodes.{}.metrics_config must not be empty", node);
            }
            for (i, group) in node_config.metrics_config.iter().enumerate() {
                if group.mother_metrics.is_empty() {
                    anyhow::bail!(
                        "nodes.{}.metrics_config[{}].mother_metrics must not be empty",
                        node,
                        i
                    );
                }
                if group.plot_types.is_empty() {
                    anyhow::bail!(
                        "nodes.{}.metrics_config[{}].plot_types must not be empty",
                        node,
                        i
                    );
                }
                if let Some(blank) = group.mother_metrics.iter().find(|m| m.trim().is_empty()) {
                    anyhow::bail!(
                        "nodes.{}.metrics_config[{}].mother_metrics contains a blank name ({:?})",
                        node,
                        i,
                        blank
                    );
                }
            }
        }

        if let Some(ref rules) = self.rules {
            for (mother, rule) in rules {
                if rule.include_pattern.is_none() && rule.exclude_pattern.is_none() {
                    anyhow::bail!(
                        "rules.{} needs an include_pattern or an exclude_pattern",
                        mother
                    );
                }
                if let Some(ref p) = rule.include_pattern {
                    compile_pattern(p)
                        .with_context(|| format!("rules.{}.include_pattern", mother))?;
                }
                if let Some(ref p) = rule.exclude_pattern {
                    compile_pattern(p)
                        .with_context(|| format!("rules.{}.exclude_pattern", mother))?;
                }
            }
        }

        if let Some(ref priority) = self.currency_priority {
            for code in priority {
                if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                    anyhow::bail!(
                        "currency_priority entries must be three uppercase letters (got {:?})",
                        code
                    );
                }
            }
        }

        parse_config_dates("event_dates", &self.event_dates)?;
        parse_config_dates("bar_dates", &self.bar_dates)?;

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let nodes = self
            .nodes
            .iter()
            .map(|(name, node)| {
                (
                    name.clone(),
                    ResolvedNode {
                        groups: node.metrics_config.clone(),
                        include_unclaimed: node.include_unclaimed.unwrap_or(true),
                    },
                )
            })
            .collect();

        let mut rules = BTreeMap::new();
        match &self.rules {
            Some(configured) => {
                for (mother, rule) in configured {
                    let include = rule.include_pattern.as_deref().map(compile_pattern);
                    let exclude = rule.exclude_pattern.as_deref().map(compile_pattern);
                    rules.insert(
                        mother.clone(),
                        MetricRule {
                            include: include.transpose()?,
                            exclude: exclude.transpose()?,
                        },
                    );
                }
            }
            None => {
                // Use built-in rules when none are specified
                for (mother, include, exclude) in DEFAULT_RULES {
                    rules.insert(
                        mother.to_string(),
                        MetricRule {
                            include: Some(compile_pattern(include)?),
                            exclude: exclude.map(compile_pattern).transpose()?,
                        },
                    );
                }
            }
        }

        let currency_priority = match &self.currency_priority {
            Some(p) => p.clone(),
            None => DEFAULT_CURRENCY_PRIORITY
                .iter()
                .map(|c| c.to_string())
                .collect(),
        };

        Ok(ResolvedConfig {
            nodes,
            rules,
            currency_priority,
            event_dates: parse_config_dates("event_dates", &self.event_dates)?,
            bar_dates: parse_config_dates("bar_dates", &self.bar_dates)?,
            grouped_time_series: self.grouped_time_series,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        RiskboardConfig::default().resolve()
    }

    /// Rule for a mother metric, if one is configured
    pub fn rule_for(&self, mother: &str) -> Option<&MetricRule> {
        self.rules.get(mother)
    }

    pub fn node(&self, name: &str) -> Option<&ResolvedNode> {
        self.nodes.get(name)
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(&self.currency_priority)
    }
}

/// Discover and load a config file from the working directory
///
/// Search order:
/// 1. `.riskboardrc.json`
/// 2. `riskboard.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(root: &Path) -> Result<Option<(RiskboardConfig, PathBuf)>> {
    for name in [".riskboardrc.json", "riskboard.config.json"] {
        let path = root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<RiskboardConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: RiskboardConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from `root`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(root)? {
            Some((config, path)) => (config, Some(path)),
            None => (RiskboardConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
