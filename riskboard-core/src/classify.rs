//! Metric classification engine
//!
//! Pure, stateless bucketing of metric names into semantic categories.
//! No I/O. The same name with the same currency priority always yields the
//! same category and sort key.
//!
//! Rules are evaluated in fixed precedence order and the first match wins:
//! Maturity > Currency > BPV > VaR > Other.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Currency ordering used when the configuration does not supply one.
pub const DEFAULT_CURRENCY_PRIORITY: &[&str] = &["USD", "EUR", "JPY", "GBP", "CHF"];

/// Semantic category of a metric name. Declaration order is precedence order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Maturity,
    Currency,
    Bpv,
    Var,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Maturity => "maturity",
            Category::Currency => "currency",
            Category::Bpv => "bpv",
            Category::Var => "var",
            Category::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Maturity => "Maturity",
            Category::Currency => "Currency",
            Category::Bpv => "BPV",
            Category::Var => "VaR",
            Category::Other => "Other",
        }
    }
}

/// Position of a metric within its category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Tenor converted to months.
    Months(f64),
    /// Index in the priority list; unlisted codes share `usize::MAX` and fall
    /// back to the code itself.
    Currency { priority: usize, code: String },
    /// Alphabetical.
    Name(String),
}

impl SortKey {
    fn rank(&self) -> u8 {
        match self {
            SortKey::Months(_) => 0,
            SortKey::Currency { .. } => 1,
            SortKey::Name(_) => 2,
        }
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Months(a), SortKey::Months(b)) => a.total_cmp(b),
            (
                SortKey::Currency {
                    priority: pa,
                    code: ca,
                },
                SortKey::Currency {
                    priority: pb,
                    code: cb,
                },
            ) => pa.cmp(pb).then_with(|| ca.cmp(cb)),
            (SortKey::Name(a), SortKey::Name(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Short human-readable rendering for text output.
    pub fn display(&self) -> String {
        match self {
            SortKey::Months(m) => format!("{}m", format_months(*m)),
            SortKey::Currency { code, .. } => code.clone(),
            SortKey::Name(n) => n.clone(),
        }
    }
}

fn format_months(months: f64) -> String {
    if months.fract() == 0.0 {
        format!("{}", months as i64)
    } else {
        format!("{:.3}", months)
    }
}

/// Category plus sort key for one metric name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricClass {
    pub category: Category,
    pub key: SortKey,
}

impl MetricClass {
    /// Category precedence first, then the key within the category.
    pub fn compare(&self, other: &MetricClass) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| self.key.compare(&other.key))
    }
}

type Predicate = fn(&Classifier, &str) -> bool;
type KeyFn = fn(&Classifier, &str) -> SortKey;

/// Ordered (predicate, category, sort-key function) table.
const RULES: &[(Predicate, Category, KeyFn)] = &[
    (is_maturity, Category::Maturity, maturity_key),
    (is_currency, Category::Currency, currency_key),
    (is_bpv, Category::Bpv, name_key),
    (is_var, Category::Var, name_key),
];

/// Classifies metric names. Holds the currency priority list only.
#[derive(Debug, Clone)]
pub struct Classifier {
    currency_priority: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier {
            currency_priority: DEFAULT_CURRENCY_PRIORITY
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl Classifier {
    pub fn new(currency_priority: &[String]) -> Self {
        Classifier {
            currency_priority: currency_priority.to_vec(),
        }
    }

    /// Classify one metric name. Total: every name gets exactly one class.
    pub fn classify(&self, name: &str) -> MetricClass {
        for (predicate, category, key_fn) in RULES {
            if predicate(self, name) {
                return MetricClass {
                    category: *category,
                    key: key_fn(self, name),
                };
            }
        }
        MetricClass {
            category: Category::Other,
            key: name_key(self, name),
        }
    }

    fn currency_priority(&self, code: &str) -> usize {
        self.currency_priority
            .iter()
            .position(|c| c.eq_ignore_ascii_case(code))
            .unwrap_or(usize::MAX)
    }
}

fn maturity_re() -> &'static Regex {
    static MATURITY_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    MATURITY_RE.get_or_init(|| Regex::new(r"(\d+)([DWMY])").unwrap())
}

fn currency_re() -> &'static Regex {
    static CURRENCY_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    CURRENCY_RE.get_or_init(|| Regex::new(r"\[([A-Z]{3})\]").unwrap())
}

/// Extract the first tenor token (`3M`, `1Y`, `2W`, `10D`) as (count, unit).
///
/// The count is read as `f64`, so an oversized tenor still counts as a
/// maturity and sorts after every realistic one.
pub fn extract_maturity(name: &str) -> Option<(f64, char)> {
    let caps = maturity_re().captures(name)?;
    let count = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps.get(2)?.as_str().chars().next()?;
    Some((count, unit))
}

/// Extract the first bracketed currency code, e.g. `USD` from `CredBpv[USD]`.
pub fn extract_currency(name: &str) -> Option<&str> {
    currency_re()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Convert a tenor to months: D = 1/30, W = 1/4, M = 1, Y = 12.
pub fn maturity_months(count: f64, unit: char) -> f64 {
    match unit {
        'Y' => count * 12.0,
        'M' => count,
        'W' => count / 4.0,
        'D' => count / 30.0,
        _ => f64::INFINITY,
    }
}

fn is_maturity(_: &Classifier, name: &str) -> bool {
    extract_maturity(name).is_some()
}

fn is_currency(_: &Classifier, name: &str) -> bool {
    extract_currency(name).is_some()
}

fn is_bpv(_: &Classifier, name: &str) -> bool {
    name.to_ascii_lowercase().contains("bpv")
}

fn is_var(_: &Classifier, name: &str) -> bool {
    name.to_ascii_lowercase().contains("var")
}

fn maturity_key(_: &Classifier, name: &str) -> SortKey {
    let months = extract_maturity(name)
        .map(|(count, unit)| maturity_months(count, unit))
        .unwrap_or(f64::INFINITY);
    SortKey::Months(months)
}

fn currency_key(classifier: &Classifier, name: &str) -> SortKey {
    let code = extract_currency(name).unwrap_or_default().to_string();
    SortKey::Currency {
        priority: classifier.currency_priority(&code),
        code,
    }
}

fn name_key(_: &Classifier, name: &str) -> SortKey {
    SortKey::Name(name.to_string())
}

/// Classification map for one run. Built once, read-only afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    classes: BTreeMap<String, MetricClass>,
}

impl Classification {
    /// Classify every distinct name. Repeated names are classified once.
    pub fn build<'a, I>(classifier: &Classifier, names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes = BTreeMap::new();
        for name in names {
            classes
                .entry(name.to_string())
                .or_insert_with(|| classifier.classify(name));
        }
        Classification { classes }
    }

    pub fn get(&self, name: &str) -> Option<&MetricClass> {
        self.classes.get(name)
    }

    pub fn category(&self, name: &str) -> Category {
        self.get(name).map(|c| c.category).unwrap_or(Category::Other)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Compare two metric names by class, then by name for a total order.
    /// Names missing from the map sort as `Other`.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        let class_order = match (self.get(a), self.get(b)) {
            (Some(ca), Some(cb)) => ca.compare(cb),
            (Some(ca), None) => ca.category.cmp(&Category::Other),
            (None, Some(cb)) => Category::Other.cmp(&cb.category),
            (None, None) => Ordering::Equal,
        };
        class_order.then_with(|| a.cmp(b))
    }

    /// Entries sorted by class, then name.
    pub fn sorted_entries(&self) -> Vec<(&str, &MetricClass)> {
        let mut entries: Vec<(&str, &MetricClass)> = self
            .classes
            .iter()
            .map(|(name, class)| (name.as_str(), class))
            .collect();
        entries.sort_by(|(na, ca), (nb, cb)| ca.compare(cb).then_with(|| na.cmp(nb)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: &str) -> MetricClass {
        Classifier::default().classify(name)
    }

    #[test]
    fn test_maturity_tokens() {
        assert_eq!(extract_maturity("CredBpv_3M"), Some((3.0, 'M')));
        assert_eq!(extract_maturity("FTQglobJapan10Y"), Some((10.0, 'Y')));
        assert_eq!(extract_maturity("CredBpv"), None);
        assert_eq!(classify("CredBpv_3M").key, SortKey::Months(3.0));
        assert_eq!(classify("CredBpv_1Y").key, SortKey::Months(12.0));
        assert_eq!(classify("FTQJapan2W").key, SortKey::Months(0.5));
    }

    #[test]
    fn test_oversized_tenor_stays_maturity() {
        let class = classify("CredBpv_99999999999M");
        assert_eq!(class.category, Category::Maturity);
        assert_eq!(class.key, SortKey::Months(99_999_999_999.0));

        let names = ["CredBpv_99999999999M", "CredBpv_30Y"];
        let classification = Classification::build(&Classifier::default(), names);
        let mut sorted = names.to_vec();
        sorted.sort_by(|a, b| classification.compare(a, b));
        assert_eq!(sorted, vec!["CredBpv_30Y", "CredBpv_99999999999M"]);
    }

    #[test]
    fn test_maturity_sorts_by_duration_not_text() {
        let names = ["CredBpv_2Y", "CredBpv_1Y", "CredBpv_3M", "CredBpv_10D"];
        let classification = Classification::build(&Classifier::default(), names);
        let mut sorted = names.to_vec();
        sorted.sort_by(|a, b| classification.compare(a, b));
        assert_eq!(
            sorted,
            vec!["CredBpv_10D", "CredBpv_3M", "CredBpv_1Y", "CredBpv_2Y"]
        );
    }

    #[test]
    fn test_currency_bracket_classification() {
        let class = classify("CredBpv[USD]");
        assert_eq!(class.category, Category::Currency);
        assert_eq!(
            class.key,
            SortKey::Currency {
                priority: 0,
                code: "USD".to_string()
            }
        );
    }

    #[test]
    fn test_currency_priority_then_alphabetical() {
        let names = ["X[AUD]", "X[JPY]", "X[CAD]", "X[USD]", "X[EUR]"];
        let classification = Classification::build(&Classifier::default(), names);
        let mut sorted = names.to_vec();
        sorted.sort_by(|a, b| classification.compare(a, b));
        assert_eq!(sorted, vec!["X[USD]", "X[EUR]", "X[JPY]", "X[AUD]", "X[CAD]"]);
    }

    #[test]
    fn test_custom_currency_priority() {
        let classifier = Classifier::new(&["JPY".to_string()]);
        let class = classifier.classify("Basis[JPY]");
        assert_eq!(
            class.key,
            SortKey::Currency {
                priority: 0,
                code: "JPY".to_string()
            }
        );
        let usd = classifier.classify("Basis[USD]");
        assert!(matches!(usd.key, SortKey::Currency { priority, .. } if priority == usize::MAX));
    }

    #[test]
    fn test_precedence_maturity_beats_currency() {
        let class = classify("BASISSensiByCurrencyByPillar[EUR][1W]");
        assert_eq!(class.category, Category::Maturity);
    }

    #[test]
    fn test_bpv_var_and_other() {
        assert_eq!(classify("CredBpv").category, Category::Bpv);
        assert_eq!(classify("VaR").category, Category::Var);
        assert_eq!(classify("SVaR").category, Category::Var);
        assert_eq!(classify("FXUSD").category, Category::Other);
        assert_eq!(classify("FXUSD").key, SortKey::Name("FXUSD".to_string()));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let names = ["CredBpv_3M", "CredBpv[USD]", "VaR", "FTQ"];
        let first = Classification::build(&Classifier::default(), names);
        let second = Classification::build(&Classifier::default(), names.iter().rev().copied());
        for name in names {
            assert_eq!(first.get(name), second.get(name));
        }
    }

    #[test]
    fn test_mixed_categories_sort_maturities_first() {
        let names = ["CredBpv[USD]", "CredBpv_1Y", "CredBpv_3M"];
        let classification = Classification::build(&Classifier::default(), names);
        let mut sorted = names.to_vec();
        sorted.sort_by(|a, b| classification.compare(a, b));
        assert_eq!(sorted, vec!["CredBpv_3M", "CredBpv_1Y", "CredBpv[USD]"]);
    }

    #[test]
    fn test_unknown_names_sort_as_other() {
        let classification = Classification::build(&Classifier::default(), ["CredBpv_3M"]);
        assert_eq!(classification.category("Unseen"), Category::Other);
        assert_eq!(
            classification.compare("CredBpv_3M", "Unseen"),
            Ordering::Less
        );
    }

    #[test]
    fn test_sorted_entries_order() {
        let classification =
            Classification::build(&Classifier::default(), ["Zeta", "VaR", "A_1Y", "Alpha"]);
        let names: Vec<&str> = classification
            .sorted_entries()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["A_1Y", "VaR", "Alpha", "Zeta"]);
        assert_eq!(SortKey::Months(0.5).display(), "0.500m");
        assert_eq!(SortKey::Months(12.0).display(), "12m");
    }
}
