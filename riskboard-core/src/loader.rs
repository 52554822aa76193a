//! CSV loading and normalization
//!
//! Turns the flat risk-metric export into [`Observation`]s.
//!
//! - Missing required columns are fatal (`ReportError::DataFormat`) and are
//!   detected from the header before any row is read.
//! - A bad value in a required field drops that row; a bad value in an
//!   optional limit field is coerced to `None` and the row is kept. Both are
//!   recorded as [`RowIssue`]s.
//! - Output order is file order, so identical input yields identical output.

use crate::error::{ReportError, ReportResult, RowIssue};
use chrono::NaiveDate;
use csv::StringRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns that must be present in the header row.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "limId",
    "rmRiskIndicator",
    "rmRiskMetricName",
    "stranaNodeName",
    "consoValue",
    "Date",
    "consoMreMetricName",
];

/// Older exports name the date column `consoValueDate`.
const DATE_COLUMN_ALIASES: &[&str] = &["Date", "consoValueDate"];

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// One row of the input table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub limit_id: i64,
    pub risk_indicator: String,
    /// `rmRiskMetricName`; the key used for classification and grouping.
    pub metric: String,
    pub node: String,
    pub value: f64,
    pub date: NaiveDate,
    /// `consoMreMetricName`; falls back to `metric` when blank.
    pub consolidated_metric: String,
    pub lim_max: Option<f64>,
    pub lim_min: Option<f64>,
}

/// Loader output: observations plus everything that went wrong on the way.
#[derive(Debug, Clone, Default)]
pub struct LoadedData {
    pub observations: Vec<Observation>,
    pub row_issues: Vec<RowIssue>,
    pub rows_read: usize,
    /// Rows whose (node, metric, date) key was already seen.
    pub duplicate_keys: usize,
}

impl LoadedData {
    /// Number of rows dropped because a required field failed to parse.
    pub fn rows_dropped(&self) -> usize {
        self.row_issues.iter().filter(|i| i.dropped).count()
    }

    /// Distinct node names, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let nodes: BTreeSet<&str> = self.observations.iter().map(|o| o.node.as_str()).collect();
        nodes.into_iter().map(str::to_string).collect()
    }

    /// Distinct metric names across all nodes, in first-seen order.
    pub fn metric_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.observations
            .iter()
            .filter(|o| seen.insert(o.metric.as_str()))
            .map(|o| o.metric.clone())
            .collect()
    }

    /// Observations grouped by node, each group in file order.
    pub fn by_node(&self) -> BTreeMap<&str, Vec<&Observation>> {
        let mut groups: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
        for obs in &self.observations {
            groups.entry(obs.node.as_str()).or_default().push(obs);
        }
        groups
    }
}

/// Resolved column indices for one file.
struct Columns {
    limit_id: usize,
    indicator: usize,
    metric: usize,
    node: usize,
    value: usize,
    date: usize,
    consolidated: usize,
    lim_max: Option<usize>,
    lim_min: Option<usize>,
}

/// Load observations from a CSV file on disk.
pub fn load_observations(path: &Path) -> ReportResult<LoadedData> {
    info!(path = %path.display(), "loading observations");
    let file = File::open(path)
        .map_err(|e| ReportError::data_format(path, format!("failed to open CSV: {}", e)))?;
    load_from_reader(file, path)
}

/// Load observations from any reader. `source` is only used in error messages.
pub fn load_from_reader<R: Read>(reader: R, source: &Path) -> ReportResult<LoadedData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| ReportError::data_format(source, format!("failed to read header: {}", e)))?
        .clone();
    let columns = resolve_columns(&headers, source)?;

    let mut data = LoadedData::default();
    let mut seen_keys: HashSet<(String, String, NaiveDate)> = HashSet::new();

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, which is line 1
        let line = idx + 2;
        data.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                data.row_issues.push(RowIssue {
                    line,
                    field: "*".to_string(),
                    message: format!("CSV parse error: {}", e),
                    dropped: true,
                });
                continue;
            }
        };

        match parse_row(&record, &columns, line, &mut data.row_issues) {
            Ok(obs) => {
                if !seen_keys.insert((obs.node.clone(), obs.metric.clone(), obs.date)) {
                    data.duplicate_keys += 1;
                    debug!(line, node = %obs.node, metric = %obs.metric, "duplicate observation key");
                }
                data.observations.push(obs);
            }
            Err(issue) => data.row_issues.push(issue),
        }
    }

    if data.duplicate_keys > 0 {
        warn!(
            count = data.duplicate_keys,
            "duplicate (node, metric, date) rows found; last value wins"
        );
    }
    let dropped = data.rows_dropped();
    if dropped > 0 {
        warn!(count = dropped, "rows dropped due to unparseable required fields");
    }
    info!(
        rows = data.rows_read,
        kept = data.observations.len(),
        "observations loaded"
    );

    Ok(data)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a BOM
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn resolve_columns(headers: &StringRecord, source: &Path) -> ReportResult<Columns> {
    let header_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect();
    let lookup = |name: &str| header_map.get(&name.to_ascii_lowercase()).copied();

    let date = DATE_COLUMN_ALIASES.iter().find_map(|&alias| lookup(alias));

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|&name| {
            if name == "Date" {
                date.is_none()
            } else {
                lookup(name).is_none()
            }
        })
        .collect();
    if !missing.is_empty() {
        return Err(ReportError::data_format(
            source,
            format!("missing required columns: {}", missing.join(", ")),
        ));
    }

    let required = |name: &str| {
        lookup(name).ok_or_else(|| {
            ReportError::data_format(source, format!("missing required column: {}", name))
        })
    };

    Ok(Columns {
        limit_id: required("limId")?,
        indicator: required("rmRiskIndicator")?,
        metric: required("rmRiskMetricName")?,
        node: required("stranaNodeName")?,
        value: required("consoValue")?,
        date: date.ok_or_else(|| ReportError::data_format(source, "missing required column: Date"))?,
        consolidated: required("consoMreMetricName")?,
        lim_max: lookup("limMaxValue"),
        lim_min: lookup("limMinValue"),
    })
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn dropped(line: usize, field: &str, message: String) -> RowIssue {
    RowIssue {
        line,
        field: field.to_string(),
        message,
        dropped: true,
    }
}

fn parse_row(
    record: &StringRecord,
    columns: &Columns,
    line: usize,
    issues: &mut Vec<RowIssue>,
) -> Result<Observation, RowIssue> {
    let raw_limit_id = field(record, columns.limit_id);
    let limit_id = parse_integer(raw_limit_id)
        .ok_or_else(|| dropped(line, "limId", format!("invalid integer '{}'", raw_limit_id)))?;

    let metric = field(record, columns.metric);
    if metric.is_empty() {
        return Err(dropped(line, "rmRiskMetricName", "blank metric name".to_string()));
    }

    let node = field(record, columns.node);
    if node.is_empty() {
        return Err(dropped(line, "stranaNodeName", "blank node name".to_string()));
    }

    let raw_value = field(record, columns.value);
    let value = parse_finite(raw_value)
        .ok_or_else(|| dropped(line, "consoValue", format!("invalid number '{}'", raw_value)))?;

    let raw_date = field(record, columns.date);
    let date = parse_date(raw_date)
        .ok_or_else(|| dropped(line, "Date", format!("invalid date '{}'", raw_date)))?;

    let consolidated = match field(record, columns.consolidated) {
        "" => metric,
        name => name,
    };

    let lim_max = parse_optional_limit(record, columns.lim_max, line, "limMaxValue", issues);
    let lim_min = parse_optional_limit(record, columns.lim_min, line, "limMinValue", issues);

    Ok(Observation {
        limit_id,
        risk_indicator: field(record, columns.indicator).to_string(),
        metric: metric.to_string(),
        node: node.to_string(),
        value,
        date,
        consolidated_metric: consolidated.to_string(),
        lim_max,
        lim_min,
    })
}

/// Blank means absent; garbage is coerced to absent and reported.
fn parse_optional_limit(
    record: &StringRecord,
    idx: Option<usize>,
    line: usize,
    name: &str,
    issues: &mut Vec<RowIssue>,
) -> Option<f64> {
    let raw = field(record, idx?);
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return None;
    }
    let parsed = parse_finite(raw);
    if parsed.is_none() {
        issues.push(RowIssue {
            line,
            field: name.to_string(),
            message: format!("invalid number '{}' treated as missing", raw),
            dropped: false,
        });
    }
    parsed
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integers may arrive as `523412` or, from float-typed exports, `523412.0`.
fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let v = parse_finite(raw)?;
    (v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}

/// Parse `MM/DD/YYYY` (zero padding optional), falling back to ISO dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
