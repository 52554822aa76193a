//! Chart building
//!
//! Turns display units into plain chart values: data series, limit lines,
//! event markers and computed dimensions. Nothing here knows about HTML or
//! plotly; see [`crate::figure`] for serialisation.

use crate::error::RenderSkip;
use crate::group::DisplayUnit;
use crate::layout;
use crate::loader::Observation;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Date format used in titles, legends and the time axis
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest date list shown verbatim in a grouped bar title
const MAX_TITLE_DATES_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    GroupedBar,
    TimeSeries,
    GroupedTimeSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Max,
    Min,
}

impl LimitKind {
    pub fn label(&self) -> &'static str {
        match self {
            LimitKind::Max => "Max Limit",
            LimitKind::Min => "Min Limit",
        }
    }
}

/// Horizontal reference line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitLine {
    pub kind: LimitKind,
    pub value: f64,
}

/// Bars over categorical labels; `None` leaves a gap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    pub name: String,
    pub labels: Vec<String>,
    pub values: Vec<Option<f64>>,
    pub in_legend: bool,
}

/// Line over dates; `None` breaks the line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Series {
    Bar(BarSeries),
    Line(LineSeries),
}

/// One subplot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub title: String,
    pub has_data: bool,
    pub series: Vec<Series>,
    pub limits: Vec<LimitLine>,
    pub event_dates: Vec<NaiveDate>,
}

impl Panel {
    /// Title as shown, with a marker when there is nothing to plot
    pub fn display_title(&self) -> String {
        if self.has_data {
            self.title.clone()
        } else {
            format!("{} (No Data)", self.title)
        }
    }
}

/// A complete chart, ready for serialisation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub x_tick_angle: i32,
    pub show_legend: bool,
    pub panels: Vec<Panel>,
}

impl ChartSpec {
    /// True when the panels are laid out on a grid with per-panel titles
    pub fn is_grid(&self) -> bool {
        matches!(
            self.kind,
            ChartKind::GroupedBar | ChartKind::TimeSeries | ChartKind::GroupedTimeSeries
        )
    }
}

/// One node's observations indexed by metric and date.
///
/// Later rows overwrite earlier rows with the same (metric, date).
#[derive(Debug, Default)]
pub struct NodeSeries<'a> {
    by_metric: HashMap<&'a str, BTreeMap<NaiveDate, &'a Observation>>,
}

impl<'a> NodeSeries<'a> {
    pub fn new(observations: &[&'a Observation]) -> Self {
        let mut by_metric: HashMap<&'a str, BTreeMap<NaiveDate, &'a Observation>> =
            HashMap::new();
        for &obs in observations {
            by_metric
                .entry(obs.metric.as_str())
                .or_default()
                .insert(obs.date, obs);
        }
        NodeSeries { by_metric }
    }

    fn history(&self, metric: &str) -> Option<&BTreeMap<NaiveDate, &'a Observation>> {
        self.by_metric.get(metric)
    }

    pub fn has_data(&self, metric: &str) -> bool {
        self.history(metric).is_some_and(|h| !h.is_empty())
    }

    pub fn value_at(&self, metric: &str, date: NaiveDate) -> Option<f64> {
        self.history(metric)
            .and_then(|h| h.get(&date))
            .map(|obs| obs.value)
    }

    /// Latest date carrying any of `metrics`
    pub fn latest_date(&self, metrics: &[String]) -> Option<NaiveDate> {
        metrics
            .iter()
            .filter_map(|m| self.history(m).and_then(|h| h.keys().next_back().copied()))
            .max()
    }

    /// Every date carrying any of `metrics`, ascending
    pub fn dates(&self, metrics: &[String]) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = metrics
            .iter()
            .filter_map(|m| self.history(m))
            .flat_map(|h| h.keys().copied())
            .collect();
        dates.into_iter().collect()
    }

    /// Series label: the consolidated name of the latest row
    pub fn display_name(&self, metric: &str) -> String {
        self.history(metric)
            .and_then(|h| h.values().next_back())
            .map(|obs| obs.consolidated_metric.clone())
            .unwrap_or_else(|| metric.to_string())
    }

    /// Limits from the latest row of `metric` carrying each limit
    pub fn limits(&self, metric: &str) -> Vec<LimitLine> {
        let Some(history) = self.history(metric) else {
            return Vec::new();
        };
        let max = history.values().rev().find_map(|obs| obs.lim_max);
        let min = history.values().rev().find_map(|obs| obs.lim_min);
        let mut limits = Vec::new();
        if let Some(value) = max {
            limits.push(LimitLine {
                kind: LimitKind::Max,
                value,
            });
        }
        if let Some(value) = min {
            limits.push(LimitLine {
                kind: LimitKind::Min,
                value,
            });
        }
        limits
    }
}

fn skip(node: &str, unit: &str, reason: impl Into<String>) -> RenderSkip {
    RenderSkip {
        node: node.to_string(),
        unit: unit.to_string(),
        reason: reason.into(),
    }
}

/// Bar chart of a unit at its latest date
pub fn build_bar_chart(
    node: &str,
    unit: &DisplayUnit,
    data: &NodeSeries<'_>,
) -> Result<ChartSpec, RenderSkip> {
    let date = data
        .latest_date(&unit.sub_metrics)
        .ok_or_else(|| skip(node, &unit.mother, "no observations for any sub-metric"))?;

    let (labels, values): (Vec<String>, Vec<Option<f64>>) = unit
        .sub_metrics
        .iter()
        .filter_map(|m| data.value_at(m, date).map(|v| (m.clone(), Some(v))))
        .unzip();

    if labels.is_empty() {
        return Err(skip(
            node,
            &unit.mother,
            format!("no observations on {}", date.format(DATE_FORMAT)),
        ));
    }

    let height = layout::bar_height(unit.sub_metrics.len());
    let date_label = date.format(DATE_FORMAT).to_string();
    Ok(ChartSpec {
        kind: ChartKind::Bar,
        title: format!(
            "{} - {} and Related Metrics ({})",
            node, unit.mother, date_label
        ),
        width: layout::bar_width(height),
        height,
        x_tick_angle: -45,
        show_legend: false,
        panels: vec![Panel {
            title: unit.mother.clone(),
            has_data: true,
            series: vec![Series::Bar(BarSeries {
                name: date_label,
                labels,
                values,
                in_legend: false,
            })],
            limits: Vec::new(),
            event_dates: Vec::new(),
        }],
    })
}

fn grouped_bar_title_dates(bar_dates: &[NaiveDate], any_data: bool) -> String {
    if bar_dates.is_empty() {
        return if any_data {
            "Latest Available Data".to_string()
        } else {
            "No Data Available".to_string()
        };
    }
    let joined = bar_dates
        .iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.len() > MAX_TITLE_DATES_LEN {
        format!("{} Selected Dates", bar_dates.len())
    } else {
        joined
    }
}

/// Side-by-side bar panels for every bar-eligible unit of a node.
///
/// With `bar_dates` each panel carries one trace per date; otherwise each
/// panel uses its own latest date.
pub fn build_grouped_bar_chart(
    node: &str,
    units: &[&DisplayUnit],
    data: &NodeSeries<'_>,
    bar_dates: &[NaiveDate],
) -> Result<ChartSpec, RenderSkip> {
    if units.is_empty() {
        return Err(skip(node, "grouped bar plots", "no bar units"));
    }

    let mut legend_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let panels: Vec<Panel> = units
        .iter()
        .map(|unit| {
            let dates: Vec<NaiveDate> = if bar_dates.is_empty() {
                data.latest_date(&unit.sub_metrics).into_iter().collect()
            } else {
                bar_dates.to_vec()
            };
            let series: Vec<Series> = dates
                .into_iter()
                .filter_map(|date| {
                    let values: Vec<Option<f64>> = unit
                        .sub_metrics
                        .iter()
                        .map(|m| data.value_at(m, date))
                        .collect();
                    if values.iter().all(Option::is_none) {
                        return None;
                    }
                    let in_legend = !bar_dates.is_empty() && legend_dates.insert(date);
                    Some(Series::Bar(BarSeries {
                        name: date.format(DATE_FORMAT).to_string(),
                        labels: unit.sub_metrics.clone(),
                        values,
                        in_legend,
                    }))
                })
                .collect();
            Panel {
                title: unit.mother.clone(),
                has_data: !series.is_empty(),
                series,
                limits: Vec::new(),
                event_dates: Vec::new(),
            }
        })
        .collect();

    let any_data = panels.iter().any(|p| p.has_data);
    if !any_data {
        return Err(skip(
            node,
            "grouped bar plots",
            "no unit has data on the plotted dates",
        ));
    }

    Ok(ChartSpec {
        kind: ChartKind::GroupedBar,
        title: format!(
            "{} - Bar Plots ({})",
            node,
            grouped_bar_title_dates(bar_dates, any_data)
        ),
        width: layout::MAX_WIDTH,
        height: layout::grouped_bar_height(panels.len()),
        x_tick_angle: -90,
        show_legend: !bar_dates.is_empty(),
        panels,
    })
}

fn line_series(
    name: String,
    metrics: &[String],
    data: &NodeSeries<'_>,
    dates: &[NaiveDate],
) -> Vec<Series> {
    metrics
        .iter()
        .filter(|m| data.has_data(m))
        .map(|m| {
            Series::Line(LineSeries {
                name: if metrics.len() == 1 {
                    name.clone()
                } else {
                    data.display_name(m)
                },
                dates: dates.to_vec(),
                values: dates.iter().map(|d| data.value_at(m, *d)).collect(),
            })
        })
        .collect()
}

fn time_series_spec(kind: ChartKind, title: String, panels: Vec<Panel>) -> ChartSpec {
    let rows = layout::grid_rows(panels.len());
    ChartSpec {
        kind,
        title,
        width: layout::MAX_WIDTH,
        height: layout::time_series_height(rows),
        x_tick_angle: 0,
        show_legend: false,
        panels,
    }
}

/// One subplot per sub-metric over the unit's full date range
pub fn build_time_series_chart(
    node: &str,
    unit: &DisplayUnit,
    data: &NodeSeries<'_>,
    event_dates: &[NaiveDate],
) -> Result<ChartSpec, RenderSkip> {
    if unit.sub_metrics.is_empty() {
        return Err(skip(node, &unit.mother, "no related metrics"));
    }
    let dates = data.dates(&unit.sub_metrics);
    if dates.is_empty() {
        return Err(skip(node, &unit.mother, "no observations for any sub-metric"));
    }

    let panels = unit
        .sub_metrics
        .iter()
        .map(|metric| {
            let series = line_series(
                data.display_name(metric),
                std::slice::from_ref(metric),
                data,
                &dates,
            );
            Panel {
                title: metric.clone(),
                has_data: !series.is_empty(),
                series,
                limits: data.limits(metric),
                event_dates: event_dates.to_vec(),
            }
        })
        .collect();

    Ok(time_series_spec(
        ChartKind::TimeSeries,
        format!("{} - {} and Related Metrics Time Series", node, unit.mother),
        panels,
    ))
}

/// One subplot per time-series unit of a node, every sub-metric a line
pub fn build_grouped_time_series_chart(
    node: &str,
    units: &[&DisplayUnit],
    data: &NodeSeries<'_>,
    event_dates: &[NaiveDate],
) -> Result<ChartSpec, RenderSkip> {
    let all_metrics: Vec<String> = units
        .iter()
        .flat_map(|u| u.sub_metrics.iter().cloned())
        .collect();
    let dates = data.dates(&all_metrics);
    if units.is_empty() || dates.is_empty() {
        return Err(skip(node, "grouped time series", "no time series data"));
    }

    let panels = units
        .iter()
        .map(|unit| {
            let series = line_series(unit.mother.clone(), &unit.sub_metrics, data, &dates);
            let limits = match unit.sub_metrics.as_slice() {
                [only] => data.limits(only),
                _ => Vec::new(),
            };
            Panel {
                title: unit.mother.clone(),
                has_data: !series.is_empty(),
                series,
                limits,
                event_dates: event_dates.to_vec(),
            }
        })
        .collect();

    Ok(time_series_spec(
        ChartKind::GroupedTimeSeries,
        format!("{} - Time Series Overview", node),
        panels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlotType;

    fn obs(metric: &str, date: (i32, u32, u32), value: f64) -> Observation {
        Observation {
            limit_id: 1,
            risk_indicator: "Sensi".to_string(),
            metric: metric.to_string(),
            node: "N".to_string(),
            value,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            consolidated_metric: metric.to_string(),
            lim_max: None,
            lim_min: None,
        }
    }

    fn unit(mother: &str, subs: &[&str]) -> DisplayUnit {
        DisplayUnit {
            mother: mother.to_string(),
            sub_metrics: subs.iter().map(|s| s.to_string()).collect(),
            plot_types: vec![PlotType::Bar, PlotType::TimeSeries],
            configured: true,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_bar_chart_uses_latest_date_and_unit_order() {
        let rows = vec![
            obs("CredBpv_3M", (2024, 1, 1), 1.0),
            obs("CredBpv_3M", (2024, 1, 2), 2.0),
            obs("CredBpv_1Y", (2024, 1, 2), 3.0),
            obs("CredBpv[USD]", (2024, 1, 2), 4.0),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let u = unit("CredBpv", &["CredBpv_3M", "CredBpv_1Y", "CredBpv[USD]"]);
        let chart = build_bar_chart("N", &u, &data).unwrap();
        assert_eq!(chart.height, 600);
        assert_eq!(chart.width, 1200);
        assert_eq!(chart.x_tick_angle, -45);
        assert_eq!(chart.title, "N - CredBpv and Related Metrics (2024-01-02)");
        let Series::Bar(bars) = &chart.panels[0].series[0] else {
            panic!("expected bar series");
        };
        assert_eq!(bars.labels, vec!["CredBpv_3M", "CredBpv_1Y", "CredBpv[USD]"]);
        assert_eq!(bars.values, vec![Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_bar_chart_height_grows_with_metrics() {
        let names: Vec<String> = (1..=10).map(|i| format!("M_{}Y", i)).collect();
        let rows: Vec<Observation> = names.iter().map(|n| obs(n, (2024, 1, 1), 1.0)).collect();
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let subs: Vec<&str> = names.iter().map(String::as_str).collect();
        let chart = build_bar_chart("N", &unit("M", &subs), &data).unwrap();
        assert_eq!(chart.height, 1000);
        assert_eq!(chart.width, 1200);
    }

    #[test]
    fn test_bar_chart_omits_metrics_missing_at_latest_date() {
        let rows = vec![obs("A", (2024, 1, 1), 1.0), obs("B", (2024, 1, 2), 2.0)];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let chart = build_bar_chart("N", &unit("X", &["A", "B"]), &data).unwrap();
        let Series::Bar(bars) = &chart.panels[0].series[0] else {
            panic!("expected bar series");
        };
        assert_eq!(bars.labels, vec!["B"]);
    }

    #[test]
    fn test_bar_chart_height_counts_every_sub_metric() {
        let names: Vec<String> = (1..=8).map(|i| format!("M_{}Y", i)).collect();
        let mut rows: Vec<Observation> =
            names.iter().map(|n| obs(n, (2024, 1, 1), 1.0)).collect();
        rows.push(obs("M_1Y", (2024, 1, 2), 2.0));
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let subs: Vec<&str> = names.iter().map(String::as_str).collect();
        let chart = build_bar_chart("N", &unit("M", &subs), &data).unwrap();
        let Series::Bar(bars) = &chart.panels[0].series[0] else {
            panic!("expected bar series");
        };
        assert_eq!(bars.labels, vec!["M_1Y"]);
        assert_eq!(chart.height, 800);
        assert_eq!(chart.width, 1200);
    }

    #[test]
    fn test_bar_chart_without_data_is_skipped() {
        let data = NodeSeries::default();
        let err = build_bar_chart("N", &unit("VaR", &["VaR"]), &data).unwrap_err();
        assert_eq!(err.node, "N");
        assert_eq!(err.unit, "VaR");
    }

    #[test]
    fn test_duplicate_rows_last_wins() {
        let rows = vec![obs("A", (2024, 1, 1), 1.0), obs("A", (2024, 1, 1), 9.0)];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        assert_eq!(data.value_at("A", day(1)), Some(9.0));
    }

    #[test]
    fn test_grouped_bar_layout_and_no_data_panels() {
        let rows = vec![
            obs("A", (2024, 1, 1), 1.0),
            obs("B", (2024, 1, 1), 2.0),
            obs("C", (2024, 1, 1), 3.0),
            obs("D", (2024, 1, 1), 4.0),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let units = [
            unit("A", &["A"]),
            unit("B", &["B"]),
            unit("C", &["C"]),
            unit("D", &["D"]),
            unit("E", &[]),
        ];
        let refs: Vec<&DisplayUnit> = units.iter().collect();
        let chart = build_grouped_bar_chart("N", &refs, &data, &[]).unwrap();
        assert_eq!(chart.panels.len(), 5);
        assert_eq!(chart.height, 1350);
        assert_eq!(chart.x_tick_angle, -90);
        assert!(!chart.show_legend);
        assert_eq!(chart.panels[4].display_title(), "E (No Data)");
        assert_eq!(chart.title, "N - Bar Plots (Latest Available Data)");
    }

    #[test]
    fn test_grouped_bar_selected_dates_add_legend_once() {
        let rows = vec![
            obs("A", (2024, 1, 1), 1.0),
            obs("A", (2024, 1, 2), 2.0),
            obs("B", (2024, 1, 2), 3.0),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let units = [unit("A", &["A"]), unit("B", &["B"])];
        let refs: Vec<&DisplayUnit> = units.iter().collect();
        let chart = build_grouped_bar_chart("N", &refs, &data, &[day(1), day(2)]).unwrap();
        assert!(chart.show_legend);
        assert_eq!(chart.title, "N - Bar Plots (2024-01-01, 2024-01-02)");
        assert_eq!(chart.panels[0].series.len(), 2);
        assert_eq!(chart.panels[1].series.len(), 1);
        let legend: Vec<bool> = chart
            .panels
            .iter()
            .flat_map(|p| p.series.iter())
            .map(|s| match s {
                Series::Bar(b) => b.in_legend,
                Series::Line(_) => false,
            })
            .collect();
        assert_eq!(legend, vec![true, true, false]);
    }

    #[test]
    fn test_time_series_gaps_are_null() {
        let rows = vec![
            obs("A", (2024, 1, 1), 1.0),
            obs("A", (2024, 1, 3), 3.0),
            obs("B", (2024, 1, 2), 2.0),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let chart = build_time_series_chart("N", &unit("X", &["A", "B"]), &data, &[]).unwrap();
        assert_eq!(chart.panels.len(), 2);
        assert_eq!(chart.height, 600);
        let Series::Line(line) = &chart.panels[0].series[0] else {
            panic!("expected line series");
        };
        assert_eq!(line.dates, vec![day(1), day(2), day(3)]);
        assert_eq!(line.values, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_time_series_limits_from_latest_row_with_limit() {
        let mut first = obs("A", (2024, 1, 1), 1.0);
        first.lim_max = Some(10.0);
        first.lim_min = Some(-10.0);
        let mut second = obs("A", (2024, 1, 2), 2.0);
        second.lim_max = Some(12.0);
        let rows = vec![first, second];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let chart = build_time_series_chart("N", &unit("A", &["A"]), &data, &[day(2)]).unwrap();
        assert_eq!(
            chart.panels[0].limits,
            vec![
                LimitLine {
                    kind: LimitKind::Max,
                    value: 12.0
                },
                LimitLine {
                    kind: LimitKind::Min,
                    value: -10.0
                }
            ]
        );
        assert_eq!(chart.panels[0].event_dates, vec![day(2)]);
    }

    #[test]
    fn test_time_series_without_limits_draws_no_lines() {
        let rows = vec![obs("A", (2024, 1, 1), 1.0)];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let chart = build_time_series_chart("N", &unit("A", &["A"]), &data, &[]).unwrap();
        assert!(chart.panels[0].limits.is_empty());
    }

    #[test]
    fn test_time_series_height_grows_with_rows() {
        let names = ["A", "B", "C", "D", "E"];
        let rows: Vec<Observation> = names.iter().map(|n| obs(n, (2024, 1, 1), 1.0)).collect();
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let chart = build_time_series_chart("N", &unit("X", &names), &data, &[]).unwrap();
        // 5 panels, 3 rows
        assert_eq!(chart.height, 1350);
    }

    #[test]
    fn test_time_series_without_metrics_is_skipped() {
        let data = NodeSeries::default();
        assert!(build_time_series_chart("N", &unit("FTQ", &[]), &data, &[]).is_err());
    }

    #[test]
    fn test_grouped_time_series_one_panel_per_unit() {
        let rows = vec![
            obs("A_1Y", (2024, 1, 1), 1.0),
            obs("A_2Y", (2024, 1, 1), 2.0),
            obs("B", (2024, 1, 2), 3.0),
        ];
        let refs: Vec<&Observation> = rows.iter().collect();
        let data = NodeSeries::new(&refs);
        let units = [unit("A", &["A_1Y", "A_2Y"]), unit("B", &["B"])];
        let refs: Vec<&DisplayUnit> = units.iter().collect();
        let chart = build_grouped_time_series_chart("N", &refs, &data, &[]).unwrap();
        assert_eq!(chart.kind, ChartKind::GroupedTimeSeries);
        assert_eq!(chart.panels.len(), 2);
        assert_eq!(chart.panels[0].series.len(), 2);
        assert_eq!(chart.title, "N - Time Series Overview");
    }
}
