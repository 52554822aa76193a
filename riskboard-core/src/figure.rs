//! Plotly figure serialisation
//!
//! A [`ChartSpec`] becomes a plotly.js figure (`data` + `layout`) built from
//! typed structs and serialised with serde_json, then embedded in a
//! standalone HTML page. No timestamps or random ids are emitted, so the
//! same chart always yields the same bytes.

use crate::chart::{ChartSpec, LimitKind, Panel, Series, DATE_FORMAT};
use crate::dashboard::html_escape;
use crate::layout::{self, GridCell};
use serde::Serialize;
use std::collections::BTreeMap;

pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const LIMIT_COLOR: &str = "red";
const EVENT_COLOR: &str = "darkgrey";
const SUBPLOT_TITLE_OFFSET: f64 = 0.02;

#[derive(Debug, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textposition: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legendgroup: Option<String>,
    pub showlegend: bool,
    pub xaxis: String,
    pub yaxis: String,
}

#[derive(Debug, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Margin {
    pub t: u32,
    pub b: u32,
    pub l: u32,
    pub r: u32,
}

#[derive(Debug, Serialize)]
pub struct Axis {
    pub domain: [f64; 2],
    pub anchor: String,
    pub automargin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickangle: Option<i32>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Line {
    pub color: &'static str,
    pub dash: &'static str,
    pub width: u32,
}

/// A straight line; limits span the x domain, events span the y domain
#[derive(Debug, Serialize)]
pub struct Shape {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub xref: String,
    pub yref: String,
    pub x0: serde_json::Value,
    pub x1: serde_json::Value,
    pub y0: serde_json::Value,
    pub y1: serde_json::Value,
    pub line: Line,
}

#[derive(Debug, Serialize)]
pub struct Annotation {
    pub text: String,
    pub xref: String,
    pub yref: String,
    pub x: f64,
    pub y: f64,
    pub xanchor: &'static str,
    pub yanchor: &'static str,
    pub showarrow: bool,
}

#[derive(Debug, Serialize)]
pub struct Layout {
    pub title: Title,
    pub width: u32,
    pub height: u32,
    pub showlegend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<&'static str>,
    pub plot_bgcolor: &'static str,
    pub paper_bgcolor: &'static str,
    pub margin: Margin,
    pub annotations: Vec<Annotation>,
    pub shapes: Vec<Shape>,
    /// `xaxis`, `yaxis`, `xaxis2`, ... keyed by plotly layout name
    #[serde(flatten)]
    pub axes: BTreeMap<String, Axis>,
}

/// Axis ids for the n-th subplot (0-based): ("x2", "y2") and so on
fn axis_ids(index: usize) -> (String, String) {
    if index == 0 {
        ("x".to_string(), "y".to_string())
    } else {
        (format!("x{}", index + 1), format!("y{}", index + 1))
    }
}

fn layout_key(axis_id: &str) -> String {
    let (letter, number) = axis_id.split_at(1);
    format!("{}axis{}", letter, number)
}

fn value_text(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

fn panel_traces(panel: &Panel, x_id: &str, y_id: &str) -> Vec<Trace> {
    panel
        .series
        .iter()
        .map(|series| match series {
            Series::Bar(bar) => Trace {
                kind: "bar",
                name: bar.name.clone(),
                x: bar.labels.clone(),
                y: bar.values.clone(),
                text: Some(bar.values.iter().copied().map(value_text).collect()),
                textposition: Some("auto"),
                mode: None,
                legendgroup: Some(bar.name.clone()),
                showlegend: bar.in_legend,
                xaxis: x_id.to_string(),
                yaxis: y_id.to_string(),
            },
            Series::Line(line) => Trace {
                kind: "scatter",
                name: line.name.clone(),
                x: line
                    .dates
                    .iter()
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .collect(),
                y: line.values.clone(),
                text: None,
                textposition: None,
                mode: Some("lines+markers"),
                legendgroup: None,
                showlegend: false,
                xaxis: x_id.to_string(),
                yaxis: y_id.to_string(),
            },
        })
        .collect()
}

fn limit_decorations(panel: &Panel, x_id: &str, y_id: &str) -> (Vec<Shape>, Vec<Annotation>) {
    let mut shapes = Vec::new();
    let mut annotations = Vec::new();
    for limit in &panel.limits {
        shapes.push(Shape {
            kind: "line",
            xref: format!("{} domain", x_id),
            yref: y_id.to_string(),
            x0: 0.into(),
            x1: 1.into(),
            y0: limit.value.into(),
            y1: limit.value.into(),
            line: Line {
                color: LIMIT_COLOR,
                dash: "dash",
                width: 2,
            },
        });
        annotations.push(Annotation {
            text: limit.kind.label().to_string(),
            xref: format!("{} domain", x_id),
            yref: y_id.to_string(),
            x: 0.0,
            y: limit.value,
            xanchor: "left",
            yanchor: match limit.kind {
                LimitKind::Max => "bottom",
                LimitKind::Min => "top",
            },
            showarrow: false,
        });
    }
    for date in &panel.event_dates {
        let x = serde_json::Value::from(date.format(DATE_FORMAT).to_string());
        shapes.push(Shape {
            kind: "line",
            xref: x_id.to_string(),
            yref: format!("{} domain", y_id),
            x0: x.clone(),
            x1: x,
            y0: 0.into(),
            y1: 1.into(),
            line: Line {
                color: EVENT_COLOR,
                dash: "dot",
                width: 1,
            },
        });
    }
    (shapes, annotations)
}

fn subplot_title(panel: &Panel, cell: &GridCell) -> Annotation {
    let (x, y) = cell.title_anchor();
    Annotation {
        text: format!("<b>{}</b>", html_escape(&panel.display_title())),
        xref: "paper".to_string(),
        yref: "paper".to_string(),
        x,
        y: y + SUBPLOT_TITLE_OFFSET,
        xanchor: "center",
        yanchor: "bottom",
        showarrow: false,
    }
}

/// Build the plotly figure for a chart
pub fn build_figure(chart: &ChartSpec) -> Figure {
    let cells = if chart.is_grid() {
        layout::grid_cells(chart.panels.len())
    } else {
        layout::grid_cells(chart.panels.len().min(1))
    };
    let mut data = Vec::new();
    let mut annotations = Vec::new();
    let mut shapes = Vec::new();
    let mut axes = BTreeMap::new();

    for (index, (panel, cell)) in chart.panels.iter().zip(&cells).enumerate() {
        let (x_id, y_id) = axis_ids(index);
        data.extend(panel_traces(panel, &x_id, &y_id));

        let (panel_shapes, panel_annotations) = limit_decorations(panel, &x_id, &y_id);
        shapes.extend(panel_shapes);
        annotations.extend(panel_annotations);
        if chart.is_grid() {
            annotations.push(subplot_title(panel, cell));
        }

        let is_time_axis = panel.series.iter().any(|s| matches!(s, Series::Line(_)));
        axes.insert(
            layout_key(&x_id),
            Axis {
                domain: cell.x,
                anchor: y_id.clone(),
                automargin: true,
                title: (!chart.is_grid()).then(|| Title {
                    text: "Metric".to_string(),
                }),
                tickangle: (chart.x_tick_angle != 0).then_some(chart.x_tick_angle),
                kind: is_time_axis.then_some("date"),
            },
        );
        axes.insert(
            layout_key(&y_id),
            Axis {
                domain: cell.y,
                anchor: x_id.clone(),
                automargin: true,
                title: Some(Title {
                    text: "Value".to_string(),
                }),
                tickangle: None,
                kind: None,
            },
        );
    }

    Figure {
        data,
        layout: Layout {
            title: Title {
                text: chart.title.clone(),
            },
            width: chart.width,
            height: chart.height,
            showlegend: chart.show_legend,
            barmode: chart
                .panels
                .iter()
                .flat_map(|p| p.series.iter())
                .any(|s| matches!(s, Series::Bar(_)))
                .then_some("group"),
            plot_bgcolor: "white",
            paper_bgcolor: "white",
            margin: Margin {
                t: 100,
                b: 150,
                l: 50,
                r: 50,
            },
            annotations,
            shapes,
            axes,
        },
    }
}

/// Figure JSON safe to inline in a `<script>` element
pub fn figure_json(chart: &ChartSpec) -> serde_json::Result<String> {
    let json = serde_json::to_string(&build_figure(chart))?;
    Ok(json.replace("</", "<\\/"))
}

/// Standalone chart page
pub fn render_chart_page(chart: &ChartSpec) -> serde_json::Result<String> {
    let figure = figure_json(chart)?;
    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <script src="{cdn}" charset="utf-8"></script>
    <style>body {{ margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; }} nav {{ padding: 0.75rem 1rem; }} nav a {{ color: #2563eb; text-decoration: none; }}</style>
</head>
<body>
    <nav><a href="../dashboard.html">&larr; Dashboard</a></nav>
    <div id="chart" style="width:{width}px;height:{height}px;"></div>
    <script>
        const figure = {figure};
        Plotly.newPlot("chart", figure.data, figure.layout, {{"displaylogo": false}});
    </script>
</body>
</html>
"#,
        title = html_escape(&chart.title),
        cdn = PLOTLY_CDN,
        width = chart.width,
        height = chart.height,
        figure = figure,
    ))
}
