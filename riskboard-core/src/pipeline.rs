//! Top-level run routine
//!
//! Load -> classify -> group -> render -> assemble. Everything is rendered in
//! memory first; files are only written once every node has been rendered,
//! so a fatal error never leaves a half-written output directory behind.
//! Nodes render in parallel and are collected back in node order.

use crate::chart::{self, ChartSpec, NodeSeries};
use crate::classify::{Category, Classification};
use crate::config::{PlotType, ResolvedConfig};
use crate::dashboard::{self, ChartCard, DashboardEntry};
use crate::error::{RenderSkip, ReportError, ReportResult, RowIssue};
use crate::figure;
use crate::group::{self, DisplayUnit};
use crate::loader::{self, Observation};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const DASHBOARD_FILE: &str = "dashboard.html";
pub const GROUPED_BAR_FILE: &str = "grouped_bar_plots.html";
pub const GROUPED_TIME_SERIES_FILE: &str = "grouped_timeseries.html";

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

/// Progress hooks. Called from worker threads.
pub trait RunObserver: Sync {
    fn nodes_discovered(&self, _count: usize) {}
    fn node_rendered(&self, _node: &str, _charts: usize) {}
}

/// Observer that ignores every event
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub node: String,
    pub charts: usize,
    pub skipped: usize,
}

/// What a completed run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// None when no chart was produced
    pub dashboard: Option<PathBuf>,
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub duplicate_keys: usize,
    pub row_issues: Vec<RowIssue>,
    pub nodes: Vec<NodeSummary>,
    pub charts_written: usize,
    pub skipped: Vec<RenderSkip>,
    /// Nodes that produced no chart and were left off the dashboard
    pub empty_nodes: Vec<String>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Aborted(ReportError),
}

impl RunOutcome {
    /// 0 with charts, 3 without, otherwise the error's code
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(summary) if summary.charts_written > 0 => 0,
            RunOutcome::Completed(_) => 3,
            RunOutcome::Aborted(err) => err.exit_code(),
        }
    }
}

/// One chart page waiting to be written
#[derive(Debug)]
struct RenderedPage {
    /// Relative to the output directory
    relative: PathBuf,
    html: String,
    card: ChartCard,
}

#[derive(Debug)]
struct NodeRender {
    node: String,
    pages: Vec<RenderedPage>,
    skips: Vec<RenderSkip>,
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{}", cleaned),
        _ => cleaned,
    }
}

/// Hands out file names, suffixing `_2`, `_3`, ... on collision
#[derive(Debug, Default)]
struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_ascii_lowercase());
    }

    fn allocate(&mut self, stem: &str, extension: &str) -> String {
        let mut candidate = format!("{}{}", stem, extension);
        let mut n = 2;
        while !self.used.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{}_{}{}", stem, n, extension);
            n += 1;
        }
        candidate
    }
}

/// Category shown on a unit's card: that of its first sub-metric
pub fn unit_category(unit: &DisplayUnit, classification: &Classification) -> Category {
    unit.sub_metrics
        .first()
        .map(|m| classification.category(m))
        .unwrap_or(Category::Other)
}

/// Distinct metric names in file order
fn discovery_order(observations: &[&Observation]) -> Vec<String> {
    let mut seen = HashSet::new();
    observations
        .iter()
        .filter(|o| seen.insert(o.metric.as_str()))
        .map(|o| o.metric.clone())
        .collect()
}

fn to_href(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

struct PageRequest<'a> {
    node: &'a str,
    dir: &'a str,
    label: &'a str,
    plot_type: PlotType,
    category: Option<Category>,
    file_name: String,
}

fn make_page(request: PageRequest<'_>, chart: &ChartSpec) -> Result<RenderedPage, RenderSkip> {
    let html = figure::render_chart_page(chart).map_err(|e| RenderSkip {
        node: request.node.to_string(),
        unit: request.label.to_string(),
        reason: format!("failed to serialise chart: {}", e),
    })?;
    let relative = Path::new(request.dir).join(&request.file_name);
    Ok(RenderedPage {
        card: ChartCard {
            label: request.label.to_string(),
            plot_type: request.plot_type,
            kind: chart.kind,
            category: request.category,
            href: to_href(&relative),
        },
        relative,
        html,
    })
}

fn render_node(
    node: &str,
    dir: &str,
    observations: &[&Observation],
    config: &ResolvedConfig,
    classification: &Classification,
) -> NodeRender {
    let available = discovery_order(observations);
    let units = group::group_node(node, &available, config, classification);
    let data = NodeSeries::new(observations);
    debug!(node, units = units.len(), "rendering node");

    let mut names = NameAllocator::default();
    names.reserve(GROUPED_BAR_FILE);
    names.reserve(GROUPED_TIME_SERIES_FILE);

    let mut pages = Vec::new();
    let mut skips = Vec::new();
    let mut push = |request: PageRequest<'_>, built: Result<ChartSpec, RenderSkip>| {
        match built.and_then(|chart| make_page(request, &chart)) {
            Ok(page) => pages.push(page),
            Err(skip) => {
                warn!(
                    node = %skip.node,
                    unit = %skip.unit,
                    reason = %skip.reason,
                    "chart skipped"
                );
                skips.push(skip);
            }
        }
    };

    for unit in &units {
        let category = Some(unit_category(unit, classification));
        let stem = sanitize_file_component(&unit.mother);
        for &plot_type in &unit.plot_types {
            let built = match plot_type {
                PlotType::Bar => chart::build_bar_chart(node, unit, &data),
                PlotType::TimeSeries => {
                    chart::build_time_series_chart(node, unit, &data, &config.event_dates)
                }
            };
            let file_name =
                names.allocate(&format!("{}_{}", stem, plot_type.file_suffix()), ".html");
            push(
                PageRequest {
                    node,
                    dir,
                    label: &unit.mother,
                    plot_type,
                    category,
                    file_name,
                },
                built,
            );
        }
    }

    let bar_units: Vec<&DisplayUnit> = units
        .iter()
        .filter(|u| u.has_plot_type(PlotType::Bar))
        .collect();
    if !bar_units.is_empty() {
        push(
            PageRequest {
                node,
                dir,
                label: "Grouped Bar Plots",
                plot_type: PlotType::Bar,
                category: None,
                file_name: GROUPED_BAR_FILE.to_string(),
            },
            chart::build_grouped_bar_chart(node, &bar_units, &data, &config.bar_dates),
        );
    }

    if config.grouped_time_series {
        let series_units: Vec<&DisplayUnit> = units
            .iter()
            .filter(|u| u.has_plot_type(PlotType::TimeSeries))
            .collect();
        if !series_units.is_empty() {
            push(
                PageRequest {
                    node,
                    dir,
                    label: "Grouped Time Series",
                    plot_type: PlotType::TimeSeries,
                    category: None,
                    file_name: GROUPED_TIME_SERIES_FILE.to_string(),
                },
                chart::build_grouped_time_series_chart(
                    node,
                    &series_units,
                    &data,
                    &config.event_dates,
                ),
            );
        }
    }

    NodeRender {
        node: node.to_string(),
        pages,
        skips,
    }
}

/// Write `contents` to `path` via a temp file and rename
pub fn atomic_write(path: &Path, contents: &str) -> ReportResult<()> {
    use std::fs;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).map_err(|e| ReportError::io(&temp_path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| ReportError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| ReportError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| ReportError::io(path, e))?;

    Ok(())
}

/// Run the whole pipeline. Never panics on bad input; fatal problems come
/// back as [`RunOutcome::Aborted`].
pub fn run(
    options: &RunOptions,
    config: &ResolvedConfig,
    observer: &dyn RunObserver,
) -> RunOutcome {
    match execute(options, config, observer) {
        Ok(summary) => RunOutcome::Completed(summary),
        Err(err) => {
            error!(error = %err, "run aborted");
            RunOutcome::Aborted(err)
        }
    }
}

fn execute(
    options: &RunOptions,
    config: &ResolvedConfig,
    observer: &dyn RunObserver,
) -> ReportResult<RunSummary> {
    let data = loader::load_observations(&options.input)?;

    let metric_names = data.metric_names();
    let classification = Classification::build(
        &config.classifier(),
        metric_names.iter().map(String::as_str),
    );
    debug!(metrics = classification.len(), "metrics classified");

    let by_node = data.by_node();

    let nodes: Vec<String> = data
        .nodes()
        .into_iter()
        .chain(config.nodes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    observer.nodes_discovered(nodes.len());

    let mut dirs = NameAllocator::default();
    dirs.reserve(DASHBOARD_FILE);
    let jobs: Vec<(&str, String)> = nodes
        .iter()
        .map(|n| (n.as_str(), dirs.allocate(&sanitize_file_component(n), "")))
        .collect();

    let empty: Vec<&Observation> = Vec::new();
    let renders: Vec<NodeRender> = jobs
        .par_iter()
        .map(|(node, dir)| {
            let observations = by_node.get(node).unwrap_or(&empty);
            let render = render_node(node, dir, observations, config, &classification);
            observer.node_rendered(node, render.pages.len());
            render
        })
        .collect();

    let mut entries = Vec::new();
    let mut node_summaries = Vec::new();
    let mut skipped = Vec::new();
    let mut empty_nodes = Vec::new();
    let mut pending: Vec<RenderedPage> = Vec::new();

    for render in renders {
        node_summaries.push(NodeSummary {
            node: render.node.clone(),
            charts: render.pages.len(),
            skipped: render.skips.len(),
        });
        skipped.extend(render.skips);
        if render.pages.is_empty() {
            warn!(node = %render.node, "node produced no charts; omitted from dashboard");
            empty_nodes.push(render.node);
            continue;
        }
        entries.push(DashboardEntry {
            node: render.node,
            cards: render.pages.iter().map(|p| p.card.clone()).collect(),
        });
        pending.extend(render.pages);
    }

    let charts_written = pending.len();
    let dashboard = if charts_written == 0 {
        warn!("no charts produced; nothing written");
        None
    } else {
        for page in &pending {
            atomic_write(&options.output_dir.join(&page.relative), &page.html)?;
        }
        let path = options.output_dir.join(DASHBOARD_FILE);
        atomic_write(&path, &dashboard::render_dashboard(&entries))?;
        info!(path = %path.display(), charts = charts_written, "dashboard written");
        Some(path)
    };

    if !skipped.is_empty() {
        warn!(count = skipped.len(), "charts skipped");
    }

    Ok(RunSummary {
        input: options.input.clone(),
        output_dir: options.output_dir.clone(),
        dashboard,
        rows_read: data.rows_read,
        rows_dropped: data.rows_dropped(),
        duplicate_keys: data.duplicate_keys,
        row_issues: data.row_issues,
        nodes: node_summaries,
        charts_written,
        skipped,
        empty_nodes,
    })
}
