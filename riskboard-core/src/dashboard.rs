//! Dashboard page generation
//!
//! Generates the self-contained `dashboard.html` index with embedded CSS.
//! One section per node, one card per generated chart, all links relative
//! to the output directory.

use crate::chart::ChartKind;
use crate::classify::Category;
use crate::config::PlotType;
use serde::Serialize;

/// A generated chart file as listed on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartCard {
    /// Mother metric, or a fixed label for node-wide charts
    pub label: String,
    pub plot_type: PlotType,
    pub kind: ChartKind,
    /// None for node-wide charts
    pub category: Option<Category>,
    /// Relative to the output directory, `/` separated
    pub href: String,
}

/// All cards of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardEntry {
    pub node: String,
    pub cards: Vec<ChartCard>,
}

impl DashboardEntry {
    /// Cards in display order: plot type, then label
    pub fn sorted_cards(&self) -> Vec<&ChartCard> {
        let mut cards: Vec<&ChartCard> = self.cards.iter().collect();
        cards.sort_by(|a, b| {
            a.plot_type
                .cmp(&b.plot_type)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.href.cmp(&b.href))
        });
        cards
    }
}

/// Render the dashboard for every node that produced at least one chart
pub fn render_dashboard(entries: &[DashboardEntry]) -> String {
    let mut visible: Vec<&DashboardEntry> =
        entries.iter().filter(|e| !e.cards.is_empty()).collect();
    visible.sort_by(|a, b| a.node.cmp(&b.node));

    let sections: String = visible.iter().map(|e| render_node_section(e)).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Risk Metrics Dashboard</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        {header}
        {summary}
        {sections}
        {footer}
    </div>
</body>
</html>
"#,
        css = inline_css(),
        header = render_header(),
        summary = render_summary(&visible),
        sections = sections,
        footer = render_footer(),
    )
}

fn inline_css() -> &'static str {
    r#"
* {
    box-sizing: border-box;
    margin: 0;
    padding: 0;
}

body {
    font-family: system-ui, -apple-system, 'Segoe UI', sans-serif;
    line-height: 1.6;
    color: #111827;
    background: #f3f4f6;
}

.container {
    max-width: 1400px;
    margin: 0 auto;
    padding: 2rem;
}

header {
    margin-bottom: 2rem;
    padding-bottom: 1rem;
    border-bottom: 2px solid #e5e7eb;
}

header h1 {
    font-size: 2rem;
    font-weight: 700;
    margin-bottom: 0.5rem;
}

header .meta {
    color: #6b7280;
    font-size: 0.875rem;
}

.summary {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
    gap: 1rem;
    margin-bottom: 2rem;
}

.summary-card {
    background: #ffffff;
    padding: 1rem;
    border-radius: 0.5rem;
    border-left: 4px solid #3b82f6;
}

.summary-card h3 {
    font-size: 0.875rem;
    font-weight: 600;
    color: #6b7280;
    margin-bottom: 0.5rem;
}

.summary-card .value {
    font-size: 1.5rem;
    font-weight: 700;
}

.node-section {
    margin-bottom: 2.5rem;
}

.node-section h2 {
    font-size: 1.5rem;
    font-weight: 700;
    margin-bottom: 1rem;
    color: #1f2937;
}

.cards {
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(280px, 1fr));
    gap: 1rem;
}

.card {
    background: #ffffff;
    border-radius: 0.5rem;
    padding: 1rem 1.25rem;
    box-shadow: 0 1px 3px rgba(0, 0, 0, 0.08);
    transition: box-shadow 0.2s ease, transform 0.2s ease;
}

.card:hover {
    box-shadow: 0 6px 16px rgba(0, 0, 0, 0.12);
    transform: translateY(-2px);
}

.card h3 {
    font-size: 1rem;
    font-weight: 600;
    margin: 0.5rem 0 0.75rem;
    word-break: break-all;
}

.card a {
    color: #2563eb;
    text-decoration: none;
    font-size: 0.875rem;
    font-weight: 500;
}

.card a:hover {
    text-decoration: underline;
}

.badge {
    display: inline-block;
    padding: 0.125rem 0.5rem;
    border-radius: 9999px;
    font-size: 0.75rem;
    font-weight: 600;
    margin-right: 0.25rem;
}

.badge-bar {
    background: #dbeafe;
    color: #1e40af;
}

.badge-time_series {
    background: #dcfce7;
    color: #166534;
}

.tag {
    background: #f3f4f6;
    color: #374151;
    border: 1px solid #e5e7eb;
}

footer {
    margin-top: 3rem;
    padding-top: 1rem;
    border-top: 1px solid #e5e7eb;
    color: #9ca3af;
    font-size: 0.75rem;
    text-align: center;
}
"#
}

fn render_header() -> String {
    r#"<header>
    <h1>Risk Metrics Dashboard</h1>
    <div class="meta">Charts grouped by node. Open a card to view the interactive chart.</div>
</header>"#
        .to_string()
}

fn render_summary(entries: &[&DashboardEntry]) -> String {
    let charts: usize = entries.iter().map(|e| e.cards.len()).sum();
    let count = |plot_type: PlotType| -> usize {
        entries
            .iter()
            .flat_map(|e| e.cards.iter())
            .filter(|c| c.plot_type == plot_type)
            .count()
    };
    format!(
        r#"<div class="summary">
    <div class="summary-card"><h3>Nodes</h3><div class="value">{nodes}</div></div>
    <div class="summary-card"><h3>Charts</h3><div class="value">{charts}</div></div>
    <div class="summary-card"><h3>Bar Plots</h3><div class="value">{bars}</div></div>
    <div class="summary-card"><h3>Time Series</h3><div class="value">{series}</div></div>
</div>"#,
        nodes = entries.len(),
        charts = charts,
        bars = count(PlotType::Bar),
        series = count(PlotType::TimeSeries),
    )
}

fn render_node_section(entry: &DashboardEntry) -> String {
    let cards: String = entry
        .sorted_cards()
        .into_iter()
        .map(render_card)
        .collect();
    format!(
        r#"<section class="node-section">
    <h2>{node}</h2>
    <div class="cards">{cards}
    </div>
</section>"#,
        node = html_escape(&entry.node),
        cards = cards,
    )
}

fn render_card(card: &ChartCard) -> String {
    let tag = match card.category {
        Some(category) => format!(
            r#"<span class="badge tag">{}</span>"#,
            category.label()
        ),
        None => r#"<span class="badge tag">Node overview</span>"#.to_string(),
    };
    format!(
        r#"
        <div class="card">
            <span class="badge badge-{class}">{badge}</span>{tag}
            <h3>{label}</h3>
            <a href="{href}">View chart &rarr;</a>
        </div>"#,
        class = card.plot_type.as_str(),
        badge = card.plot_type.label(),
        tag = tag,
        label = html_escape(&card.label),
        href = html_escape(&card.href),
    )
}

fn render_footer() -> String {
    r#"<footer>
    <p>Generated by riskboard</p>
</footer>"#
        .to_string()
}

/// Escape HTML special characters
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
