//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs

use crate::classify::{Category, Classification};
use crate::pipeline::RunSummary;
use serde::Serialize;

/// One line of the classification table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationRow {
    pub metric: String,
    pub category: Category,
    pub sort_key: String,
}

/// Classification rows sorted by category, then sort key, then name
pub fn classification_rows(classification: &Classification) -> Vec<ClassificationRow> {
    classification
        .sorted_entries()
        .into_iter()
        .map(|(metric, class)| ClassificationRow {
            metric: metric.to_string(),
            category: class.category,
            sort_key: class.key.display(),
        })
        .collect()
}

/// Render the classification table as text
pub fn render_classification_text(rows: &[ClassificationRow]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<10} {:<12} {}\n",
        "CATEGORY", "SORT KEY", "METRIC"
    ));
    for row in rows {
        output.push_str(&format!(
            "{:<10} {:<12} {}\n",
            row.category.label(),
            truncate_or_pad(&row.sort_key, 12),
            row.metric
        ));
    }
    output
}

/// Render the classification table as JSON
pub fn render_classification_json(rows: &[ClassificationRow]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

/// Render a run summary as text
pub fn render_summary_text(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Rows read: {} (dropped: {}, duplicate keys: {})\n",
        summary.rows_read, summary.rows_dropped, summary.duplicate_keys
    ));
    output.push_str(&format!(
        "Charts written: {} (skipped: {})\n",
        summary.charts_written,
        summary.skipped.len()
    ));

    if !summary.nodes.is_empty() {
        output.push('\n');
        output.push_str(&format!("{:<24} {:<8} {}\n", "NODE", "CHARTS", "SKIPPED"));
        for node in &summary.nodes {
            output.push_str(&format!(
                "{:<24} {:<8} {}\n",
                truncate_or_pad(&node.node, 24),
                node.charts,
                node.skipped
            ));
        }
    }

    if !summary.skipped.is_empty() {
        output.push_str("\nSkipped charts:\n");
        for skip in &summary.skipped {
            output.push_str(&format!("  {} / {}: {}\n", skip.node, skip.unit, skip.reason));
        }
    }

    if !summary.row_issues.is_empty() {
        output.push_str("\nRow issues:\n");
        for issue in &summary.row_issues {
            let action = if issue.dropped { "dropped" } else { "coerced" };
            output.push_str(&format!(
                "  line {} [{}] {}: {}\n",
                issue.line, issue.field, action, issue.message
            ));
        }
    }

    match &summary.dashboard {
        Some(path) => output.push_str(&format!("\nDashboard: {}\n", path.display())),
        None => output.push_str("\nNo charts produced; dashboard not written\n"),
    }

    output
}

/// Render a run summary as JSON
pub fn render_summary_json(summary: &RunSummary) -> String {
    serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
