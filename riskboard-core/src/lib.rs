//! riskboard core library - risk metric CSV to HTML chart dashboards

// Global invariants enforced in this crate:
// - Data flows one way: load -> classify -> group -> render -> assemble
// - Configuration is resolved once and never mutated afterwards
// - No global mutable state
// - No clocks or randomness in rendered output
// - Deterministic ordering of nodes, units, series and cards
// - Identical input and configuration yield byte-for-byte identical output

pub mod chart;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod figure;
pub mod group;
pub mod layout;
pub mod loader;
pub mod pipeline;
pub mod report;

pub use classify::{Category, Classification, Classifier};
pub use config::{PlotType, ResolvedConfig};
pub use error::{ReportError, ReportResult};
pub use loader::{load_observations, LoadedData, Observation};
pub use pipeline::{run, NoopObserver, RunObserver, RunOptions, RunOutcome, RunSummary};

/// Load `input` and classify every distinct metric name with `config`'s
/// currency priority
pub fn classify_file(
    input: &std::path::Path,
    config: &ResolvedConfig,
) -> ReportResult<Classification> {
    let data = load_observations(input)?;
    let names = data.metric_names();
    Ok(Classification::build(
        &config.classifier(),
        names.iter().map(String::as_str),
    ))
}
