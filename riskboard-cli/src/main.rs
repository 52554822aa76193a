//! riskboard CLI - risk metric CSV to HTML chart dashboards

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output
// - Logs go to stderr, summaries to stdout

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use riskboard_core::config::{self, ResolvedConfig};
use riskboard_core::report;
use riskboard_core::{run, ReportError, RunObserver, RunOptions, RunOutcome};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "riskboard")]
#[command(about = "Render risk metric CSV extracts into an HTML chart dashboard")]
#[command(version = env!("RISKBOARD_VERSION"))]
struct Cli {
    /// Log debug detail to stderr
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, classify, group and render every node, then write the dashboard
    Render {
        /// Path to the risk metric CSV
        #[arg(default_value = "Input/fake_data.csv")]
        input: PathBuf,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory
        #[arg(long, default_value = "output")]
        output: PathBuf,

        /// Summary format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Print how every metric in the input is classified and ordered
    Classify {
        /// Path to the risk metric CSV
        #[arg(default_value = "Input/fake_data.csv")]
        input: PathBuf,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate or inspect a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without rendering anything
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (defaults merged with the config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Progress bar over nodes; hidden automatically when stderr is not a terminal
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message("Rendering nodes");
        ProgressObserver { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl RunObserver for ProgressObserver {
    fn nodes_discovered(&self, count: usize) {
        self.bar.set_length(count as u64);
    }

    fn node_rendered(&self, _node: &str, _charts: usize) {
        self.bar.inc(1);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Render {
            input,
            config: config_path,
            output,
            format,
        } => {
            let resolved = load_config_or_exit(config_path);
            let options = RunOptions {
                input,
                output_dir: output,
            };

            let progress = ProgressObserver::new(cli.verbose || cli.quiet);
            let outcome = run(&options, &resolved, &progress);
            progress.finish();

            match &outcome {
                RunOutcome::Completed(summary) => match format {
                    OutputFormat::Text => print!("{}", report::render_summary_text(summary)),
                    OutputFormat::Json => println!("{}", report::render_summary_json(summary)),
                },
                RunOutcome::Aborted(err) => eprintln!("Error: {}", err),
            }

            let code = outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Classify {
            input,
            config: config_path,
            format,
        } => {
            let resolved = load_config_or_exit(config_path);
            let classification = match riskboard_core::classify_file(&input, &resolved) {
                Ok(classification) => classification,
                Err(err) => {
                    eprintln!("Error: {}", err);
                    std::process::exit(err.exit_code());
                }
            };

            let rows = report::classification_rows(&classification);
            match format {
                OutputFormat::Text => print!("{}", report::render_classification_text(&rows)),
                OutputFormat::Json => println!("{}", report::render_classification_json(&rows)),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration from the working directory, or exit with the
/// configuration error code
fn load_config_or_exit(config_path: Option<PathBuf>) -> ResolvedConfig {
    let resolved = std::env::current_dir()
        .context("failed to read working directory")
        .and_then(|root| config::load_and_resolve(&root, config_path.as_deref()));

    match resolved {
        Ok(resolved) => {
            if let Some(path) = &resolved.config_path {
                tracing::info!(path = %path.display(), "using config");
            }
            resolved
        }
        Err(e) => {
            let err = ReportError::from(e);
            eprintln!("Error: {}", err);
            std::process::exit(err.exit_code());
        }
    }
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    match &resolved.config_path {
        Some(p) => println!("  Source: {}", p.display()),
        None => println!("  Source: defaults (no config file found)"),
    }

    println!();
    println!("Nodes:");
    if resolved.nodes.is_empty() {
        println!("  none (every metric gets its own bar and time series chart)");
    }
    for (name, node) in &resolved.nodes {
        println!("  {} (include unclaimed: {})", name, node.include_unclaimed);
        for group in &node.groups {
            let plot_types: Vec<&str> = group.plot_types.iter().map(|p| p.as_str()).collect();
            println!(
                "    {} -> {}",
                group.mother_metrics.join(", "),
                plot_types.join(", ")
            );
        }
    }

    println!();
    println!("Rules:");
    for (mother, rule) in &resolved.rules {
        println!(
            "  {}: include={} exclude={}",
            mother,
            rule.include_pattern().unwrap_or("(contains name)"),
            rule.exclude_pattern().unwrap_or("none")
        );
    }

    println!();
    println!("Currency priority: {}", resolved.currency_priority.join(", "));
    println!("Event dates: {}", format_dates(&resolved.event_dates));
    println!("Bar dates: {}", format_dates(&resolved.bar_dates));
    println!("Grouped time series: {}", resolved.grouped_time_series);
}

fn format_dates(dates: &[chrono::NaiveDate]) -> String {
    if dates.is_empty() {
        return "none".to_string();
    }
    dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
