//! plenum: plan distribution networks over floorplan centerlines.
//!
//! Reads a `PlanInput` JSON file (segments, terminals, terminal groups,
//! sources and weights), runs the planner and prints per-stage
//! diagnostics or the full plan as JSON. Useful for:
//!
//! - Tuning merge and offset tolerances against a real floorplan
//! - Comparing MST and shortest-path tree topologies
//! - Checking how partition counts and time limits affect balance
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin plenum -- [OPTIONS] <INPUT_PATH>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use plenum_topology::diagnostics::{Clock, PlanDiagnostics};
use plenum_topology::{PartitionConfig, PlanConfig, PlanInput, ToleranceConfig, TreeAlgorithm};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Floorplan to distribution-tree planner.
///
/// Regularizes the centerlines, extracts rooms, spans the terminals with
/// a rooted Steiner tree and optionally balances it into partitions.
#[derive(Parser)]
#[command(name = "plenum", version)]
struct Cli {
    /// Path to the `PlanInput` JSON file.
    input_path: PathBuf,

    /// Distance under which points are considered equal.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_MERGE)]
    tolerance_merge: f64,

    /// Perpendicular distance under which parallel lines share an axis.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_OFFSET)]
    tolerance_offset: f64,

    /// Angle under which segments share a direction, in degrees.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_ANGLE.to_degrees())]
    tolerance_angle: f64,

    /// Distance within which vertices collapse into an axis intersection.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_CAPTURE)]
    tolerance_capture: f64,

    /// Nested single rooms smaller than this are pruned.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_MIN_NESTED_AREA)]
    tolerance_min_nested_area: f64,

    /// Distance within which a source becomes the tree root.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_ROOT_MATCH)]
    tolerance_root_match: f64,

    /// Offset of the pseudo-root from the tree when no source matches.
    #[arg(long, default_value_t = ToleranceConfig::DEFAULT_ROOT_OFFSET)]
    tolerance_root_offset: f64,

    /// Cap on terminal-group combinations evaluated.
    #[arg(
        long,
        default_value_t = ToleranceConfig::DEFAULT_MAX_COMBINATIONS,
        value_parser = at_least_one()
    )]
    tolerance_max_combinations: usize,

    /// Base topology of the distribution tree.
    #[arg(long, value_enum, default_value_t = Algorithm::Mst)]
    algorithm: Algorithm,

    /// Skip line regularization.
    #[arg(long)]
    no_regularize: bool,

    /// Split the tree into this many balanced partitions.
    #[arg(long, value_parser = at_least_one())]
    partitions: Option<usize>,

    /// Let partitions enter only at the input sources.
    #[arg(long, requires = "partitions")]
    at_sources: bool,

    /// Solver time limit in seconds.
    #[arg(long, default_value_t = PartitionConfig::DEFAULT_TIME_LIMIT_SECS)]
    time_limit: f64,

    /// Write an SVG preview to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = at_least_one())]
    runs: usize,

    /// Print the plan as JSON instead of the diagnostics report.
    #[arg(long)]
    json: bool,

    /// Full plan config as a JSON string.
    ///
    /// When provided, all other tolerance and planning flags are ignored.
    /// The JSON must be a valid `PlanConfig` serialization; missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Tree topology selection.
#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Kruskal minimum spanning tree over the relay-collapsed network.
    Mst,
    /// Union of shortest paths from the sources.
    Spt,
}

/// Build a [`PlanConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual flags are ignored.  Otherwise, a config is assembled from
/// the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PlanConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PlanConfig {
        tolerances: ToleranceConfig {
            merge: cli.tolerance_merge,
            offset: cli.tolerance_offset,
            angle: cli.tolerance_angle.to_radians(),
            capture: cli.tolerance_capture,
            min_nested_area: cli.tolerance_min_nested_area,
            root_match: cli.tolerance_root_match,
            root_offset: cli.tolerance_root_offset,
            max_combinations: cli.tolerance_max_combinations,
        },
        tree_algorithm: match cli.algorithm {
            Algorithm::Mst => TreeAlgorithm::Mst,
            Algorithm::Spt => TreeAlgorithm::Spt,
        },
        regularize: !cli.no_regularize,
        partition: cli.partitions.map(|count| PartitionConfig {
            count,
            at_sources: cli.at_sources,
            time_limit_secs: cli.time_limit,
            ..PartitionConfig::default()
        }),
    })
}

/// Parser for counts that must be positive.
fn at_least_one() -> clap::builder::RangedU64ValueParser<usize> {
    clap::builder::RangedU64ValueParser::new().range(1..)
}

fn read_input(path: &Path) -> Result<PlanInput, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let input = match read_input(&cli.input_path) {
        Ok(input) => input,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        path = %cli.input_path.display(),
        segments = input.segments.len(),
        terminals = input.terminals.len(),
        groups = input.terminal_groups.len(),
        sources = input.sources.len(),
        runs = cli.runs,
        "plenum: input loaded"
    );
    eprintln!("Config: {config:#?}");
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match plenum_topology::process_with_diagnostics(&input, &config, &StdClock) {
            Ok((plan, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&plan) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing plan: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write SVG on the first run only.
                if run == 0
                    && let Some(ref svg_path) = cli.svg
                {
                    write_svg(svg_path, &cli.input_path, &plan, &config);
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Planning error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn write_svg(
    svg_path: &Path,
    input_path: &Path,
    plan: &plenum_topology::NetworkPlan,
    config: &PlanConfig,
) {
    let title = input_path.file_stem().and_then(|s| s.to_str()).unwrap_or("plan");
    let tol = &config.tolerances;
    let desc = format!(
        "merge={} offset={} angle={:.2}deg algorithm={:?}",
        tol.merge,
        tol.offset,
        tol.angle.to_degrees(),
        config.tree_algorithm,
    );
    let config_json = serde_json::to_string(config).ok();
    let metadata = plenum_export::SvgMetadata {
        title: Some(title),
        description: Some(&desc),
        config_json: config_json.as_deref(),
    };
    let svg = plenum_export::to_svg(plan, &metadata);
    match std::fs::write(svg_path, &svg) {
        Ok(()) => {
            eprintln!("SVG written to {} ({} bytes)", svg_path.display(), svg.len());
        }
        Err(e) => {
            eprintln!("Error writing SVG to {}: {e}", svg_path.display());
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PlanDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PlanDiagnostics]) {
    println!();
    println!("Summary ({} runs)\n{}", all_diagnostics.len(), "=".repeat(60));

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Regularize", |d| d.regularize.as_ref().map(|s| s.duration)),
        ("Shatter", |d| Some(d.shatter.duration)),
        ("Faces", |d| Some(d.faces.duration)),
        ("Network", |d| Some(d.network.duration)),
        ("Partition", |d| d.partition.as_ref().map(|s| s.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
