//! Command-line interface orchestration for the probabilistic clustering
//! engine (§4.12).
//!
//! Parses the argument surface of §6 into a [`RunArgs`], loads the graph,
//! dispatches to the selected clustering engine, computes scores, and
//! writes the experiment report.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use probcluster_core::clustering::avg_prob::{self, AvgProbConfig};
use probcluster_core::clustering::concurrent::{self, ConcurrentConfig};
use probcluster_core::clustering::min_prob::{self, MinProbConfig};
use probcluster_core::clustering::Clustering;
use probcluster_core::error::{ClusteringError, ClusteringErrorCode, GraphIoError, GraphIoErrorCode};
use probcluster_core::graph::UncertainGraph;
use probcluster_core::graph_io::load_graph;
use probcluster_core::sampler::{ConnectedComponentsSampler, Sampler, SamplerConfig};
use probcluster_core::scores;

use crate::reporter::{EngineDiagnostics, Report, ReportError};

const DEFAULT_EPSILON: f64 = 0.1;
const DEFAULT_DELTA: f64 = 0.01;
const DEFAULT_RATE: f64 = 0.5;
const DEFAULT_THEORY_SAMPLES_FRACTION: f64 = 0.1;
const DEFAULT_P_LOW: f64 = 0.01;
const DEFAULT_CACHE_CAPACITY: usize = 1024;
const DEFAULT_BATCH_H: usize = 4;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "probcluster",
    about = "Cluster an uncertain graph by pairwise connection reliability."
)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a clustering engine over an uncertain graph.
    Run(RunArgs),
}

/// Which clustering engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Min connection probability (k-center-style) engine (§4.6).
    MinProb,
    /// Average connection probability (k-median-style) engine (§4.7).
    AvgProb,
    /// Batched, fractional-coverage engine (§4.8).
    Concurrent,
}

/// Options accepted by the `run` command.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Path to the edge-list graph file.
    #[arg(long)]
    pub graph: PathBuf,

    /// Target number of clusters.
    #[arg(long)]
    pub target: usize,

    /// Which clustering engine to run.
    #[arg(long, value_enum)]
    pub algorithm: Algorithm,

    /// Additive error bound for the sampler's sample-size theorem.
    #[arg(long, default_value_t = DEFAULT_EPSILON)]
    pub epsilon: f64,

    /// Failure probability bound for the sampler's sample-size theorem.
    #[arg(long, default_value_t = DEFAULT_DELTA)]
    pub delta: f64,

    /// Guesser shrink/bisection rate (gamma).
    #[arg(long, default_value_t = DEFAULT_RATE)]
    pub rate: f64,

    /// Fraction of the theoretical sample-size bound actually used.
    #[arg(long, default_value_t = DEFAULT_THEORY_SAMPLES_FRACTION)]
    pub theory_samples_fraction: f64,

    /// Batch size for the avg-prob and concurrent engines' batched center
    /// selection.
    #[arg(long)]
    pub batch: Option<usize>,

    /// Min-prob only: number of vertices allowed to become singleton
    /// clusters to escape an otherwise-infeasible threshold.
    #[arg(long)]
    pub slack: Option<usize>,

    /// Switches to a bounded-depth BFS sampler. Unsupported in this build;
    /// any value is rejected with [`CliError::UnsupportedDepth`].
    #[arg(long)]
    pub depth: Option<usize>,

    /// Seed for every RNG stream used by the run.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Compute and report Average Cluster Reliability.
    #[arg(long)]
    pub with_acr: bool,

    /// Compute and report inner/outer Average Vertex Pairwise Reliability.
    #[arg(long)]
    pub with_avpr: bool,

    /// Emit debug-level logs.
    #[arg(long)]
    pub debug: bool,

    /// Emit trace-level logs in JSON format.
    #[arg(long)]
    pub trace: bool,

    /// Path to write the JSON experiment report to.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Bzip2-compress the report written to `--output`.
    #[arg(long)]
    pub compress: bool,
}

/// Stable codes describing [`CliError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CliErrorCode {
    /// Loading the graph from disk failed.
    GraphIo,
    /// The clustering engine failed to converge.
    Clustering,
    /// `--depth` was supplied, but the BFS sampler is unsupported.
    UnsupportedDepth,
    /// `--compress` was supplied without `--output`.
    CompressWithoutOutput,
    /// Writing the report failed.
    Report,
}

impl CliErrorCode {
    /// Return the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GraphIo => "CLI_GRAPH_IO",
            Self::Clustering => "CLI_CLUSTERING",
            Self::UnsupportedDepth => "CLI_UNSUPPORTED_DEPTH",
            Self::CompressWithoutOutput => "CLI_COMPRESS_WITHOUT_OUTPUT",
            Self::Report => "CLI_REPORT",
        }
    }
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading the graph from disk failed.
    #[error(transparent)]
    GraphIo(#[from] GraphIoError),
    /// The clustering engine failed to converge.
    #[error(transparent)]
    Clustering(#[from] ClusteringError),
    /// `--depth` was supplied, but the BFS sampler is unsupported.
    #[error("--depth {depth} requests the BFS sampler, which is unsupported in this build")]
    UnsupportedDepth {
        /// The depth value the caller requested.
        depth: usize,
    },
    /// `--compress` was supplied without `--output`.
    #[error("--compress has no effect without --output")]
    CompressWithoutOutput,
    /// Writing the report failed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl CliError {
    /// Retrieve the stable [`CliErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> CliErrorCode {
        match self {
            Self::GraphIo(_) => CliErrorCode::GraphIo,
            Self::Clustering(_) => CliErrorCode::Clustering,
            Self::UnsupportedDepth { .. } => CliErrorCode::UnsupportedDepth,
            Self::CompressWithoutOutput => CliErrorCode::CompressWithoutOutput,
            Self::Report(_) => CliErrorCode::Report,
        }
    }

    /// The inner [`GraphIoErrorCode`], when this error wraps a graph I/O
    /// failure.
    #[must_use]
    pub const fn graph_io_code(&self) -> Option<GraphIoErrorCode> {
        match self {
            Self::GraphIo(source) => Some(source.code()),
            _ => None,
        }
    }

    /// The inner [`ClusteringErrorCode`], when this error wraps a clustering
    /// failure.
    #[must_use]
    pub const fn clustering_code(&self) -> Option<ClusteringErrorCode> {
        match self {
            Self::Clustering(source) => Some(source.code()),
            _ => None,
        }
    }
}

/// Summarises the outcome of executing the `run` command, for rendering to
/// stdout.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// Which engine produced the clustering.
    pub algorithm: Algorithm,
    /// Number of clusters produced.
    pub num_clusters: usize,
    /// Minimum connection probability over all vertices.
    pub p_min: f64,
    /// Average connection probability over all vertices.
    pub avg_p: f64,
    /// Wall-clock elapsed time for the clustering run.
    pub elapsed_ms: u128,
    /// Path the full report was written to, if `--output` was supplied.
    pub report_path: Option<PathBuf>,
}

/// Writes a short human-readable summary of `summary` to `writer`.
///
/// # Errors
/// Returns an I/O error if writing fails.
pub fn render_summary(
    summary: &ExecutionSummary,
    writer: &mut impl std::io::Write,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "{algorithm:?}: {clusters} clusters, p_min={p_min:.4}, avg_p={avg_p:.4}, {elapsed}ms",
        algorithm = summary.algorithm,
        clusters = summary.num_clusters,
        p_min = summary.p_min,
        avg_p = summary.avg_p,
        elapsed = summary.elapsed_ms,
    )?;
    if let Some(path) = &summary.report_path {
        writeln!(writer, "report written to {}", path.display())?;
    }
    Ok(())
}

/// Executes the `run` command described by `cli`.
///
/// # Errors
/// Returns [`CliError`] if the graph cannot be loaded, the requested
/// clustering engine fails to converge, `--depth` was supplied, or the
/// report cannot be written.
#[tracing::instrument(skip(cli), fields(algorithm))]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    let Command::Run(args) = cli.command;
    tracing::Span::current().record("algorithm", tracing::field::debug(args.algorithm));

    if let Some(depth) = args.depth {
        return Err(CliError::UnsupportedDepth { depth });
    }
    if args.compress && args.output.is_none() {
        return Err(CliError::CompressWithoutOutput);
    }

    let graph = load_graph(&args.graph)?;
    let components = graph.connected_component_count();

    let sampler_config = SamplerConfig {
        epsilon: args.epsilon,
        delta: args.delta,
        theory_samples_fraction: args.theory_samples_fraction,
    };
    let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config, args.seed);

    let started = Instant::now();
    let (clustering, terminal_p_curr, diagnostics) =
        run_engine(&mut sampler, components, &args)?;
    let elapsed = started.elapsed();

    let quality = scores::compute(&sampler, &clustering, args.with_acr, args.with_avpr);

    let report = Report::new(
        &args,
        &graph,
        terminal_p_curr,
        &clustering,
        quality,
        &diagnostics,
        elapsed,
    );

    let report_path = if let Some(path) = &args.output {
        report.write(path, args.compress)?;
        Some(path.clone())
    } else {
        None
    };

    Ok(ExecutionSummary {
        algorithm: args.algorithm,
        num_clusters: quality.num_clusters,
        p_min: quality.p_min,
        avg_p: quality.avg_p,
        elapsed_ms: elapsed.as_millis(),
        report_path,
    })
}

fn run_engine(
    sampler: &mut ConnectedComponentsSampler<'_>,
    components: usize,
    args: &RunArgs,
) -> Result<(Clustering, f64, EngineDiagnostics), CliError> {
    match args.algorithm {
        Algorithm::MinProb => {
            let config = MinProbConfig {
                target_k: args.target,
                slack: args.slack.unwrap_or(0),
                gamma: args.rate,
                p_low: DEFAULT_P_LOW,
                seed: args.seed,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                randomized_center_selection: false,
            };
            let outcome = min_prob::run(sampler, components, &config)?;
            let diagnostics = EngineDiagnostics {
                used_slack: Some(outcome.used_slack),
                degenerate_fallback_count: Some(outcome.degenerate_fallback_count),
                ..EngineDiagnostics::default()
            };
            Ok((outcome.clustering, outcome.terminal_p_curr, diagnostics))
        }
        Algorithm::AvgProb => {
            let config = AvgProbConfig {
                target_k: args.target,
                gamma: args.rate,
                p_low: DEFAULT_P_LOW,
                seed: args.seed,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                randomized_center_selection: false,
                batch_size: args.batch,
            };
            let outcome = avg_prob::run(sampler, components, &config)?;
            let diagnostics = EngineDiagnostics {
                score: Some(outcome.score),
                augmented_count: Some(outcome.augmented_count),
                ..EngineDiagnostics::default()
            };
            Ok((outcome.clustering, outcome.terminal_p_curr, diagnostics))
        }
        Algorithm::Concurrent => {
            let config = ConcurrentConfig {
                target_k: args.target,
                batch_h: args.batch.unwrap_or(DEFAULT_BATCH_H),
                p_low: DEFAULT_P_LOW,
                seed: args.seed,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                shrink: true,
            };
            let outcome = concurrent::run(sampler, components, &config)?;
            let diagnostics = EngineDiagnostics {
                raw_center_count: Some(outcome.raw_center_count),
                shrunk: Some(outcome.shrunk),
                ..EngineDiagnostics::default()
            };
            Ok((outcome.clustering, outcome.terminal_p_curr, diagnostics))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use probcluster_test_support::fixtures::{three_triangles_graph, triangle_graph, two_components_graph};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn write_graph(graph: &UncertainGraph) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for edge in graph.edges() {
            writeln!(
                file,
                "{}\t{}\t{}",
                graph.label(edge.left).unwrap(),
                graph.label(edge.right).unwrap(),
                edge.probability
            )
            .unwrap();
        }
        file
    }

    fn base_args(graph_path: PathBuf, target: usize, algorithm: Algorithm) -> RunArgs {
        RunArgs {
            graph: graph_path,
            target,
            algorithm,
            epsilon: 0.2,
            delta: 0.1,
            rate: 0.3,
            theory_samples_fraction: 0.2,
            batch: None,
            slack: Some(0),
            depth: None,
            seed: 1,
            with_acr: false,
            with_avpr: false,
            debug: false,
            trace: false,
            output: None,
            compress: false,
        }
    }

    #[test]
    fn run_cli_clusters_a_triangle() {
        let graph = triangle_graph();
        let file = write_graph(&graph);
        let args = base_args(file.path().to_path_buf(), 1, Algorithm::MinProb);
        let cli = Cli {
            command: Command::Run(args),
        };

        let summary = run_cli(cli).unwrap();
        assert_eq!(summary.num_clusters, 1);
        assert_eq!(summary.p_min, 1.0);
    }

    #[test]
    fn run_cli_rejects_target_below_components() {
        let graph = two_components_graph();
        let file = write_graph(&graph);
        let args = base_args(file.path().to_path_buf(), 1, Algorithm::MinProb);
        let cli = Cli {
            command: Command::Run(args),
        };

        let err = run_cli(cli).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::Clustering);
    }

    #[test]
    fn run_cli_rejects_depth() {
        let graph = triangle_graph();
        let file = write_graph(&graph);
        let mut args = base_args(file.path().to_path_buf(), 1, Algorithm::MinProb);
        args.depth = Some(3);
        let cli = Cli {
            command: Command::Run(args),
        };

        let err = run_cli(cli).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::UnsupportedDepth);
    }

    #[test]
    fn run_cli_rejects_compress_without_output() {
        let graph = triangle_graph();
        let file = write_graph(&graph);
        let mut args = base_args(file.path().to_path_buf(), 1, Algorithm::MinProb);
        args.compress = true;
        let cli = Cli {
            command: Command::Run(args),
        };

        let err = run_cli(cli).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::CompressWithoutOutput);
    }

    #[test]
    fn run_cli_writes_report_when_output_given() {
        let graph = triangle_graph();
        let file = write_graph(&graph);
        let report_dir = tempfile::tempdir().unwrap();
        let report_path = report_dir.path().join("report.json");
        let mut args = base_args(file.path().to_path_buf(), 1, Algorithm::MinProb);
        args.output = Some(report_path.clone());
        let cli = Cli {
            command: Command::Run(args),
        };

        let summary = run_cli(cli).unwrap();
        assert_eq!(summary.report_path, Some(report_path.clone()));
        assert!(report_path.exists());
    }

    #[test]
    fn run_cli_runs_avg_prob_engine() {
        let graph = three_triangles_graph(true);
        let file = write_graph(&graph);
        let args = base_args(file.path().to_path_buf(), 1, Algorithm::AvgProb);
        let cli = Cli {
            command: Command::Run(args),
        };

        let summary = run_cli(cli).unwrap();
        assert_eq!(summary.algorithm, Algorithm::AvgProb);
    }

    #[test]
    fn run_cli_runs_concurrent_engine() {
        let graph = three_triangles_graph(true);
        let file = write_graph(&graph);
        let args = base_args(file.path().to_path_buf(), 1, Algorithm::Concurrent);
        let cli = Cli {
            command: Command::Run(args),
        };

        let summary = run_cli(cli).unwrap();
        assert_eq!(summary.algorithm, Algorithm::Concurrent);
    }
}
