//! JSON experiment report writer (§4.11).
//!
//! Builds a typed report document from a finished clustering run and writes
//! it to disk, optionally bzip2-compressed. Modelled as `serde`-serialisable
//! structs rather than a hand-built `serde_json::Value` tree.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use bzip2::Compression;
use bzip2::write::BzEncoder;
use chrono::Utc;
use probcluster_core::clustering::Clustering;
use probcluster_core::graph::UncertainGraph;
use probcluster_core::scores::Scores;
use serde::Serialize;
use thiserror::Error;

use crate::cli::{Algorithm, RunArgs};

const GIT_REVISION: &str = match option_env!("GIT_REVISION") {
    Some(revision) => revision,
    None => "unknown",
};

/// One row of the `clustering` table: a vertex's final assignment.
#[derive(Clone, Debug, Serialize)]
pub struct ClusteringRow {
    /// The vertex's id.
    pub id: u32,
    /// The id of the center this vertex is assigned to.
    pub center_id: u32,
    /// The vertex's label.
    pub label: String,
    /// The assigned center's label.
    pub center_label: String,
    /// The vertex's reliable connection probability to its center.
    pub probability: f64,
}

/// The `performance` table: wall-clock cost of the run.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct PerformanceTable {
    /// Elapsed wall-clock time, in milliseconds.
    pub elapsed_ms: u128,
}

/// Diagnostics specific to the engine that produced the clustering, folded
/// into the `algorithm-info` table.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AlgorithmInfoTable {
    /// Which engine produced this clustering.
    pub algorithm: String,
    /// The threshold the engine's probing loop settled at.
    pub terminal_p_curr: f64,
    /// Min-prob only: vertices promoted to singleton clusters by the slack
    /// fast-exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_slack: Option<usize>,
    /// Min-prob only: vertices attached by the post-loop degenerate
    /// fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degenerate_fallback_count: Option<usize>,
    /// Avg-prob only: vertices attached by the post-loop re-sampling
    /// augmentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augmented_count: Option<usize>,
    /// Concurrent only: number of centers before any shrink pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_center_count: Option<usize>,
    /// Concurrent only: whether the shrink pass ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shrunk: Option<bool>,
}

/// The `average-probability` table: avg-prob's achieved coverage score.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AverageProbabilityTable {
    /// Sum of covered probabilities over all vertices in the final
    /// clustering.
    pub score: f64,
}

/// All tables in a report document.
#[derive(Clone, Debug, Serialize)]
pub struct Tables {
    /// One row per vertex.
    pub clustering: Vec<ClusteringRow>,
    /// Wall-clock cost of the run.
    pub performance: PerformanceTable,
    /// Quality measures computed over the final clustering.
    pub scores: Scores,
    /// Present only for the avg-prob engine.
    #[serde(rename = "average-probability", skip_serializing_if = "Option::is_none")]
    pub average_probability: Option<AverageProbabilityTable>,
    /// Algorithm-specific diagnostics.
    #[serde(rename = "algorithm-info")]
    pub algorithm_info: AlgorithmInfoTable,
}

/// The full report document.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    /// RFC 3339 timestamp of when the run completed.
    pub date: String,
    /// Every configured parameter, plus the build's git revision.
    pub tags: BTreeMap<String, String>,
    /// The run's output tables.
    pub tables: Tables,
}

/// Additional, engine-specific fields folded into a report's `algorithm-info`
/// and `average-probability` tables.
#[derive(Clone, Debug, Default)]
pub struct EngineDiagnostics {
    /// Avg-prob: achieved coverage score.
    pub score: Option<f64>,
    /// Min-prob: vertices promoted by the slack fast-exit.
    pub used_slack: Option<usize>,
    /// Min-prob: vertices attached by the degenerate fallback.
    pub degenerate_fallback_count: Option<usize>,
    /// Avg-prob: vertices attached by the post-loop augmentation.
    pub augmented_count: Option<usize>,
    /// Concurrent: number of centers before the shrink pass.
    pub raw_center_count: Option<usize>,
    /// Concurrent: whether the shrink pass ran.
    pub shrunk: Option<bool>,
}

impl Report {
    /// Builds a report document from a finished run's graph, clustering,
    /// scores, and diagnostics.
    #[must_use]
    pub fn new(
        args: &RunArgs,
        graph: &UncertainGraph,
        terminal_p_curr: f64,
        clustering: &Clustering,
        scores: Scores,
        diagnostics: &EngineDiagnostics,
        elapsed: Duration,
    ) -> Self {
        let clustering_rows = clustering
            .vertices()
            .iter()
            .enumerate()
            .filter_map(|(index, vertex)| {
                let id = u32::try_from(index).expect("vertex count fits in u32");
                let center_id = vertex.center()?;
                Some(ClusteringRow {
                    id,
                    center_id,
                    label: graph.label(id).unwrap_or_default().to_owned(),
                    center_label: graph.label(center_id).unwrap_or_default().to_owned(),
                    probability: vertex.probability(),
                })
            })
            .collect();

        let tags = build_tags(args);

        let algorithm_info = AlgorithmInfoTable {
            algorithm: algorithm_name(args.algorithm).to_owned(),
            terminal_p_curr,
            used_slack: diagnostics.used_slack,
            degenerate_fallback_count: diagnostics.degenerate_fallback_count,
            augmented_count: diagnostics.augmented_count,
            raw_center_count: diagnostics.raw_center_count,
            shrunk: diagnostics.shrunk,
        };

        let average_probability = diagnostics
            .score
            .map(|score| AverageProbabilityTable { score });

        Self {
            date: Utc::now().to_rfc3339(),
            tags,
            tables: Tables {
                clustering: clustering_rows,
                performance: PerformanceTable {
                    elapsed_ms: elapsed.as_millis(),
                },
                scores,
                average_probability,
                algorithm_info,
            },
        }
    }

    /// Serialises this report as JSON and writes it to `path`, bzip2-compressing
    /// the byte stream first when `compressed` is set.
    ///
    /// # Errors
    /// Returns [`ReportError`] if serialisation or the underlying file write
    /// fails.
    pub fn write(&self, path: &Path, compressed: bool) -> Result<(), ReportError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| ReportError::Serialize { source })?;
        let file = File::create(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if compressed {
            let mut encoder = BzEncoder::new(file, Compression::best());
            encoder.write_all(&json).map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            encoder.finish().map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        } else {
            let mut file = file;
            file.write_all(&json).map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        Ok(())
    }
}

fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::MinProb => "min-prob",
        Algorithm::AvgProb => "avg-prob",
        Algorithm::Concurrent => "concurrent",
    }
}

fn build_tags(args: &RunArgs) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("graph".to_owned(), args.graph.display().to_string());
    tags.insert("target".to_owned(), args.target.to_string());
    tags.insert("algorithm".to_owned(), algorithm_name(args.algorithm).to_owned());
    tags.insert("epsilon".to_owned(), args.epsilon.to_string());
    tags.insert("delta".to_owned(), args.delta.to_string());
    tags.insert("rate".to_owned(), args.rate.to_string());
    tags.insert(
        "theory_samples_fraction".to_owned(),
        args.theory_samples_fraction.to_string(),
    );
    tags.insert("seed".to_owned(), args.seed.to_string());
    if let Some(batch) = args.batch {
        tags.insert("batch".to_owned(), batch.to_string());
    }
    if let Some(slack) = args.slack {
        tags.insert("slack".to_owned(), slack.to_string());
    }
    tags.insert("with_acr".to_owned(), args.with_acr.to_string());
    tags.insert("with_avpr".to_owned(), args.with_avpr.to_string());
    tags.insert("git_revision".to_owned(), GIT_REVISION.to_owned());
    tags.insert("package_version".to_owned(), env!("CARGO_PKG_VERSION").to_owned());
    tags
}

/// Errors raised while writing a report document.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report could not be serialised to JSON.
    #[error("failed to serialise report: {source}")]
    Serialize {
        /// Underlying serialisation failure.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the report file failed.
    #[error("failed to write report to `{path}`: {source}")]
    Io {
        /// Path the report was being written to.
        path: std::path::PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}
