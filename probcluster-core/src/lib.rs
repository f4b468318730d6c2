//! Uncertain-graph reliability clustering core library.
//!
//! Estimates pairwise connection probabilities in an uncertain graph via
//! Monte-Carlo possible-world sampling, then builds a threshold-covering
//! clustering under one of three engines (min-prob, avg-prob, concurrent)
//! and scores the result.

pub mod cache;
pub mod clustering;
pub mod error;
pub mod graph;
pub mod graph_io;
pub mod guesser;
pub mod memory;
pub mod rng;
pub mod sampler;
pub mod scores;

pub use crate::cache::{CountsCache, CountsElement};
pub use crate::clustering::avg_prob::{AvgProbConfig, AvgProbOutcome};
pub use crate::clustering::concurrent::{ConcurrentConfig, ConcurrentOutcome};
pub use crate::clustering::min_prob::{MinProbConfig, MinProbOutcome};
pub use crate::clustering::{
    CenterSelector, ClusterVertex, Clustering, PreferCachedUncoveredSelector,
};
pub use crate::error::{
    ClusteringError, ClusteringErrorCode, ClusteringResult, GraphIoError, GraphIoErrorCode,
    GraphIoResult,
};
pub use crate::graph::{Edge, EdgeId, UncertainGraph, UncertainGraphBuilder, VertexId};
pub use crate::graph_io::load_graph;
pub use crate::guesser::{
    ExponentialBisectGuesser, GeometricGuesser, Guesser, ScoreMonotoneGuesser, UniformGuesser,
};
pub use crate::memory::{estimate_peak_bytes, format_bytes};
pub use crate::rng::{SplitMix64, Xorshift1024Star, stream_for_worker};
pub use crate::sampler::{ConnectedComponentsSampler, Sampler, SamplerConfig};
pub use crate::scores::{Scores, acr, avg_p, avpr, compute, p_min, sum_p};
