//! Error types for the probabilistic-clustering core library.
//!
//! Defines error enums exposed by the public API and a convenient result alias,
//! following the paired error/error-code convention used across this crate.

use std::fmt;

use thiserror::Error;

/// Stable codes describing [`GraphIoError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum GraphIoErrorCode {
    /// A data line did not have the expected `SRC\tDST[\tPROB]` shape.
    MalformedLine,
    /// A probability field could not be parsed as a finite number.
    InvalidProbability,
    /// A probability field was outside the valid `(0, 1]` range.
    ProbabilityOutOfRange,
    /// The input contained no edges.
    EmptyGraph,
    /// Reading the underlying source failed.
    Io,
}

impl GraphIoErrorCode {
    /// Return the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedLine => "GRAPH_IO_MALFORMED_LINE",
            Self::InvalidProbability => "GRAPH_IO_INVALID_PROBABILITY",
            Self::ProbabilityOutOfRange => "GRAPH_IO_PROBABILITY_OUT_OF_RANGE",
            Self::EmptyGraph => "GRAPH_IO_EMPTY_GRAPH",
            Self::Io => "GRAPH_IO_IO_FAILURE",
        }
    }
}

impl fmt::Display for GraphIoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error produced while loading an uncertain graph from an edge list.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GraphIoError {
    /// A data line did not have the expected `SRC\tDST[\tPROB]` shape.
    #[error("line {line}: expected `SRC\\tDST[\\tPROB]`, got `{content}`")]
    MalformedLine {
        /// 1-based line number of the offending line.
        line: usize,
        /// The offending line's trimmed content.
        content: String,
    },
    /// A probability field could not be parsed as a finite number.
    #[error("line {line}: probability field `{field}` is not a number")]
    InvalidProbability {
        /// 1-based line number of the offending line.
        line: usize,
        /// The unparseable probability field's raw text.
        field: String,
    },
    /// A probability field was outside the valid `(0, 1]` range.
    #[error("line {line}: probability {value} is outside (0, 1]")]
    ProbabilityOutOfRange {
        /// 1-based line number of the offending line.
        line: usize,
        /// The out-of-range probability value.
        value: f64,
    },
    /// The input contained no edges.
    #[error("graph source contains no edges")]
    EmptyGraph,
    /// Reading the underlying source failed.
    #[error("failed to read graph source: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },
}

impl GraphIoError {
    /// Retrieve the stable [`GraphIoErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> GraphIoErrorCode {
        match self {
            Self::MalformedLine { .. } => GraphIoErrorCode::MalformedLine,
            Self::InvalidProbability { .. } => GraphIoErrorCode::InvalidProbability,
            Self::ProbabilityOutOfRange { .. } => GraphIoErrorCode::ProbabilityOutOfRange,
            Self::EmptyGraph => GraphIoErrorCode::EmptyGraph,
            Self::Io { .. } => GraphIoErrorCode::Io,
        }
    }
}

/// Stable codes describing [`ClusteringError`] variants.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ClusteringErrorCode {
    /// The target cluster count was smaller than the number of connected
    /// components in the input graph.
    TargetBelowComponents,
    /// The probing loop exhausted its threshold range without reaching a
    /// valid clustering.
    ThresholdExhausted,
    /// An internal invariant was violated; this should never arise in a
    /// correct implementation.
    InvariantViolation,
}

impl ClusteringErrorCode {
    /// Return the stable machine-readable representation of this error code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TargetBelowComponents => "CLUSTERING_TARGET_BELOW_COMPONENTS",
            Self::ThresholdExhausted => "CLUSTERING_THRESHOLD_EXHAUSTED",
            Self::InvariantViolation => "CLUSTERING_INVARIANT_VIOLATION",
        }
    }
}

impl fmt::Display for ClusteringErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type produced while running a clustering engine.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClusteringError {
    /// The target cluster count was smaller than the number of connected
    /// components in the input graph.
    #[error("target {target} is smaller than the graph's {components} connected components")]
    TargetBelowComponents {
        /// The requested target cluster count.
        target: usize,
        /// The input graph's actual connected-component count.
        components: usize,
    },
    /// The probing loop exhausted its threshold range without reaching a
    /// valid clustering.
    #[error(
        "threshold search exhausted at p_curr={terminal_p_curr} with {uncovered} vertices still uncovered"
    )]
    ThresholdExhausted {
        /// The threshold the search had reached when it gave up.
        terminal_p_curr: f64,
        /// Number of vertices still uncovered at that threshold.
        uncovered: usize,
    },
    /// An internal invariant was violated; this should never arise in a
    /// correct implementation.
    #[error("internal invariant violated: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },
}

impl ClusteringError {
    /// Retrieve the stable [`ClusteringErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> ClusteringErrorCode {
        match self {
            Self::TargetBelowComponents { .. } => ClusteringErrorCode::TargetBelowComponents,
            Self::ThresholdExhausted { .. } => ClusteringErrorCode::ThresholdExhausted,
            Self::InvariantViolation { .. } => ClusteringErrorCode::InvariantViolation,
        }
    }
}

/// Convenient alias for results returned by the graph I/O layer.
pub type GraphIoResult<T> = core::result::Result<T, GraphIoError>;

/// Convenient alias for results returned by the clustering engines.
pub type ClusteringResult<T> = core::result::Result<T, ClusteringError>;
