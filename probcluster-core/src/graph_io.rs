//! Edge-list loader for [`UncertainGraph`] (§4.10, ambient component C8).
//!
//! Format: one edge per line, `SRC\tDST[\tPROB]`. Lines starting with `#`
//! and blank lines are comments. A missing `PROB` field defaults to `1.0`.
//! Vertex tokens are arbitrary strings, assigned contiguous ids in
//! first-seen order; duplicate undirected edges are silently dropped,
//! first occurrence wins.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{GraphIoError, GraphIoResult};
use crate::graph::{UncertainGraph, UncertainGraphBuilder};

/// Loads an [`UncertainGraph`] from the edge-list file at `path`.
///
/// # Errors
/// Returns [`GraphIoError::Io`] if the file cannot be opened or read, and
/// the line-level variants of [`GraphIoError`] for malformed content. See
/// [`parse_edge_list`] for the exact grammar.
pub fn load_graph(path: &Path) -> GraphIoResult<UncertainGraph> {
    let file = File::open(path).map_err(|source| GraphIoError::Io {
        message: format!("{}: {source}", path.display()),
    })?;
    parse_edge_list(BufReader::new(file))
}

/// Parses the edge-list grammar from any buffered reader, so callers that
/// already hold the text in memory (tests, embedded fixtures) do not need a
/// filesystem round-trip.
///
/// # Errors
/// Returns [`GraphIoError::EmptyGraph`] if no edges are present, and the
/// line-level variants for any line that does not parse.
pub fn parse_edge_list<R: BufRead>(reader: R) -> GraphIoResult<UncertainGraph> {
    let mut builder = UncertainGraphBuilder::new();
    let mut saw_any_edge = false;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|source| GraphIoError::Io {
            message: format!("line {line_number}: {source}"),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split('\t').collect();
        let (src, dst, probability_field) = match fields.as_slice() {
            [src, dst] => (*src, *dst, None),
            [src, dst, prob] => (*src, *dst, Some(*prob)),
            _ => {
                return Err(GraphIoError::MalformedLine {
                    line: line_number,
                    content: trimmed.to_owned(),
                });
            }
        };

        let probability = match probability_field {
            None => 1.0,
            Some(field) => {
                let value: f64 = field.trim().parse().map_err(|_| GraphIoError::InvalidProbability {
                    line: line_number,
                    field: field.to_owned(),
                })?;
                if !(value > 0.0 && value <= 1.0) {
                    return Err(GraphIoError::ProbabilityOutOfRange {
                        line: line_number,
                        value,
                    });
                }
                value
            }
        };

        let left = builder.vertex(src.trim());
        let right = builder.vertex(dst.trim());
        builder
            .edge(left, right, probability)
            .map_err(|value| GraphIoError::ProbabilityOutOfRange {
                line: line_number,
                value,
            })?;
        saw_any_edge = true;
    }

    if !saw_any_edge {
        return Err(GraphIoError::EmptyGraph);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_edges_with_and_without_probability() {
        let text = "A\tB\t0.5\nB\tC\n";
        let graph = parse_edge_list(text.as_bytes()).unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge(0).probability, 0.5);
        assert_eq!(graph.edge(1).probability, 1.0);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# a comment\n\nA\tB\n";
        let graph = parse_edge_list(text.as_bytes()).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn assigns_ids_in_first_seen_order() {
        let text = "B\tA\nA\tC\n";
        let graph = parse_edge_list(text.as_bytes()).unwrap();
        assert_eq!(graph.label(0), Some("B"));
        assert_eq!(graph.label(1), Some("A"));
        assert_eq!(graph.label(2), Some("C"));
    }

    #[test]
    fn deduplicates_undirected_edges_first_wins() {
        let text = "A\tB\t0.9\nB\tA\t0.1\n";
        let graph = parse_edge_list(text.as_bytes()).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(0).probability, 0.9);
    }

    #[test]
    fn rejects_malformed_line() {
        let text = "A\tB\tC\tD\n";
        let result = parse_edge_list(text.as_bytes());
        assert!(matches!(result, Err(GraphIoError::MalformedLine { line: 1, .. })));
    }

    #[test]
    fn rejects_unparseable_probability() {
        let text = "A\tB\tnope\n";
        let result = parse_edge_list(text.as_bytes());
        assert!(matches!(
            result,
            Err(GraphIoError::InvalidProbability { line: 1, .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let text = "A\tB\t1.5\n";
        let result = parse_edge_list(text.as_bytes());
        assert!(matches!(
            result,
            Err(GraphIoError::ProbabilityOutOfRange { line: 1, .. })
        ));
    }

    #[test]
    fn rejects_empty_input() {
        let text = "# nothing but comments\n";
        let result = parse_edge_list(text.as_bytes());
        assert!(matches!(result, Err(GraphIoError::EmptyGraph)));
    }
}
