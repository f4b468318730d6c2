//! Quality measures computed over a finished clustering (§4.9).
//!
//! `p_min` and `avg_p` close the feedback loop for the probing search
//! itself; ACR and inner/outer AVPR are optional diagnostics requested via
//! `--with-acr`/`--with-avpr` and folded into the reporter's `scores` table.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::clustering::Clustering;
use crate::graph::VertexId;
use crate::sampler::Sampler;

/// The minimum connection probability over all vertices in `clustering`.
/// Centers contribute `1.0`.
#[must_use]
pub fn p_min(clustering: &Clustering) -> f64 {
    clustering
        .vertices()
        .iter()
        .map(|v| v.probability())
        .fold(f64::INFINITY, f64::min)
}

/// The sum of every vertex's connection probability.
#[must_use]
pub fn sum_p(clustering: &Clustering) -> f64 {
    clustering.vertices().iter().map(|v| v.probability()).sum()
}

/// `sum_p(clustering) / clustering.len()`. Zero for an empty clustering.
#[must_use]
pub fn avg_p(clustering: &Clustering) -> f64 {
    let n = clustering.len();
    if n == 0 {
        0.0
    } else {
        #[expect(
            clippy::cast_precision_loss,
            reason = "vertex counts are far below f64's exact-integer range"
        )]
        let n_f64 = n as f64;
        sum_p(clustering) / n_f64
    }
}

/// Groups vertex ids by their assigned center, in ascending center-id order.
/// Each returned group's first element is its center.
fn clusters_by_center(clustering: &Clustering) -> Vec<Vec<VertexId>> {
    let centers = clustering.center_ids();
    let mut index_of: HashMap<VertexId, usize> = HashMap::with_capacity(centers.len());
    let mut groups: Vec<Vec<VertexId>> = Vec::with_capacity(centers.len());
    for (index, &center) in centers.iter().enumerate() {
        index_of.insert(center, index);
        groups.push(Vec::new());
    }
    for i in 0..clustering.len() {
        let id = u32::try_from(i).expect("vertex count fits in u32");
        if let Some(center) = clustering.get(id).center() {
            if let Some(&group) = index_of.get(&center) {
                groups[group].push(id);
            }
        }
    }
    groups
}

/// Average Cluster Reliability: `(sum_C |C| * R(C)) / (sum_C |C|)`, where
/// `R(C)` is the fraction of sampled worlds in which every vertex of `C`
/// shares a single component. Returns `1.0` for an empty clustering or a
/// sampler with no sampled worlds (vacuously reliable).
#[must_use]
pub fn acr<S: Sampler>(sampler: &S, clustering: &Clustering) -> f64 {
    let worlds = sampler.used_worlds();
    let clusters = clusters_by_center(clustering);
    let total: usize = clusters.iter().map(Vec::len).sum();
    if total == 0 || worlds.is_empty() {
        return 1.0;
    }

    let weighted_reliable: f64 = clusters
        .par_iter()
        .map(|members| {
            let Some(&first) = members.first() else {
                return 0.0;
            };
            let reliable_worlds = worlds
                .iter()
                .filter(|world| {
                    let first_component = world[first as usize];
                    members
                        .iter()
                        .all(|&v| world[v as usize] == first_component)
                })
                .count();
            #[expect(
                clippy::cast_precision_loss,
                reason = "sample and member counts are far below f64's exact-integer range"
            )]
            let reliability = reliable_worlds as f64 / worlds.len() as f64;
            #[expect(
                clippy::cast_precision_loss,
                reason = "cluster sizes are far below f64's exact-integer range"
            )]
            let size = members.len() as f64;
            size * reliability
        })
        .sum();

    #[expect(
        clippy::cast_precision_loss,
        reason = "vertex counts are far below f64's exact-integer range"
    )]
    let total_f64 = total as f64;
    weighted_reliable / total_f64
}

/// Inner and outer counts accumulated for a single cluster over one world.
#[derive(Clone, Copy, Default)]
struct WorldCounts {
    inner: u64,
    outer: u64,
}

/// Folds one world's contribution to every cluster's inner/outer counts.
fn accumulate_world(world: &[VertexId], clusters: &[Vec<VertexId>]) -> Vec<WorldCounts> {
    let n = world.len();
    let mut component_size = vec![0u32; n];
    for &component in world {
        component_size[component as usize] += 1;
    }

    let mut counts = vec![WorldCounts::default(); clusters.len()];
    // Sparse per-cluster intersection map: (cluster index, component id) ->
    // member count, built once per world and folded into the dense
    // cluster-indexed counters below.
    let mut intersections: HashMap<(usize, VertexId), u32> = HashMap::new();
    for (cluster_index, members) in clusters.iter().enumerate() {
        for &v in members {
            let component = world[v as usize];
            *intersections.entry((cluster_index, component)).or_insert(0) += 1;
        }
    }

    for ((cluster_index, component), member_count) in intersections {
        let m = u64::from(member_count);
        let k_size = u64::from(component_size[component as usize]);
        counts[cluster_index].inner += m.saturating_mul(m.saturating_sub(1)) / 2;
        counts[cluster_index].outer += m.saturating_mul(k_size.saturating_sub(m));
    }
    counts
}

fn sum_world_counts(mut a: Vec<WorldCounts>, b: Vec<WorldCounts>) -> Vec<WorldCounts> {
    for (x, y) in a.iter_mut().zip(b.iter()) {
        x.inner += y.inner;
        x.outer += y.outer;
    }
    a
}

/// Average Vertex Pairwise Reliability, both the inner (within-cluster) and
/// outer (cross-cluster) variants, computed in parallel across the
/// sampler's currently-used worlds. Both results lie in `[0, 1]`; a zero
/// normalisation denominator (e.g. every cluster a singleton, for inner; a
/// single all-covering cluster, for outer) yields `1.0` for that side,
/// vacuously.
#[must_use]
pub fn avpr<S: Sampler>(sampler: &S, clustering: &Clustering) -> (f64, f64) {
    let worlds = sampler.used_worlds();
    let clusters = clusters_by_center(clustering);
    let n = clustering.len();

    let inner_denominator: u64 = clusters
        .iter()
        .map(|c| {
            let size = u64::try_from(c.len()).expect("cluster size fits in u64");
            size.saturating_mul(size.saturating_sub(1)) / 2
        })
        .sum();
    let n_u64 = u64::try_from(n).expect("vertex count fits in u64");
    let outer_denominator: u64 = clusters
        .iter()
        .map(|c| {
            let size = u64::try_from(c.len()).expect("cluster size fits in u64");
            size.saturating_mul(n_u64.saturating_sub(size))
        })
        .sum();

    if worlds.is_empty() {
        return (1.0, 1.0);
    }

    let totals = worlds
        .par_iter()
        .map(|world| accumulate_world(world, &clusters))
        .reduce(|| vec![WorldCounts::default(); clusters.len()], sum_world_counts);

    let inner_total: u64 = totals.iter().map(|c| c.inner).sum();
    let outer_total: u64 = totals.iter().map(|c| c.outer).sum();

    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts and pair totals are far below f64's exact-integer range"
    )]
    let worlds_f64 = worlds.len() as f64;

    let inner_avpr = if inner_denominator == 0 {
        1.0
    } else {
        #[expect(
            clippy::cast_precision_loss,
            reason = "pair counts are far below f64's exact-integer range"
        )]
        let numerator = inner_total as f64 / worlds_f64;
        #[expect(
            clippy::cast_precision_loss,
            reason = "pair counts are far below f64's exact-integer range"
        )]
        let denominator = inner_denominator as f64;
        numerator / denominator
    };

    let outer_avpr = if outer_denominator == 0 {
        1.0
    } else {
        #[expect(
            clippy::cast_precision_loss,
            reason = "pair counts are far below f64's exact-integer range"
        )]
        let numerator = outer_total as f64 / worlds_f64;
        #[expect(
            clippy::cast_precision_loss,
            reason = "pair counts are far below f64's exact-integer range"
        )]
        let denominator = outer_denominator as f64;
        numerator / denominator
    };

    (inner_avpr, outer_avpr)
}

/// The full set of quality measures reported for a finished clustering.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Scores {
    /// Minimum connection probability over all vertices.
    pub p_min: f64,
    /// Sum of connection probabilities over all vertices.
    pub sum_p: f64,
    /// `sum_p / n`.
    pub avg_p: f64,
    /// Number of centers in the clustering.
    pub num_clusters: usize,
    /// Average Cluster Reliability, when requested.
    pub acr: Option<f64>,
    /// Inner (within-cluster) Average Vertex Pairwise Reliability, when
    /// requested.
    pub inner_avpr: Option<f64>,
    /// Outer (cross-cluster) Average Vertex Pairwise Reliability, when
    /// requested.
    pub outer_avpr: Option<f64>,
}

/// Computes the mandatory scores (`p_min`, `sum_p`, `avg_p`, `num_clusters`)
/// and, when requested, ACR and inner/outer AVPR.
#[must_use]
pub fn compute<S: Sampler>(
    sampler: &S,
    clustering: &Clustering,
    with_acr: bool,
    with_avpr: bool,
) -> Scores {
    let (acr_value, (inner, outer)) = match (with_acr, with_avpr) {
        (false, false) => (None, (None, None)),
        (true, false) => (Some(acr(sampler, clustering)), (None, None)),
        (false, true) => {
            let (i, o) = avpr(sampler, clustering);
            (None, (Some(i), Some(o)))
        }
        (true, true) => {
            let (i, o) = avpr(sampler, clustering);
            (Some(acr(sampler, clustering)), (Some(i), Some(o)))
        }
    };

    Scores {
        p_min: p_min(clustering),
        sum_p: sum_p(clustering),
        avg_p: avg_p(clustering),
        num_clusters: clustering.center_count(),
        acr: acr_value,
        inner_avpr: inner,
        outer_avpr: outer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UncertainGraphBuilder;
    use crate::sampler::{ConnectedComponentsSampler, SamplerConfig};

    fn sampler_config() -> SamplerConfig {
        SamplerConfig {
            epsilon: 0.2,
            delta: 0.1,
            theory_samples_fraction: 0.2,
        }
    }

    #[test]
    fn triangle_with_certain_edges_has_perfect_scores() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(b, c, 1.0).unwrap();
        builder.edge(a, c, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 1);
        sampler.min_probability(0.5);

        let mut clustering = Clustering::new(graph.vertex_count());
        clustering.get_mut(a).make_center(a);
        let mut estimates = vec![0.0; graph.vertex_count()];
        sampler.connection_probabilities(a, &mut estimates);
        clustering.get_mut(b).cover(a, estimates[b as usize]);
        clustering.get_mut(c).cover(a, estimates[c as usize]);

        let scores = compute(&sampler, &clustering, true, true);
        assert_eq!(scores.p_min, 1.0);
        assert_eq!(scores.avg_p, 1.0);
        assert_eq!(scores.num_clusters, 1);
        assert_eq!(scores.acr, Some(1.0));
        assert_eq!(scores.inner_avpr, Some(1.0));
        assert_eq!(scores.outer_avpr, Some(1.0));
    }

    #[test]
    fn three_disjoint_triangles_have_zero_outer_avpr() {
        let mut builder = UncertainGraphBuilder::new();
        let mut clustering_centers = Vec::new();
        for group in 0..3 {
            let a = builder.vertex(&format!("{group}-a"));
            let b = builder.vertex(&format!("{group}-b"));
            let c = builder.vertex(&format!("{group}-c"));
            builder.edge(a, b, 1.0).unwrap();
            builder.edge(b, c, 1.0).unwrap();
            builder.edge(a, c, 1.0).unwrap();
            clustering_centers.push((a, b, c));
        }
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 2);
        sampler.min_probability(0.5);

        let mut clustering = Clustering::new(graph.vertex_count());
        let mut estimates = vec![0.0; graph.vertex_count()];
        for &(a, b, c) in &clustering_centers {
            clustering.get_mut(a).make_center(a);
            sampler.connection_probabilities(a, &mut estimates);
            clustering.get_mut(b).cover(a, estimates[b as usize]);
            clustering.get_mut(c).cover(a, estimates[c as usize]);
        }

        let scores = compute(&sampler, &clustering, true, true);
        assert_eq!(scores.num_clusters, 3);
        assert_eq!(scores.acr, Some(1.0));
        assert_eq!(scores.inner_avpr, Some(1.0));
        assert_eq!(scores.outer_avpr, Some(0.0));
    }

    #[test]
    fn p_min_reports_the_worst_vertex() {
        let mut clustering = Clustering::new(3);
        clustering.get_mut(0).make_center(0);
        clustering.get_mut(1).cover(0, 0.9);
        clustering.get_mut(2).cover(0, 0.4);
        assert_eq!(p_min(&clustering), 0.4);
    }

    #[test]
    fn avg_p_averages_over_every_vertex() {
        let mut clustering = Clustering::new(2);
        clustering.get_mut(0).make_center(0);
        clustering.get_mut(1).cover(0, 0.5);
        assert!((avg_p(&clustering) - 0.75).abs() < 1e-12);
    }
}
