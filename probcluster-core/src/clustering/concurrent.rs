//! Concurrent (batched, fractional-coverage) clustering engine (§4.8).
//!
//! Unlike the min-prob and avg-prob engines, this variant does not pick
//! centers one at a time against a fixed `target_k`: it grows a set of
//! centers in batches until every vertex is covered, then (optionally)
//! contracts the resulting centers down to `target_k` super-centers by
//! greedy star-contraction.

use tracing::instrument;

use crate::cache::CountsCache;
use crate::error::{ClusteringError, ClusteringResult};
use crate::graph::VertexId;
use crate::rng::Xorshift1024Star;
use crate::sampler::Sampler;

use super::Clustering;

/// Parameters controlling a concurrent clustering run.
#[derive(Clone, Copy, Debug)]
pub struct ConcurrentConfig {
    /// Target number of super-centers after the shrink pass.
    pub target_k: usize,
    /// Expected number of new centers selected per batch.
    pub batch_h: usize,
    /// Lowest threshold the halving search will ever probe before the run
    /// fails with [`ClusteringError::ThresholdExhausted`].
    pub p_low: f64,
    /// Seed for the engine's center-selection RNG.
    pub seed: u64,
    /// Capacity of the counts cache.
    pub cache_capacity: usize,
    /// Whether to run the shrink pass when more than `target_k` centers
    /// were produced by the main loop.
    pub shrink: bool,
}

/// The result of a completed concurrent clustering run.
#[derive(Clone, Debug)]
pub struct ConcurrentOutcome {
    /// The final clustering.
    pub clustering: Clustering,
    /// The threshold the main loop settled at when it finished covering
    /// every vertex.
    pub terminal_p_curr: f64,
    /// Number of centers produced by the main loop, before any shrink pass.
    pub raw_center_count: usize,
    /// Whether the shrink pass ran (it is a no-op if the main loop already
    /// produced at most `target_k` centers).
    pub shrunk: bool,
}

/// Selects a fresh batch of centers from the uncovered set, independently
/// retaining each uncovered vertex with probability `min(1, h / uncovered)`.
/// Falls back to a single uniformly-chosen center if the random draw
/// selects none, so the main loop always makes progress.
fn select_batch(
    vinfo: &Clustering,
    rng: &mut Xorshift1024Star,
    batch_h: usize,
) -> Vec<VertexId> {
    let uncovered: Vec<VertexId> = (0..vinfo.len())
        .filter_map(|i| {
            let id = u32::try_from(i).expect("vertex count fits in u32");
            (!vinfo.get(id).is_covered()).then_some(id)
        })
        .collect();

    #[expect(
        clippy::cast_precision_loss,
        reason = "batch size and uncovered count are far below f64's exact-integer range"
    )]
    let retain_probability = (batch_h as f64 / uncovered.len() as f64).min(1.0);

    let mut batch: Vec<VertexId> = uncovered
        .iter()
        .copied()
        .filter(|_| rng.next_f64() < retain_probability)
        .collect();

    if batch.is_empty() {
        batch.push(uncovered[rng.next_below(uncovered.len())]);
    }
    batch
}

/// Covers at least `half_of(uncovered)` additional vertices from the
/// current batch of centers, halving `p_curr` (and regrowing the sample
/// pool) whenever too few vertices clear the current threshold.
fn cover_half<S: Sampler>(
    sampler: &mut S,
    cache: &mut CountsCache,
    vinfo: &mut Clustering,
    batch: &[VertexId],
    p_curr: &mut f64,
    p_low: f64,
) -> ClusteringResult<()> {
    let n = vinfo.len();
    let mut estimates = vec![0.0; n];

    loop {
        let uncovered = vinfo.uncovered_count();
        if uncovered == 0 {
            return Ok(());
        }
        let target_new_coverage = uncovered.div_ceil(2);

        // Track the best-probability center per vertex so a vertex reachable
        // from more than one batch center is only counted once against
        // `target_new_coverage`.
        let mut best: Vec<Option<(f64, VertexId)>> = vec![None; n];
        for &center in batch {
            sampler.connection_probabilities_cache(center, cache, &mut estimates);
            for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
                if vinfo.get(i).is_covered() {
                    continue;
                }
                let probability = estimates[i as usize];
                if probability < *p_curr {
                    continue;
                }
                let slot = &mut best[i as usize];
                if slot.is_none_or(|(best_probability, _)| probability > best_probability) {
                    *slot = Some((probability, center));
                }
            }
        }

        if best.iter().filter(|candidate| candidate.is_some()).count() < target_new_coverage {
            *p_curr /= 2.0;
            if *p_curr < p_low {
                return Err(ClusteringError::ThresholdExhausted {
                    terminal_p_curr: *p_curr,
                    uncovered,
                });
            }
            sampler.min_probability(*p_curr);
            continue;
        }

        let mut candidates: Vec<(f64, VertexId, VertexId)> = best
            .into_iter()
            .enumerate()
            .filter_map(|(vertex, candidate)| {
                let (probability, center) = candidate?;
                let vertex = u32::try_from(vertex).expect("vertex count fits in u32");
                Some((probability, center, vertex))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let mut newly_covered = 0usize;
        for (probability, center, vertex) in candidates {
            if newly_covered >= target_new_coverage {
                break;
            }
            let record = *vinfo.get(vertex);
            if record.is_covered() {
                continue;
            }
            vinfo.get_mut(vertex).cover(center, probability);
            newly_covered += 1;
        }
        return Ok(());
    }
}

/// Reduces the clustering's centers to at most `target_k` by repeatedly
/// merging the pair of remaining centers with the highest pairwise
/// connection probability, reassigning the merged-away center's cluster to
/// the survivor.
fn shrink_to_target<S: Sampler>(
    sampler: &S,
    vinfo: &mut Clustering,
    target_k: usize,
) -> bool {
    let mut centers = vinfo.center_ids();
    if centers.len() <= target_k {
        return false;
    }

    while centers.len() > target_k {
        let mut best_pair = (0usize, 1usize);
        let mut best_probability = f64::NEG_INFINITY;
        for i in 0..centers.len() {
            for j in (i + 1)..centers.len() {
                let probability = sampler.connection_probability(&[centers[i], centers[j]]);
                if probability > best_probability {
                    best_probability = probability;
                    best_pair = (i, j);
                }
            }
        }
        let (i, j) = best_pair;
        let survivor = centers[i];
        let absorbed = centers[j];

        let n = vinfo.len();
        let mut estimates = vec![0.0; n];
        sampler.connection_probabilities(survivor, &mut estimates);
        for vertex in 0..u32::try_from(n).expect("vertex count fits in u32") {
            if vinfo.get(vertex).center() == Some(absorbed) {
                let probability = estimates[vertex as usize];
                vinfo.get_mut(vertex).cover(survivor, probability);
            }
        }
        vinfo.get_mut(survivor).make_center(survivor);
        centers.remove(j);
    }
    true
}

/// Runs the concurrent clustering engine (§4.8).
///
/// # Errors
/// Returns [`ClusteringError::TargetBelowComponents`] if `config.target_k`
/// is smaller than `components`. Returns
/// [`ClusteringError::ThresholdExhausted`] if the halving search in the
/// inner coverage loop drives `p_curr` below `config.p_low` without
/// covering the required half of the remaining uncovered vertices.
#[instrument(skip(sampler), fields(target_k = config.target_k, components))]
pub fn run<S: Sampler>(
    sampler: &mut S,
    components: usize,
    config: &ConcurrentConfig,
) -> ClusteringResult<ConcurrentOutcome> {
    if config.target_k < components {
        return Err(ClusteringError::TargetBelowComponents {
            target: config.target_k,
            components,
        });
    }

    let n = sampler.vertex_count();
    let mut cache = CountsCache::new(config.cache_capacity.max(1));
    let mut rng = Xorshift1024Star::new(config.seed);
    let mut vinfo = Clustering::new(n);
    let mut p_curr = 1.0f64;
    sampler.min_probability(p_curr);

    while vinfo.uncovered_count() > 0 {
        let batch = select_batch(&vinfo, &mut rng, config.batch_h);
        for &center in &batch {
            vinfo.get_mut(center).make_center(center);
        }
        cover_half(sampler, &mut cache, &mut vinfo, &batch, &mut p_curr, config.p_low)?;
    }

    let raw_center_count = vinfo.center_count();
    let shrunk = if config.shrink {
        shrink_to_target(sampler, &mut vinfo, config.target_k)
    } else {
        false
    };

    Ok(ConcurrentOutcome {
        clustering: vinfo,
        terminal_p_curr: p_curr,
        raw_center_count,
        shrunk,
    })
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

    fn concurrent_config(target_k: usize, seed: u64) -> ConcurrentConfig {
        ConcurrentConfig {
            target_k,
            batch_h: 2,
            p_low: 0.01,
            seed,
            cache_capacity: 16,
            shrink: true,
        }
    }

    #[test]
    fn triangle_with_certain_edges_covers_every_vertex() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(b, c, 1.0).unwrap();
        builder.edge(a, c, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 1);
        let outcome = run(&mut sampler, 1, &concurrent_config(1, 1)).unwrap();

        assert_eq!(outcome.clustering.uncovered_count(), 0);
        assert!(outcome.clustering.center_count() <= 1);
    }

    #[test]
    fn two_disjoint_components_cover_every_vertex() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        let d = builder.vertex("D");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(c, d, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 2);
        let outcome = run(&mut sampler, 2, &concurrent_config(2, 2)).unwrap();

        assert_eq!(outcome.clustering.uncovered_count(), 0);
        for vertex in 0..graph.vertex_count() as u32 {
            assert_eq!(outcome.clustering.get(vertex).probability(), 1.0);
        }
    }

    #[test]
    fn target_below_components_is_rejected() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        let d = builder.vertex("D");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(c, d, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 3);
        let result = run(&mut sampler, 2, &concurrent_config(1, 3));
        assert!(matches!(
            result,
            Err(ClusteringError::TargetBelowComponents {
                target: 1,
                components: 2
            })
        ));
    }

    #[test]
    fn shrink_pass_reduces_to_target_centers() {
        let mut builder = UncertainGraphBuilder::new();
        let mut vertices = Vec::new();
        for group in 0..3 {
            let a = builder.vertex(&format!("{group}-a"));
            let b = builder.vertex(&format!("{group}-b"));
            let c = builder.vertex(&format!("{group}-c"));
            builder.edge(a, b, 1.0).unwrap();
            builder.edge(b, c, 1.0).unwrap();
            builder.edge(a, c, 1.0).unwrap();
            vertices.push((a, b, c));
        }
        // Bridge the three triangles so they form a single component; the
        // main loop is then free to pick more than one center per triangle,
        // giving the shrink pass real work to do.
        builder.edge(vertices[0].0, vertices[1].0, 1.0).unwrap();
        builder.edge(vertices[1].0, vertices[2].0, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 7);
        let outcome = run(&mut sampler, 1, &concurrent_config(1, 7)).unwrap();

        assert_eq!(outcome.clustering.center_count(), 1);
        assert_eq!(outcome.clustering.uncovered_count(), 0);
    }
}
