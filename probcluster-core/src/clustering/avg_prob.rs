//! Average connection probability (k-median-style) clustering engine (§4.7).

use tracing::{instrument, warn};

use crate::cache::CountsCache;
use crate::error::{ClusteringError, ClusteringResult};
use crate::graph::VertexId;
use crate::guesser::ScoreMonotoneGuesser;
use crate::rng::Xorshift1024Star;
use crate::sampler::Sampler;

use super::{CenterSelector, Clustering, PreferCachedUncoveredSelector};

/// Parameters controlling an avg-prob clustering run.
#[derive(Clone, Copy, Debug)]
pub struct AvgProbConfig {
    /// Target number of clusters.
    pub target_k: usize,
    /// Bisection tolerance for the score-monotone threshold guesser.
    pub gamma: f64,
    /// Lowest threshold the guesser will ever probe.
    pub p_low: f64,
    /// Seed for the engine's tie-break RNG.
    pub seed: u64,
    /// Capacity of the counts cache.
    pub cache_capacity: usize,
    /// Whether center-selection ties are broken uniformly at random rather
    /// than by ascending vertex id.
    pub randomized_center_selection: bool,
    /// When `Some(h)`, batched center selection evaluates `h` random
    /// candidates per pick and commits only the one covering the most new
    /// vertices; `None` falls back to the plain [`PreferCachedUncoveredSelector`].
    pub batch_size: Option<usize>,
}

/// The result of a completed avg-prob clustering run.
#[derive(Clone, Debug)]
pub struct AvgProbOutcome {
    /// The final clustering.
    pub clustering: Clustering,
    /// The threshold the final clustering was validated at.
    pub terminal_p_curr: f64,
    /// Sum of covered probabilities over all vertices in the final
    /// clustering.
    pub score: f64,
    /// Number of vertices attached by the post-loop re-sampling
    /// augmentation.
    pub augmented_count: usize,
}

struct CoverOutcome {
    uncovered: usize,
    score: f64,
}

/// Picks the next center. With `batch_size = Some(h)`, draws `h` random
/// uncovered candidates and commits to the one that would newly cover the
/// most vertices at `p_curr` (first-found wins ties); with `None`, delegates
/// to `selector`.
fn pick_next_center<S: Sampler>(
    sampler: &S,
    vinfo: &Clustering,
    cache: &CountsCache,
    selector: &mut dyn CenterSelector,
    rng: &mut Xorshift1024Star,
    p_curr: f64,
    batch_size: Option<usize>,
    scratch: &mut [f64],
) -> Option<VertexId> {
    let Some(h) = batch_size else {
        return selector.select(vinfo, cache, p_curr, rng);
    };

    let uncovered: Vec<VertexId> = (0..vinfo.len())
        .filter_map(|i| {
            let id = u32::try_from(i).expect("vertex count fits in u32");
            (!vinfo.get(id).is_covered()).then_some(id)
        })
        .collect();
    if uncovered.is_empty() {
        return None;
    }

    let mut best_candidate = None;
    let mut best_new_coverage = 0usize;
    for _ in 0..h.max(1) {
        let candidate = uncovered[rng.next_below(uncovered.len())];
        sampler.connection_probabilities(candidate, scratch);
        let new_coverage = (0..vinfo.len())
            .filter(|&i| {
                let id = u32::try_from(i).expect("vertex count fits in u32");
                !vinfo.get(id).is_covered() && scratch[i] >= p_curr
            })
            .count();
        if best_candidate.is_none() || new_coverage > best_new_coverage {
            best_candidate = Some(candidate);
            best_new_coverage = new_coverage;
        }
    }
    best_candidate
}

/// Runs the avg-prob greedy cover once at a fixed threshold `p_curr`.
fn run_cover<S: Sampler>(
    sampler: &S,
    cache: &mut CountsCache,
    vinfo: &mut Clustering,
    selector: &mut dyn CenterSelector,
    rng: &mut Xorshift1024Star,
    target_k: usize,
    p_curr: f64,
    batch_size: Option<usize>,
) -> CoverOutcome {
    let n = vinfo.len();
    let mut estimates = vec![0.0; n];
    let mut scratch = vec![0.0; n];
    let mut centers_selected = 0usize;

    loop {
        let uncovered = vinfo.uncovered_count();
        if centers_selected + uncovered <= target_k {
            for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
                if !vinfo.get(i).is_covered() {
                    vinfo.get_mut(i).make_center(i);
                }
            }
            break;
        }
        if centers_selected >= target_k {
            break;
        }

        let Some(center) = pick_next_center(
            sampler,
            vinfo,
            cache,
            selector,
            rng,
            p_curr,
            batch_size,
            &mut scratch,
        ) else {
            break;
        };
        vinfo.get_mut(center).make_center(center);
        centers_selected += 1;

        sampler.connection_probabilities_cache(center, cache, &mut estimates);

        for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
            let probability = estimates[i as usize];
            let record = *vinfo.get(i);
            if probability >= p_curr {
                if !record.is_covered() {
                    vinfo.get_mut(i).cover(center, probability);
                } else if probability > record.probability() {
                    vinfo.get_mut(i).recover(center, probability);
                }
            } else if !record.is_covered() && probability > record.unreliable_probability() {
                vinfo.get_mut(i).unreliable_cover(center, probability);
            }
        }

        for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
            let record = vinfo.get(i);
            if record.is_covered() && !record.is_center() {
                cache.set_accessed(i, 0);
            }
        }
    }

    let score: f64 = vinfo.vertices().iter().map(|v| v.probability()).sum();
    CoverOutcome {
        uncovered: vinfo.uncovered_count(),
        score,
    }
}

/// Re-samples from the clustering's existing centers, assigning each
/// remaining uncovered vertex to whichever center gives it the best
/// estimate, regardless of threshold (§4.7 point 5).
fn augment_uncovered<S: Sampler>(sampler: &S, vinfo: &mut Clustering) -> usize {
    let n = vinfo.len();
    let centers = vinfo.center_ids();
    if centers.is_empty() {
        return 0;
    }

    let returned_uncovered = vinfo.uncovered_count();
    let mut estimates = vec![0.0; n];
    let mut augmented = 0;

    if returned_uncovered >= centers.len() {
        for &center in &centers {
            sampler.connection_probabilities(center, &mut estimates);
            for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
                let record = *vinfo.get(i);
                let probability = estimates[i as usize];
                if !record.is_covered() {
                    vinfo.get_mut(i).cover(center, probability);
                    augmented += 1;
                } else if probability > record.probability() {
                    vinfo.get_mut(i).recover(center, probability);
                }
            }
        }
    } else {
        for i in 0..u32::try_from(n).expect("vertex count fits in u32") {
            if vinfo.get(i).is_covered() {
                continue;
            }
            let mut best_center = centers[0];
            let mut best_probability = f64::NEG_INFINITY;
            for &center in &centers {
                sampler.connection_probabilities(center, &mut estimates);
                let probability = estimates[i as usize];
                if probability > best_probability {
                    best_probability = probability;
                    best_center = center;
                }
            }
            vinfo.get_mut(i).cover(best_center, best_probability.max(0.0));
            augmented += 1;
        }
    }

    augmented
}

/// Runs the shared probing loop (§4.5) driving the avg-prob greedy cover.
///
/// # Errors
/// Returns [`ClusteringError::TargetBelowComponents`] if `config.target_k`
/// is smaller than `components`, the graph's connected-component count.
#[instrument(skip(sampler), fields(target_k = config.target_k, components))]
pub fn run<S: Sampler>(
    sampler: &mut S,
    components: usize,
    config: &AvgProbConfig,
) -> ClusteringResult<AvgProbOutcome> {
    if config.target_k < components {
        return Err(ClusteringError::TargetBelowComponents {
            target: config.target_k,
            components,
        });
    }

    let n = sampler.vertex_count();
    let mut cache = CountsCache::new(config.cache_capacity.max(1));
    let mut guesser = ScoreMonotoneGuesser::new(config.gamma, config.p_low, n);
    let mut rng = Xorshift1024Star::new(config.seed);
    let mut selector = PreferCachedUncoveredSelector {
        randomized: config.randomized_center_selection,
    };
    let mut vinfo = Clustering::new(n);

    let mut best: Option<(Clustering, f64, f64)> = None;
    let mut last_attempt: Option<(Clustering, f64, f64)> = None;

    while !guesser.stopped() {
        cache.cleanup();
        vinfo.reset();
        let p_curr = guesser.current();
        sampler.min_probability(p_curr);

        let outcome = run_cover(
            sampler,
            &mut cache,
            &mut vinfo,
            &mut selector,
            &mut rng,
            config.target_k,
            p_curr,
            config.batch_size,
        );

        let is_better = best.as_ref().is_none_or(|(_, _, best_score)| outcome.score > *best_score);
        if is_better {
            best = Some((vinfo.clone(), p_curr, outcome.score));
        }
        last_attempt = Some((vinfo.clone(), p_curr, outcome.score));
        guesser.update(outcome.score);
    }

    let (mut clustering, terminal_p_curr, mut score) = match best {
        Some(winner) => winner,
        None => last_attempt.ok_or_else(|| ClusteringError::InvariantViolation {
            message: "probing loop terminated without running a single iteration".into(),
        })?,
    };

    let augmented_count = if clustering.uncovered_count() > 0 {
        let count = augment_uncovered(sampler, &mut clustering);
        if count > 0 {
            warn!(
                count,
                "avg-prob post-loop augmentation attached uncovered vertices from existing centers"
            );
        }
        score = clustering.vertices().iter().map(|v| v.probability()).sum();
        count
    } else {
        0
    };

    Ok(AvgProbOutcome {
        clustering,
        terminal_p_curr,
        score,
        augmented_count,
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

    fn avg_prob_config(target_k: usize, seed: u64) -> AvgProbConfig {
        AvgProbConfig {
            target_k,
            gamma: 0.2,
            p_low: 0.05,
            seed,
            cache_capacity: 16,
            randomized_center_selection: false,
            batch_size: None,
        }
    }

    #[test]
    fn triangle_with_certain_edges_yields_full_score() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(b, c, 1.0).unwrap();
        builder.edge(a, c, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 1);
        let outcome = run(&mut sampler, 1, &avg_prob_config(1, 1)).unwrap();

        assert_eq!(outcome.clustering.center_count(), 1);
        assert!((outcome.score - 3.0).abs() < 1e-9);
        assert_eq!(outcome.augmented_count, 0);
    }

    #[test]
    fn two_disjoint_components_become_two_clusters() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        let d = builder.vertex("D");
        builder.edge(a, b, 1.0).unwrap();
        builder.edge(c, d, 1.0).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 2);
        let outcome = run(&mut sampler, 2, &avg_prob_config(2, 2)).unwrap();

        assert_eq!(outcome.clustering.center_count(), 2);
        assert!((outcome.score - 4.0).abs() < 1e-9);
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
        let result = run(&mut sampler, 2, &avg_prob_config(1, 3));
        assert!(matches!(
            result,
            Err(ClusteringError::TargetBelowComponents {
                target: 1,
                components: 2
            })
        ));
    }

    #[test]
    fn completion_step_assigns_every_vertex_when_n_equals_k() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        builder.edge(a, b, 0.5).unwrap();
        let graph = builder.build();

        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 4);
        let outcome = run(&mut sampler, 1, &avg_prob_config(2, 4)).unwrap();

        assert_eq!(outcome.clustering.center_count(), 2);
        assert_eq!(outcome.clustering.uncovered_count(), 0);
    }

    #[test]
    fn batched_selection_converges_on_a_small_star() {
        let mut builder = UncertainGraphBuilder::new();
        let center = builder.vertex("center");
        let leaves: Vec<_> = (0..4)
            .map(|i| builder.vertex(&format!("leaf{i}")))
            .collect();
        for &leaf in &leaves {
            builder.edge(center, leaf, 0.9).unwrap();
        }
        let graph = builder.build();

        let mut config = avg_prob_config(1, 5);
        config.batch_size = Some(2);
        let mut sampler = ConnectedComponentsSampler::new(&graph, sampler_config(), 5);
        let outcome = run(&mut sampler, 1, &config).unwrap();

        assert_eq!(outcome.clustering.center_count(), 1);
        assert_eq!(outcome.clustering.uncovered_count(), 0);
    }

    #[test]
    fn determinism_for_a_fixed_seed() {
        let mut builder = UncertainGraphBuilder::new();
        let a = builder.vertex("A");
        let b = builder.vertex("B");
        let c = builder.vertex("C");
        builder.edge(a, b, 0.6).unwrap();
        builder.edge(b, c, 0.6).unwrap();
        let graph = builder.build();

        let mut sampler1 = ConnectedComponentsSampler::new(&graph, sampler_config(), 42);
        let outcome1 = run(&mut sampler1, 1, &avg_prob_config(1, 42)).unwrap();

        let mut sampler2 = ConnectedComponentsSampler::new(&graph, sampler_config(), 42);
        let outcome2 = run(&mut sampler2, 1, &avg_prob_config(1, 42)).unwrap();

        assert!((outcome1.score - outcome2.score).abs() < 1e-12);
        for vertex in 0..graph.vertex_count() as u32 {
            assert_eq!(
                outcome1.clustering.get(vertex).center(),
                outcome2.clustering.get(vertex).center()
            );
        }
    }
}
